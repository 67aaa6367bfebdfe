/*!
 * Configuration types for smb-gateway
 */

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::ValidationError;

/// Port used by SMB direct TCP transport
pub const SMB_DIRECT_TCP_PORT: u16 = 445;

/// Upper bound applied to any configured attempt count
pub const MAX_ATTEMPTS_CAP: u32 = 5;

static SHARE_NAME_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").ok());

/// Secret wrapper for credentials
///
/// Zeroes its memory on drop and never prints its contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Validated, immutable description of a target share
///
/// Construction fails fast on the first invalid field. Reconfiguring a
/// service replaces the whole profile.
///
/// # Example
///
/// ```
/// use smb_gateway::config::ConnectionProfile;
///
/// let profile = ConnectionProfile::new("192.168.1.100", "username", "password", "WORK").unwrap();
/// assert_eq!(profile.share_name(), "WORK");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    host: IpAddr,
    user_name: String,
    password: Secret,
    share_name: String,
}

impl ConnectionProfile {
    /// Parse and validate a profile from its textual parts
    pub fn new(
        host: &str,
        user_name: &str,
        password: &str,
        share_name: &str,
    ) -> Result<Self, ValidationError> {
        let addr: IpAddr = host
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidHost(host.to_string()))?;
        Self::from_addr(addr, user_name, password, share_name)
    }

    /// Validate a profile for an already-parsed address
    pub fn from_addr(
        host: IpAddr,
        user_name: &str,
        password: &str,
        share_name: &str,
    ) -> Result<Self, ValidationError> {
        // 255.255.255.255 is the "no address" sentinel
        if host == IpAddr::V4(Ipv4Addr::BROADCAST) {
            return Err(ValidationError::InvalidHost(host.to_string()));
        }
        if user_name.trim().is_empty() {
            return Err(ValidationError::EmptyUserName);
        }
        if password.trim().is_empty() {
            return Err(ValidationError::EmptyPassword);
        }
        if share_name.trim().is_empty() {
            return Err(ValidationError::EmptyShareName);
        }
        let share_ok = SHARE_NAME_PATTERN
            .as_ref()
            .map(|re| re.is_match(share_name))
            .unwrap_or(false);
        if !share_ok {
            return Err(ValidationError::InvalidShareName(share_name.to_string()));
        }

        Ok(Self {
            host,
            user_name: user_name.to_string(),
            password: Secret::new(password),
            share_name: share_name.to_string(),
        })
    }

    /// Decode the flat JSON document `{ipAddress, userName, password, shareName}`
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let doc: ProfileDocument = serde_json::from_str(json)
            .map_err(|e| ValidationError::InvalidProfileDocument(e.to_string()))?;
        Self::new(&doc.ip_address, &doc.user_name, &doc.password, &doc.share_name)
    }

    /// Encode as the JSON document consumed by foreign-boundary backends
    pub fn to_json(&self) -> Result<String, ValidationError> {
        let doc = ProfileDocument {
            ip_address: self.host.to_string(),
            user_name: self.user_name.clone(),
            password: self.password.expose().to_string(),
            share_name: self.share_name.clone(),
        };
        serde_json::to_string(&doc).map_err(|e| ValidationError::InvalidProfileDocument(e.to_string()))
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, SMB_DIRECT_TCP_PORT)
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn password(&self) -> &str {
        self.password.expose()
    }

    pub fn share_name(&self) -> &str {
        &self.share_name
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("user_name", &self.user_name)
            .field("password", &self.password)
            .field("share_name", &self.share_name)
            .finish()
    }
}

impl fmt::Display for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "smb://{}:*****@{}/{}", self.user_name, self.host, self.share_name)
    }
}

/// Wire form of a connection profile
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileDocument {
    ip_address: String,
    user_name: String,
    password: String,
    share_name: String,
}

/// Service-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Transport connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Total attempts per operation (clamped to 1..=5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ValidationError> {
        toml::from_str(contents).map_err(|e| ValidationError::InvalidConfig(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn clamped_attempts(&self) -> u32 {
        self.max_attempts.clamp(1, MAX_ATTEMPTS_CAP)
    }
}

/// Logging output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}
