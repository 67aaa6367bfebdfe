/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::Path;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;
use crate::error::ValidationError;

/// Install the global tracing subscriber described by `config`
///
/// `RUST_LOG` overrides the configured level. Fails if a subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ValidationError> {
    let env_filter = default_filter(config)?;

    match config.file {
        Some(ref log_path) => init_file_logging(log_path, env_filter),
        None => init_stdout_logging(env_filter),
    }
}

fn default_filter(config: &LoggingConfig) -> Result<EnvFilter, ValidationError> {
    let level = config.level.to_tracing_level();
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("smb_gateway={}", level)))
        .map_err(|e| ValidationError::InvalidConfig(format!("failed to create log filter: {}", e)))
}

fn init_stdout_logging(env_filter: EnvFilter) -> Result<(), ValidationError> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ValidationError::InvalidConfig(format!("logging already initialized: {}", e)))
}

fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<(), ValidationError> {
    let file = File::create(log_path).map_err(|e| {
        ValidationError::InvalidConfig(format!("failed to create log file {}: {}", log_path.display(), e))
    })?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ValidationError::InvalidConfig(format!("logging already initialized: {}", e)))
}

/// Route test output through the test writer, once per process
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("smb_gateway=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    });
}
