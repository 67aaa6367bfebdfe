/*!
 * Instrumentation for tracking operation statistics
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ErrorKind, SmbError};

/// Thread-safe statistics tracker for facade operations
#[derive(Debug, Clone)]
pub struct OperationStats {
    inner: Arc<OperationStatsInner>,
}

#[derive(Debug)]
struct OperationStatsInner {
    // Operation outcomes
    total_operations: AtomicU64,
    successful_operations: AtomicU64,
    failed_operations: AtomicU64,
    cancelled_operations: AtomicU64,
    validation_failures: AtomicU64,

    // Attempts and retries
    total_attempts: AtomicU64,
    total_retries: AtomicU64,
    max_attempts_for_single_op: AtomicU64,

    // Indexed like ErrorKind::ALL
    failures_by_kind: [AtomicU64; ErrorKind::ALL.len()],

    // Completions for handles no longer registered
    unknown_callbacks: AtomicU64,

    start_time: Instant,
}

impl OperationStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(OperationStatsInner {
                total_operations: AtomicU64::new(0),
                successful_operations: AtomicU64::new(0),
                failed_operations: AtomicU64::new(0),
                cancelled_operations: AtomicU64::new(0),
                validation_failures: AtomicU64::new(0),
                total_attempts: AtomicU64::new(0),
                total_retries: AtomicU64::new(0),
                max_attempts_for_single_op: AtomicU64::new(0),
                failures_by_kind: Default::default(),
                unknown_callbacks: AtomicU64::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    /// Record one execution of an operation body
    pub fn record_attempt(&self) {
        self.inner.total_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retry scheduled after `attempt_number` failed
    pub fn record_retry(&self, attempt_number: u32) {
        self.inner.total_retries.fetch_add(1, Ordering::Relaxed);
        self.inner
            .max_attempts_for_single_op
            .fetch_max(attempt_number as u64 + 1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.inner.total_operations.fetch_add(1, Ordering::Relaxed);
        self.inner
            .successful_operations
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed operation, bucketed by outcome
    pub fn record_failure(&self, error: &SmbError) {
        self.inner.total_operations.fetch_add(1, Ordering::Relaxed);

        if error.is_cancelled() {
            self.inner.cancelled_operations.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.inner.failed_operations.fetch_add(1, Ordering::Relaxed);
        if error.is_validation() {
            self.inner.validation_failures.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(kind) = error.kind() {
            self.inner.failures_by_kind[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a completion callback that named no live handle
    pub fn record_unknown_callback(&self) {
        self.inner.unknown_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let failures_by_kind = ErrorKind::ALL
            .iter()
            .map(|kind| {
                (
                    kind.as_str().to_string(),
                    self.inner.failures_by_kind[kind_index(*kind)].load(Ordering::Relaxed),
                )
            })
            .filter(|(_, count)| *count > 0)
            .collect();

        StatsSnapshot {
            total_operations: self.inner.total_operations.load(Ordering::Relaxed),
            successful_operations: self.inner.successful_operations.load(Ordering::Relaxed),
            failed_operations: self.inner.failed_operations.load(Ordering::Relaxed),
            cancelled_operations: self.inner.cancelled_operations.load(Ordering::Relaxed),
            validation_failures: self.inner.validation_failures.load(Ordering::Relaxed),
            total_attempts: self.inner.total_attempts.load(Ordering::Relaxed),
            total_retries: self.inner.total_retries.load(Ordering::Relaxed),
            max_attempts_for_single_op: self.inner.max_attempts_for_single_op.load(Ordering::Relaxed),
            failures_by_kind,
            unknown_callbacks: self.inner.unknown_callbacks.load(Ordering::Relaxed),
            elapsed_secs: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Log a summary when retries, failures, or stray callbacks occurred
    ///
    /// Set `SMB_GATEWAY_STATS=off` to silence it or `verbose` to always log.
    pub fn emit(&self) {
        let setting = std::env::var("SMB_GATEWAY_STATS")
            .map(|v| v.to_lowercase())
            .unwrap_or_default();
        if matches!(setting.as_str(), "off" | "0" | "false") {
            return;
        }

        let snapshot = self.snapshot();
        let noteworthy = snapshot.total_retries > 0
            || snapshot.failed_operations > 0
            || snapshot.unknown_callbacks > 0;
        if !noteworthy && setting != "verbose" {
            return;
        }

        tracing::info!(target: "smb_gateway::stats", "{}", snapshot.format_summary());
    }

    pub fn has_activity(&self) -> bool {
        self.inner.total_operations.load(Ordering::Relaxed) > 0
    }
}

impl Default for OperationStats {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_index(kind: ErrorKind) -> usize {
    ErrorKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(ErrorKind::ALL.len() - 1)
}

/// Immutable snapshot of statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub cancelled_operations: u64,
    pub validation_failures: u64,
    pub total_attempts: u64,
    pub total_retries: u64,
    pub max_attempts_for_single_op: u64,
    /// Failure counts keyed by error kind label; zero counts are omitted
    pub failures_by_kind: BTreeMap<String, u64>,
    pub unknown_callbacks: u64,
    pub elapsed_secs: u64,
}

impl StatsSnapshot {
    pub fn failures_of(&self, kind: ErrorKind) -> u64 {
        self.failures_by_kind.get(kind.as_str()).copied().unwrap_or(0)
    }

    /// Success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            (self.successful_operations as f64 / self.total_operations as f64) * 100.0
        }
    }

    pub fn format_summary(&self) -> String {
        let kinds = self
            .failures_by_kind
            .iter()
            .map(|(kind, count)| format!("{}={}", kind, count))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Operations: {} total, {} successful ({:.1}%), {} failed, {} cancelled\n\
             Attempts: {} total, {} retries, {} max for single operation\n\
             Failures: {} validation; by kind [{}]; {} unknown callbacks\n\
             Elapsed: {} seconds",
            self.total_operations,
            self.successful_operations,
            self.success_rate(),
            self.failed_operations,
            self.cancelled_operations,
            self.total_attempts,
            self.total_retries,
            self.max_attempts_for_single_op,
            self.validation_failures,
            kinds,
            self.unknown_callbacks,
            self.elapsed_secs
        )
    }
}
