//! Error recovery registry.
//!
//! Failures raised anywhere in the resolution pipeline are collected here,
//! deduplicated by `(code, module)`, and consulted to decide whether the
//! caller may try again. The registry lives for the whole process and is
//! cleared at the start of every top-level command run.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::ErrorRecord;

/// What the recorded failures allow the caller to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Nothing has failed.
    Nothing,
    /// Every failure is retryable.
    Retry,
    /// At least one failure is permanent.
    Abort,
}

/// Policy hooks consulted by the registry.
#[async_trait]
pub trait RecoveryPolicy: Send + Sync {
    /// A module does not exist in the registry. Returns whether the caller
    /// should offer the user an install.
    async fn on_not_found(&self, record: &ErrorRecord) -> bool;

    /// Any other failure. `retryable` is the registry's current verdict;
    /// returns whether to retry.
    async fn on_error(&self, record: &ErrorRecord, retryable: bool) -> bool {
        let _ = record;
        retryable
    }
}

/// Non-interactive policy: never offers an install, follows the registry's
/// retry verdict.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPolicy;

#[async_trait]
impl RecoveryPolicy for DefaultPolicy {
    async fn on_not_found(&self, record: &ErrorRecord) -> bool {
        tracing::warn!(
            module = record.module_name.as_deref().unwrap_or("<unknown>"),
            "module not found in the registry; check the name or the configured registry"
        );
        false
    }
}

/// Process-wide list of failures.
pub struct ErrorRecoveryRegistry {
    records: Mutex<Vec<ErrorRecord>>,
    policy: Arc<dyn RecoveryPolicy>,
}

impl std::fmt::Debug for ErrorRecoveryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRecoveryRegistry").field("records", &*self.records.lock()).finish()
    }
}

impl Default for ErrorRecoveryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorRecoveryRegistry {
    /// Registry with the default policy.
    pub fn new() -> Self {
        Self::with_policy(Arc::new(DefaultPolicy))
    }

    /// Registry with a custom policy.
    pub fn with_policy(policy: Arc<dyn RecoveryPolicy>) -> Self {
        Self { records: Mutex::new(Vec::new()), policy }
    }

    /// Append a record unless an equivalent one is already present.
    /// Returns whether it was appended.
    pub fn register(&self, record: ErrorRecord) -> bool {
        let mut records = self.records.lock();
        if records.iter().any(|r| r.same_as(&record)) {
            tracing::debug!(
                code = %record.code,
                module = ?record.module_name,
                "duplicate error record"
            );
            return false;
        }
        tracing::debug!(%record, "error recorded");
        records.push(record);
        true
    }

    /// Records in insertion order.
    pub fn get_error_list(&self) -> Vec<ErrorRecord> {
        self.records.lock().clone()
    }

    /// Forget every record.
    pub fn clear_error(&self) {
        self.records.lock().clear();
    }

    /// Whether the registry holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// True only when there are records and all of them are retryable.
    pub fn check_retry(&self) -> bool {
        self.retry_decision() == RetryDecision::Retry
    }

    /// Three-way verdict over the recorded failures.
    pub fn retry_decision(&self) -> RetryDecision {
        let records = self.records.lock();
        if records.is_empty() {
            RetryDecision::Nothing
        } else if records.iter().all(|r| r.retryable) {
            RetryDecision::Retry
        } else {
            RetryDecision::Abort
        }
    }

    /// Record a not-found failure and ask the policy whether to offer an
    /// install.
    pub async fn no_found_handle(&self, record: ErrorRecord) -> bool {
        self.register(record.clone());
        self.policy.on_not_found(&record).await
    }

    /// Record any other failure and ask the policy whether to retry.
    pub async fn default_handle(&self, record: ErrorRecord) -> bool {
        self.register(record.clone());
        let retryable = self.check_retry();
        self.policy.on_error(&record, retryable).await
    }
}
