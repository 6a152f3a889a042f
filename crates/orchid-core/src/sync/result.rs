//! Outcome of a sync cycle

use std::time::Duration;

/// How much of the retry and pull machinery a cycle bypasses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleMode {
    /// Triggered by the worker: honours backoff, pulls incrementally
    Background,
    /// Explicit full sync: retries everything, pulls every row
    Full,
}

/// Summary of one sync cycle.
///
/// `total_processed` counts remote writes attempted plus pulled rows that
/// changed or failed to apply; rows already in sync are not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub duration: Duration,
    pub error_messages: Vec<String>,
    /// Entities upserted to the remote
    pub pushed: usize,
    /// Remote rows applied locally
    pub pulled: usize,
    /// Deletions applied on either side
    pub deleted: usize,
    /// Last-writer-wins conflicts resolved
    pub conflicts: usize,
    /// The cycle stopped early because it was cancelled
    pub cancelled: bool,
    /// Nothing ran because the device was offline or signed out
    pub skipped_offline: bool,
}

impl SyncResult {
    pub fn offline() -> Self {
        Self {
            skipped_offline: true,
            ..Self::default()
        }
    }

    pub const fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled && !self.skipped_offline
    }

    pub(crate) fn record_success(&mut self) {
        self.total_processed += 1;
        self.successful += 1;
    }

    pub(crate) fn record_failure(&mut self, message: String) {
        self.total_processed += 1;
        self.failed += 1;
        self.error_messages.push(message);
    }
}
