//! Query filters and per-kind statistics

use serde::{Deserialize, Serialize};

use super::entity::SyncStatus;

/// Ownership scope of a query
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OwnerFilter {
    /// Every record regardless of owner
    #[default]
    Any,
    /// Only shared system defaults (no owner)
    Shared,
    /// Only records owned by this user
    User(String),
    /// Records owned by this user plus shared defaults
    UserOrShared(String),
}

/// Filter for listing entities from the local store.
///
/// Results are ordered newest `updated_at` first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityFilter {
    pub owner: OwnerFilter,
    pub active_only: bool,
    pub favorites_only: bool,
    /// Case-insensitive substring of the name
    pub name_contains: Option<String>,
    pub status: Option<SyncStatus>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl EntityFilter {
    /// Filter that matches everything
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn owner(mut self, owner: OwnerFilter) -> Self {
        self.owner = owner;
        self
    }

    #[must_use]
    pub const fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    #[must_use]
    pub const fn favorites_only(mut self) -> Self {
        self.favorites_only = true;
        self
    }

    #[must_use]
    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into());
        self
    }

    #[must_use]
    pub const fn status(mut self, status: SyncStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

/// Counts for one entity kind, shown by the UI as sync badges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityStatistics {
    pub total: usize,
    pub active: usize,
    pub synced: usize,
    pub local: usize,
    pub pending: usize,
    pub error: usize,
    /// Deletions waiting for remote acknowledgment
    pub pending_deletes: usize,
}

impl EntityStatistics {
    /// Entities or deletions not yet acknowledged by the remote
    #[must_use]
    pub const fn unsynced(&self) -> usize {
        self.local + self.pending + self.error + self.pending_deletes
    }
}
