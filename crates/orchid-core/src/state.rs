//! Sync phase shared with UI layers.

use std::fmt;

/// Where the sync engine is in its cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    #[default]
    Idle,
    Pushing,
    Pulling,
    Reconciling,
    /// The last cycle aborted on a local storage failure
    Error,
}

impl SyncPhase {
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Pushing | Self::Pulling | Self::Reconciling)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Pushing => "pushing",
            Self::Pulling => "pulling",
            Self::Reconciling => "reconciling",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}
