//! Remote backend errors and their classification

use thiserror::Error;

/// Errors surfaced by a remote store, verbatim from the backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The backend could not be reached (DNS, TLS, timeout, 5xx)
    #[error("Remote unreachable: {0}")]
    Transport(String),
    /// Missing or expired credentials
    #[error("Not authenticated: {0}")]
    Unauthorized(String),
    /// Row-level security or grants rejected the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// The backend rejected the row shape
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Any other rejection
    #[error("Remote API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// How the sync engine reacts to a remote error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Retry on the next trigger; does not consume an attempt
    Transport,
    /// Retry with throttled backoff
    Authorization,
    /// Rejected row shape, retried with backoff
    Schema,
    /// Generic rejection, retried with backoff
    Rejected,
}

impl RemoteError {
    /// Classify this error for retry handling
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Transport(_) => ErrorClass::Transport,
            Self::Unauthorized(_) | Self::PermissionDenied(_) => ErrorClass::Authorization,
            Self::SchemaMismatch(_) => ErrorClass::Schema,
            Self::Api { status, .. } if *status >= 500 => ErrorClass::Transport,
            Self::Api { .. } => ErrorClass::Rejected,
        }
    }

    /// Whether the backend was reachable when this error happened
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self.class(), ErrorClass::Transport)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        let message = error.to_string().replace('\n', " ");
        if error.is_decode() {
            Self::SchemaMismatch(message)
        } else if let Some(status) = error.status() {
            Self::Api {
                status: status.as_u16(),
                message,
            }
        } else {
            Self::Transport(message)
        }
    }
}
