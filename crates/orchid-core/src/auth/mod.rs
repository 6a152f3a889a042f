//! Auth session state shared with the remote store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::unix_timestamp_now;

const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

/// A signed-in Supabase session. `expires_at` is a Unix timestamp in seconds.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Supplies the bearer token for remote requests.
pub trait AccessTokenSource: Send + Sync {
    /// Current access token, or `None` to fall back to the anon key
    fn access_token(&self) -> Option<String>;
}

/// A fixed token, e.g. a service key for tooling.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("StaticToken([REDACTED])")
    }
}

impl AccessTokenSource for StaticToken {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
