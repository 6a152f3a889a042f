//! Network reachability and auth session tracking
//!
//! The monitor holds no entity state. The worker subscribes to it to defer
//! background cycles while offline and to start one when connectivity returns.

use std::sync::{PoisonError, RwLock};

use tokio::sync::watch;

use crate::auth::{AccessTokenSource, AuthSession};

/// Snapshot of what the sync engine needs to reach the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectivityState {
    pub reachable: bool,
    pub authenticated: bool,
}

impl ConnectivityState {
    pub const fn is_online(self) -> bool {
        self.reachable && self.authenticated
    }
}

pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectivityState>,
    session: RwLock<Option<AuthSession>>,
}

impl ConnectivityMonitor {
    pub fn new(state: ConnectivityState) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            state,
            session: RwLock::new(None),
        }
    }

    /// Unreachable and signed out
    pub fn offline() -> Self {
        Self::new(ConnectivityState::default())
    }

    /// Reachable and authenticated without a user session (anon key access)
    pub fn online() -> Self {
        Self::new(ConnectivityState {
            reachable: true,
            authenticated: true,
        })
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.update(|state| state.reachable = reachable);
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.update(|state| state.authenticated = authenticated);
    }

    /// Install a session; expired sessions count as signed out.
    pub fn set_session(&self, session: AuthSession) {
        let authenticated = !session.is_expired();
        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.set_authenticated(authenticated);
    }

    pub fn clear_session(&self) {
        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.set_authenticated(false);
    }

    /// Id of the signed-in user, if any
    pub fn user_id(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.user.id.clone())
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    pub fn is_online_and_authenticated(&self) -> bool {
        self.state().is_online()
    }

    fn update(&self, apply: impl FnOnce(&mut ConnectivityState)) {
        let mut restored = false;
        self.state.send_if_modified(|state| {
            let before = *state;
            apply(state);
            restored = state.is_online() && !before.is_online();
            *state != before
        });
        if restored {
            tracing::info!("Connectivity restored");
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::offline()
    }
}

impl AccessTokenSource for ConnectivityMonitor {
    fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|session| !session.is_expired())
            .map(|session| session.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use crate::util::unix_timestamp_now;

    fn session(expires_in: i64) -> AuthSession {
        AuthSession {
            access_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: unix_timestamp_now() + expires_in,
            user: AuthUser {
                id: "user-1".to_string(),
                email: None,
            },
        }
    }

    #[test]
    fn online_requires_reachability_and_auth() {
        let monitor = ConnectivityMonitor::offline();
        assert!(!monitor.is_online_and_authenticated());

        monitor.set_reachable(true);
        assert!(!monitor.is_online_and_authenticated());

        monitor.set_session(session(3600));
        assert!(monitor.is_online_and_authenticated());
        assert_eq!(monitor.user_id().as_deref(), Some("user-1"));
        assert_eq!(monitor.access_token().as_deref(), Some("token"));

        monitor.clear_session();
        assert!(!monitor.is_online_and_authenticated());
        assert_eq!(monitor.access_token(), None);
    }

    #[test]
    fn expired_session_is_not_authenticated() {
        let monitor = ConnectivityMonitor::offline();
        monitor.set_reachable(true);
        monitor.set_session(session(-1));
        assert!(!monitor.is_online_and_authenticated());
        assert_eq!(monitor.access_token(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_see_transitions() {
        let monitor = ConnectivityMonitor::offline();
        let mut receiver = monitor.subscribe();

        monitor.set_reachable(true);
        monitor.set_authenticated(true);
        receiver.changed().await.unwrap();
        assert!(receiver.borrow_and_update().is_online());

        // Unchanged state does not notify
        monitor.set_reachable(true);
        assert!(!receiver.has_changed().unwrap());
    }
}
