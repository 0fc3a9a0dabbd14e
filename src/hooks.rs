// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Seams to the hosting framework.
//!
//! This crate does not own session storage or user records. The hosting
//! application implements [`Session`] over whatever session engine it
//! runs and inserts a [`SessionHandle`] into request extensions before
//! the gateway auth middleware; it implements [`UserProvisioner`] over
//! its user store. The middleware only ever talks to these traits.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::session::{IdentityFields, SessionState};

/// The hosting framework's session for the current request.
///
/// Implementations must be able to report which backend established the
/// current session (the ownership tag in [`SessionState`]), because
/// logout is only ever applied to gateway-owned sessions.
#[async_trait]
pub trait Session: Send {
    /// The current session identity.
    fn state(&self) -> SessionState;

    /// Establish a gateway-owned session for `username`, replacing
    /// whatever session existed. Must be idempotent for identical input.
    async fn login(&mut self, username: &str);

    /// Tear down the current session. Only called for gateway-owned
    /// sessions; a no-op session is acceptable.
    async fn logout(&mut self);
}

/// Shared, lockable handle to the request's session.
///
/// The hosting application's session layer inserts this into request
/// extensions; its absence is a deployment error answered with a 500.
#[derive(Clone)]
pub struct SessionHandle(Arc<Mutex<Box<dyn Session>>>);

impl SessionHandle {
    /// Wrap a session for insertion into request extensions.
    pub fn new<S: Session + 'static>(session: S) -> Self {
        Self(Arc::new(Mutex::new(Box::new(session))))
    }

    /// The current session identity.
    pub async fn state(&self) -> SessionState {
        self.0.lock().await.state()
    }

    /// Establish a gateway-owned session for `username`.
    pub async fn login(&self, username: &str) {
        self.0.lock().await.login(username).await;
    }

    /// Tear down the current session.
    pub async fn logout(&self) {
        self.0.lock().await.logout().await;
    }
}

/// The hosting framework's provision-or-fetch-identity hook.
///
/// Called with the derived identity fields on every verified request, so
/// elevation (the `admin` bit) is re-applied, and revoked, as domains
/// change, not only at first creation.
#[async_trait]
pub trait UserProvisioner: Send + Sync {
    /// Fetch or create the user record for a verified identity and apply
    /// the derived fields. Returning `false` vetoes a pending login
    /// (identity unknown and not creatable).
    async fn provision(&self, identity: &IdentityFields) -> bool;
}

/// Default provisioner: accepts every verified identity.
///
/// Matches a create-on-first-sight user store where provisioning cannot
/// fail.
#[derive(Debug, Clone, Default)]
pub struct NullProvisioner;

#[async_trait]
impl UserProvisioner for NullProvisioner {
    async fn provision(&self, _identity: &IdentityFields) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionBackend;

    /// Minimal in-memory session used across this crate's tests.
    pub(crate) struct MemorySession {
        state: SessionState,
    }

    impl MemorySession {
        pub(crate) fn anonymous() -> Self {
            Self {
                state: SessionState::Anonymous,
            }
        }
    }

    #[async_trait]
    impl Session for MemorySession {
        fn state(&self) -> SessionState {
            self.state.clone()
        }

        async fn login(&mut self, username: &str) {
            self.state = SessionState::Authenticated {
                username: username.to_string(),
                backend: SessionBackend::Gateway,
            };
        }

        async fn logout(&mut self) {
            self.state = SessionState::Anonymous;
        }
    }

    #[tokio::test]
    async fn handle_round_trips_login_and_logout() {
        let handle = SessionHandle::new(MemorySession::anonymous());
        assert_eq!(handle.state().await, SessionState::Anonymous);

        handle.login("testuser").await;
        assert_eq!(handle.state().await, SessionState::gateway("testuser"));

        // Login is idempotent.
        handle.login("testuser").await;
        assert_eq!(handle.state().await, SessionState::gateway("testuser"));

        handle.logout().await;
        assert_eq!(handle.state().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn null_provisioner_accepts_everyone() {
        let identity = IdentityFields {
            username: "a".to_string(),
            email: "a@x.com".to_string(),
            domain: None,
            admin: false,
        };
        assert!(NullProvisioner.provision(&identity).await);
    }
}
