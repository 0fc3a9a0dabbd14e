// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session reconciliation.
//!
//! [`reconcile`] is the state machine at the center of this crate: given
//! the session identity the hosting application already holds and the
//! outcome of verifying this request's assertion, it decides what
//! happens to the session. It performs no I/O and holds no state; the
//! middleware applies its decision through the host's session hooks.
//!
//! ## Ownership boundary
//!
//! Sessions are tagged with the backend that established them. This
//! crate only ever tears down sessions its own backend created; a
//! rejected token next to a session owned by an unrelated authentication
//! mechanism leaves that session untouched.

/// Which authentication backend established a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    /// Established by this crate's gateway authentication.
    Gateway,
    /// Established by some other mechanism of the hosting application.
    External,
}

/// The hosting framework's notion of "current user for this request".
///
/// This crate reads it and conditionally clears it; it never owns the
/// storage behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No authenticated user.
    Anonymous,
    /// An authenticated user, tagged with the backend that logged them in.
    Authenticated {
        username: String,
        backend: SessionBackend,
    },
}

impl SessionState {
    /// Convenience constructor for a gateway-owned session.
    pub fn gateway(username: impl Into<String>) -> Self {
        SessionState::Authenticated {
            username: username.into(),
            backend: SessionBackend::Gateway,
        }
    }

    /// Convenience constructor for a foreign-owned session.
    pub fn external(username: impl Into<String>) -> Self {
        SessionState::Authenticated {
            username: username.into(),
            backend: SessionBackend::External,
        }
    }
}

/// What the middleware should do to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionDecision {
    /// Leave the session exactly as it is.
    LeaveAsIs,
    /// Tear down the current gateway-owned session.
    ForceLogout,
    /// Log in as `username`. Idempotent: re-running it with the same
    /// input yields the same final session identity.
    LoginAs { username: String },
    /// Identity switch: tear down the current gateway-owned session
    /// first, then log in as `username`, in that order, so no window
    /// exists where both identities' privileges are honored.
    SwitchTo { username: String },
}

/// Identity fields derived from a verified assertion, handed to the
/// hosting framework's user-provisioning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFields {
    /// Canonical username: the local part of the verified email.
    pub username: String,
    /// Verified email address.
    pub email: String,
    /// Hosted domain claim, if any.
    pub domain: Option<String>,
    /// Whether this identity's domain exactly matches the configured
    /// admin domain and should receive elevated privileges.
    pub admin: bool,
}

/// Output of the state machine: the session decision plus the derived
/// identity fields (`Some` exactly when the outcome was `Verified`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub decision: SessionDecision,
    pub identity: Option<IdentityFields>,
}

impl Reconciliation {
    fn unchanged() -> Self {
        Self {
            decision: SessionDecision::LeaveAsIs,
            identity: None,
        }
    }
}

/// The canonical username derived from a verified email: the substring
/// before the first `@`. Total over any string; an `@`-free input is
/// returned unchanged.
pub fn local_part(email: &str) -> &str {
    match email.find('@') {
        Some(index) => &email[..index],
        None => email,
    }
}

/// Decide the new session identity for a request.
///
/// Pure function of its inputs; the caller applies the decision. See the
/// module docs for the ownership boundary.
pub fn reconcile(
    existing: &SessionState,
    outcome: &crate::claims::AuthOutcome,
    admin_domain: Option<&str>,
) -> Reconciliation {
    use crate::claims::AuthOutcome;

    match outcome {
        // Absence of a token is not this crate's concern: defer entirely
        // to whatever other auth mechanisms the host runs.
        AuthOutcome::NoToken => Reconciliation::unchanged(),

        // A bad token must not coexist with a trusted gateway session.
        // Foreign and anonymous sessions are left alone.
        AuthOutcome::Rejected => match existing {
            SessionState::Authenticated {
                backend: SessionBackend::Gateway,
                ..
            } => Reconciliation {
                decision: SessionDecision::ForceLogout,
                identity: None,
            },
            _ => Reconciliation::unchanged(),
        },

        AuthOutcome::Verified(verified) => {
            let username = local_part(&verified.email).to_string();
            let admin = match (admin_domain, verified.domain.as_deref()) {
                (Some(admin_domain), Some(domain)) => admin_domain == domain,
                _ => false,
            };
            let identity = Some(IdentityFields {
                username: username.clone(),
                email: verified.email.clone(),
                domain: verified.domain.clone(),
                admin,
            });

            let decision = match existing {
                SessionState::Anonymous => SessionDecision::LoginAs { username },
                SessionState::Authenticated {
                    username: current,
                    backend,
                } => {
                    if *current == username {
                        // Session already matches the verified identity;
                        // skip the redundant re-login.
                        SessionDecision::LeaveAsIs
                    } else if *backend == SessionBackend::Gateway {
                        SessionDecision::SwitchTo { username }
                    } else {
                        // The login supplants the foreign session, but we
                        // never explicitly tear down what we did not
                        // establish.
                        SessionDecision::LoginAs { username }
                    }
                }
            };

            Reconciliation { decision, identity }
        }
    }
}
