// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # iap-auth
//!
//! Gateway identity-assertion authentication for Axum applications
//! running behind a trusted reverse-proxy identity gateway (GCP
//! Identity-Aware Proxy style).
//!
//! ## Auth Flow
//!
//! 1. The gateway authenticates the end user and injects a signed JWT
//!    into `X-Goog-IAP-JWT-Assertion` on every forwarded request
//! 2. The middleware:
//!    - Fetches and caches the gateway's published verification keys
//!    - Resolves the expected audience (static config or metadata)
//!    - Verifies the assertion (ES256 only, exact audience, temporal
//!      claims) and extracts the `email` and `hd` claims
//!    - Reconciles the verified identity against the session the hosting
//!      application already holds, forcing a logout when a gateway-owned
//!      session no longer matches
//! 3. Downstream handlers read the request-scoped [`GatewayIdentity`];
//!    the hosting application provisions user records through its
//!    [`UserProvisioner`] hook
//!
//! ## Security
//!
//! - Key and audience fetch failures are fail-closed: the assertion is
//!   rejected, never silently treated as absent
//! - Only ES256 is accepted; other algorithms are rejected outright
//! - Verification failures collapse to one opaque rejection; detail is
//!   logged for operators only
//! - Only sessions this crate established are ever torn down
//!
//! ## Modules
//!
//! - `audience` - Expected-audience resolution and caching
//! - `claims` - Assertion claims and verified identity
//! - `config` - Configuration surface and defaults
//! - `error` - Error taxonomy
//! - `hooks` - Seams to the hosting framework (session, provisioning)
//! - `keys` - Verification key fetching and caching
//! - `middleware` - Axum middleware and request-scoped identity
//! - `session` - The session-reconciliation state machine
//! - `verifier` - Token verification and the authenticator capability

pub mod audience;
pub mod claims;
pub mod config;
pub mod error;
pub mod hooks;
pub mod keys;
pub mod middleware;
pub mod session;
pub mod verifier;

pub use audience::AudienceResolver;
pub use claims::{AuthOutcome, VerifiedIdentity};
pub use config::GatewayAuthConfig;
pub use error::AuthError;
pub use hooks::{NullProvisioner, Session, SessionHandle, UserProvisioner};
pub use keys::{KeySet, KeyStore};
pub use middleware::{gateway_auth, GatewayAuth, GatewayIdentity};
pub use session::{
    local_part, reconcile, IdentityFields, Reconciliation, SessionBackend, SessionDecision,
    SessionState,
};
pub use verifier::{verify_token, Authenticator, GatewayAuthenticator, StubAuthenticator};
