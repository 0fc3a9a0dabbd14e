// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gateway authentication middleware for Axum.
//!
//! Apply with `axum::middleware::from_fn_with_state`:
//!
//! ```rust,ignore
//! let auth = GatewayAuth::new(GatewayAuthConfig::new().with_audience("/projects/123/apps/demo"));
//!
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .layer(axum::middleware::from_fn_with_state(auth, gateway_auth));
//! ```
//!
//! The hosting application's session layer must run before this
//! middleware and insert a [`SessionHandle`] into request extensions;
//! its absence is a deployment mistake answered with a 500.
//!
//! This middleware establishes identity, it does not gate routes: a
//! missing or rejected assertion degrades the request to anonymous and
//! passes it through. Route protection stays the host's concern.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::claims::AuthOutcome;
use crate::config::GatewayAuthConfig;
use crate::error::AuthError;
use crate::hooks::{NullProvisioner, SessionHandle, UserProvisioner};
use crate::session::{reconcile, SessionDecision};
use crate::verifier::{Authenticator, GatewayAuthenticator};

/// Request-scoped identity facts for downstream handlers.
///
/// Always present in request extensions once the middleware has run,
/// anonymous requests included. Also usable directly as an extractor:
///
/// ```rust,ignore
/// async fn handler(identity: GatewayIdentity) -> impl IntoResponse {
///     // identity.email / identity.domain / identity.authenticated
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct GatewayIdentity {
    /// Verified email, when this request carried a verified assertion.
    pub email: Option<String>,
    /// Verified hosted domain, when present in the assertion.
    pub domain: Option<String>,
    /// Whether this request was authenticated by the gateway middleware.
    pub authenticated: bool,
}

impl<S> FromRequestParts<S> for GatewayIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<GatewayIdentity>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Middleware state: configuration plus the injected capabilities.
#[derive(Clone)]
pub struct GatewayAuth {
    config: Arc<GatewayAuthConfig>,
    authenticator: Arc<dyn Authenticator>,
    provisioner: Arc<dyn UserProvisioner>,
}

impl GatewayAuth {
    /// Create middleware state with the production authenticator and the
    /// accept-all provisioner.
    pub fn new(config: GatewayAuthConfig) -> Self {
        let authenticator = Arc::new(GatewayAuthenticator::new(&config));
        Self {
            config: Arc::new(config),
            authenticator,
            provisioner: Arc::new(NullProvisioner),
        }
    }

    /// Substitute the authenticator (test/staging override).
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Install the hosting application's user-provisioning hook.
    pub fn with_provisioner(mut self, provisioner: Arc<dyn UserProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &GatewayAuthConfig {
        &self.config
    }
}

/// Gateway authentication middleware function.
pub async fn gateway_auth(
    State(auth): State<GatewayAuth>,
    mut request: Request,
    next: Next,
) -> Response {
    // The session capability must be present whether or not this request
    // carries a token: its absence is a deployment mistake, not an
    // attacker, and must fail loudly.
    let Some(session) = request.extensions().get::<SessionHandle>().cloned() else {
        tracing::error!(
            "SessionHandle missing from request extensions; is the session layer installed \
             before the gateway auth middleware?"
        );
        return AuthError::MissingSessionLayer.into_response();
    };

    request.extensions_mut().insert(GatewayIdentity::default());

    let outcome = match request.headers().get(auth.config.header_name.as_str()) {
        // No token: not our concern, defer to other auth mechanisms.
        None => AuthOutcome::NoToken,
        Some(value) => match value.to_str() {
            Ok(token) => auth.authenticator.authenticate(token.trim()).await,
            Err(_) => {
                // A JWT is ASCII by construction; anything else cannot
                // verify.
                tracing::debug!("Assertion header is not valid ASCII, rejecting");
                AuthOutcome::Rejected
            }
        },
    };

    if outcome == AuthOutcome::NoToken {
        return next.run(request).await;
    }

    let existing = session.state().await;
    let reconciliation = reconcile(&existing, &outcome, auth.config.admin_domain.as_deref());

    // Provision on every verified request, not only at login, so the
    // admin bit tracks the current domain claim.
    let provisioned = match &reconciliation.identity {
        Some(fields) => {
            request.extensions_mut().insert(GatewayIdentity {
                email: Some(fields.email.clone()),
                domain: fields.domain.clone(),
                authenticated: true,
            });
            auth.provisioner.provision(fields).await
        }
        None => false,
    };

    match reconciliation.decision {
        SessionDecision::LeaveAsIs => {}
        SessionDecision::ForceLogout => {
            tracing::info!("Logging out gateway session after rejected assertion");
            session.logout().await;
        }
        SessionDecision::LoginAs { username } => {
            if provisioned {
                tracing::info!(user = %username, "Gateway login");
                session.login(&username).await;
            } else {
                tracing::warn!(user = %username, "Provisioning vetoed gateway login");
            }
        }
        SessionDecision::SwitchTo { username } => {
            // Old session first, new identity second: no window where
            // both identities' privileges are honored.
            tracing::info!(user = %username, "Gateway identity switch");
            session.logout().await;
            if provisioned {
                session.login(&username).await;
            } else {
                tracing::warn!(user = %username, "Provisioning vetoed gateway login");
            }
        }
    }

    next.run(request).await
}
