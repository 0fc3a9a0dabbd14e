// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Two kinds of failure live here and they are deliberately kept apart:
//!
//! - [`AuthError`]: operational and deployment failures. Key-fetch and
//!   audience-resolution failures are fail-closed: the authenticator logs
//!   them and collapses them into a token rejection for the current
//!   request. A missing session layer is a deployment mistake and aborts
//!   the request with a 500.
//! - [`RejectReason`]: the specific reason a token failed verification.
//!   It never crosses the verifier boundary except as log detail, so a
//!   caller cannot distinguish a bad signature from a wrong audience.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
///
/// These are the only failures that propagate out of this crate's
/// components. Token verification failures are not errors; they collapse
/// into [`AuthOutcome::Rejected`](crate::claims::AuthOutcome::Rejected).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Fetching or parsing the gateway's published key document failed.
    #[error("failed to fetch gateway verification keys: {0}")]
    KeyFetch(String),

    /// The expected token audience could not be resolved from
    /// configuration or the metadata service.
    #[error("failed to resolve token audience: {0}")]
    AudienceResolution(String),

    /// No session capability was found on the request. The hosting
    /// application must install its session layer before this crate's
    /// middleware so a `SessionHandle` is present in request extensions.
    #[error(
        "no session layer installed: insert a SessionHandle into request \
         extensions before the gateway auth middleware runs"
    )]
    MissingSessionLayer,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::KeyFetch(_) => "key_fetch_error",
            AuthError::AudienceResolution(_) => "audience_resolution_error",
            AuthError::MissingSessionLayer => "missing_session_layer",
        }
    }

    /// Get the HTTP status code for this error.
    ///
    /// All variants are server-side faults: none of them is the caller's
    /// doing, and none of them may silently degrade into "no token".
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::KeyFetch(_)
            | AuthError::AudienceResolution(_)
            | AuthError::MissingSessionLayer => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

/// Why a token was rejected.
///
/// Crate-private on purpose: every one of these collapses to a single
/// `Rejected` outcome at the verifier boundary. The reason is logged for
/// operators and must not leak into control flow or responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub(crate) enum RejectReason {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("token audience does not match")]
    WrongAudience,
    #[error("token algorithm is not ES256")]
    UnsupportedAlgorithm,
    #[error("token is missing the email claim")]
    MissingEmail,
    #[error("no key in the key set matches the token")]
    NoMatchingKey,
}
