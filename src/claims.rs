// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Assertion claims and the verified-identity representation.

use serde::Deserialize;

/// Claims carried by a gateway identity assertion.
///
/// The gateway signs a short-lived JWT per request. Standard temporal
/// claims (`exp`, `iat`) and the audience are validated by the
/// `jsonwebtoken` decoder; the identity claims are extracted here.
#[derive(Debug, Clone, Deserialize)]
pub struct AssertionClaims {
    /// Verified email address of the end user. Required: an assertion
    /// without an email is rejected.
    #[serde(default)]
    pub email: Option<String>,

    /// Hosted domain of the account, when the account belongs to one.
    #[serde(default)]
    pub hd: Option<String>,

    /// Subject identifier assigned by the gateway.
    #[serde(default)]
    #[allow(dead_code)]
    pub sub: Option<String>,

    /// Expiration timestamp (validated by the jsonwebtoken crate).
    #[serde(default)]
    #[allow(dead_code)]
    pub exp: i64,

    /// Issued-at timestamp.
    #[serde(default)]
    #[allow(dead_code)]
    pub iat: i64,

    /// Audience (validated by the jsonwebtoken crate, not read directly).
    #[serde(default)]
    #[allow(dead_code)]
    pub aud: Option<serde_json::Value>,
}

/// Identity established by a successfully verified assertion.
///
/// Ephemeral: scoped to a single request. The session reconciler derives
/// the canonical username and the admin bit from these fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Verified email address. Always present on a verified identity.
    pub email: String,
    /// Hosted domain claim, if any. `None` means no admin-domain match is
    /// possible for this identity.
    pub domain: Option<String>,
}

impl VerifiedIdentity {
    /// Create a verified identity from its claims.
    pub fn new(email: impl Into<String>, domain: Option<String>) -> Self {
        Self {
            email: email.into(),
            domain,
        }
    }
}

/// Result of attempting authentication on a request.
///
/// Drives all downstream session decisions. `Rejected` deliberately
/// carries no detail: the specific failure is logged by the verifier and
/// must not be observable in control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The request carried no assertion header. Not this crate's concern;
    /// other authentication mechanisms are left undisturbed.
    NoToken,
    /// An assertion was present but failed verification, or the key or
    /// audience material needed to verify it was unavailable.
    Rejected,
    /// The assertion verified and yielded an identity.
    Verified(VerifiedIdentity),
}

impl AuthOutcome {
    /// Whether this outcome carries a verified identity.
    pub fn is_verified(&self) -> bool {
        matches!(self, AuthOutcome::Verified(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_deserialize_with_optional_fields_absent() {
        let claims: AssertionClaims =
            serde_json::from_str(r#"{"email":"a@x.com","exp":1700003600}"#).unwrap();
        assert_eq!(claims.email.as_deref(), Some("a@x.com"));
        assert!(claims.hd.is_none());
    }

    #[test]
    fn claims_deserialize_with_domain() {
        let claims: AssertionClaims = serde_json::from_str(
            r#"{"email":"a@x.com","hd":"x.com","exp":1700003600,"iat":1700000000}"#,
        )
        .unwrap();
        assert_eq!(claims.hd.as_deref(), Some("x.com"));
    }

    #[test]
    fn outcome_verified_check() {
        assert!(!AuthOutcome::NoToken.is_verified());
        assert!(!AuthOutcome::Rejected.is_verified());
        assert!(AuthOutcome::Verified(VerifiedIdentity::new("a@x.com", None)).is_verified());
    }
}
