// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Assertion verification.
//!
//! [`verify_token`] is a pure function of the token, the expected
//! audience, and a key set, with no I/O. The [`Authenticator`] trait wraps
//! it as an injectable capability: production uses
//! [`GatewayAuthenticator`] (key store + audience resolver + pure
//! verification), tests and staging substitute [`StubAuthenticator`].
//!
//! ## Security
//!
//! - Exactly one signing algorithm (ES256) is accepted. Any other
//!   algorithm is rejected before key lookup, even if cryptographically
//!   valid, to rule out algorithm-confusion attacks.
//! - Audience comparison is exact string equality, no wildcarding.
//! - Every verification failure collapses to a single `Rejected`
//!   outcome. The specific reason is logged for operators only.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};

use crate::audience::AudienceResolver;
use crate::claims::{AssertionClaims, AuthOutcome, VerifiedIdentity};
use crate::config::GatewayAuthConfig;
use crate::error::RejectReason;
use crate::keys::{KeySet, KeyStore};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Verify a gateway assertion against an audience and key set.
///
/// Pure: all key material and the audience are supplied by the caller.
/// Returns `Verified` with the extracted identity, or `Rejected` for any
/// failure; callers cannot observe which check failed.
pub fn verify_token(token: &str, audience: &str, keys: &KeySet) -> AuthOutcome {
    match check_token(token, audience, keys) {
        Ok(identity) => AuthOutcome::Verified(identity),
        Err(reason) => {
            tracing::debug!(reason = %reason, "Rejected gateway assertion");
            AuthOutcome::Rejected
        }
    }
}

/// Verification worker with the rejection reason kept visible, so the
/// authenticator can react to `NoMatchingKey` (key rotation) before
/// collapsing the result.
pub(crate) fn check_token(
    token: &str,
    audience: &str,
    keys: &KeySet,
) -> Result<VerifiedIdentity, RejectReason> {
    let header = decode_header(token).map_err(|_| RejectReason::Malformed)?;

    // Reject foreign algorithms before touching any key material.
    if header.alg != Algorithm::ES256 {
        return Err(RejectReason::UnsupportedAlgorithm);
    }

    let kid = header.kid.as_deref().ok_or(RejectReason::Malformed)?;
    let key = keys.get(kid).ok_or(RejectReason::NoMatchingKey)?;

    let mut validation = Validation::new(Algorithm::ES256);
    validation.set_audience(&[audience]);
    validation.leeway = CLOCK_SKEW_LEEWAY;
    validation.validate_nbf = true;

    let token_data =
        decode::<AssertionClaims>(token, key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => RejectReason::Expired,
            jsonwebtoken::errors::ErrorKind::ImmatureSignature => RejectReason::NotYetValid,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => RejectReason::BadSignature,
            jsonwebtoken::errors::ErrorKind::InvalidAudience => RejectReason::WrongAudience,
            jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => RejectReason::UnsupportedAlgorithm,
            _ => RejectReason::Malformed,
        })?;

    let claims = token_data.claims;
    let email = claims
        .email
        .filter(|email| !email.is_empty())
        .ok_or(RejectReason::MissingEmail)?;

    Ok(VerifiedIdentity {
        email,
        domain: claims.hd,
    })
}

/// Injectable authentication capability.
///
/// The middleware depends on this trait, not on a concrete verifier, so
/// deployments can substitute a deterministic stub via configuration.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Attempt to authenticate a bearer token.
    ///
    /// Never fails: operational problems (keys or audience unavailable)
    /// collapse into `Rejected`, fail-closed.
    async fn authenticate(&self, token: &str) -> AuthOutcome;
}

/// Production authenticator: cached keys + resolved audience + pure
/// verification.
#[derive(Clone)]
pub struct GatewayAuthenticator {
    keys: KeyStore,
    audience: AudienceResolver,
}

impl GatewayAuthenticator {
    /// Create an authenticator from configuration.
    pub fn new(config: &GatewayAuthConfig) -> Self {
        Self {
            keys: KeyStore::new(config),
            audience: AudienceResolver::new(config),
        }
    }

    /// The underlying key store, for operator-driven refresh or
    /// invalidation.
    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }
}

#[async_trait]
impl Authenticator for GatewayAuthenticator {
    async fn authenticate(&self, token: &str) -> AuthOutcome {
        let audience = match self.audience.resolve().await {
            Ok(audience) => audience,
            Err(e) => {
                tracing::warn!(error = %e, "Audience unresolvable, treating assertion as rejected");
                return AuthOutcome::Rejected;
            }
        };

        let keys = match self.keys.get().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Verification keys unavailable, treating assertion as rejected");
                return AuthOutcome::Rejected;
            }
        };

        match check_token(token, &audience, &keys) {
            Ok(identity) => AuthOutcome::Verified(identity),
            Err(RejectReason::NoMatchingKey) => {
                // The token names a key we do not hold; the gateway may
                // have rotated. Refresh once and retry.
                // TODO: bound unknown-kid refreshes with a rate limit so
                // a flood of forged kids cannot hammer the key endpoint.
                let fresh = match self.keys.refresh().await {
                    Ok(fresh) => fresh,
                    Err(e) => {
                        tracing::warn!(error = %e, "Key refresh after unknown kid failed");
                        return AuthOutcome::Rejected;
                    }
                };
                match check_token(token, &audience, &fresh) {
                    Ok(identity) => AuthOutcome::Verified(identity),
                    Err(reason) => {
                        tracing::debug!(reason = %reason, "Rejected gateway assertion");
                        AuthOutcome::Rejected
                    }
                }
            }
            Err(reason) => {
                tracing::debug!(reason = %reason, "Rejected gateway assertion");
                AuthOutcome::Rejected
            }
        }
    }
}

/// Deterministic authenticator for tests and staging.
///
/// Returns a fixed outcome regardless of input, injected through the
/// same configuration surface as the production verifier.
#[derive(Debug, Clone)]
pub struct StubAuthenticator {
    outcome: AuthOutcome,
}

impl StubAuthenticator {
    /// Stub that returns the given outcome for every token.
    pub fn new(outcome: AuthOutcome) -> Self {
        Self { outcome }
    }

    /// Stub that verifies every token as the given identity.
    pub fn verified(email: impl Into<String>, domain: Option<&str>) -> Self {
        Self::new(AuthOutcome::Verified(VerifiedIdentity::new(
            email,
            domain.map(str::to_string),
        )))
    }

    /// Stub that rejects every token.
    pub fn rejected() -> Self {
        Self::new(AuthOutcome::Rejected)
    }
}

#[async_trait]
impl Authenticator for StubAuthenticator {
    async fn authenticate(&self, _token: &str) -> AuthOutcome {
        self.outcome.clone()
    }
}
