// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Gateway Authentication Configuration
//!
//! Configuration for the gateway auth middleware. Every field has a
//! production default; tests and staging override individual fields with
//! the builder methods.
//!
//! ## Configuration Surface
//!
//! | Field | Description | Default |
//! |-------|-------------|---------|
//! | `header_name` | Request header carrying the assertion | `x-goog-iap-jwt-assertion` |
//! | `key_url` | Gateway's published verification key document | gstatic IAP endpoint |
//! | `key_cache_ttl` | How long fetched keys stay fresh | 12 hours |
//! | `static_audience` | Expected audience; skips metadata resolution when set | unset |
//! | `admin_domain` | Domain granting elevated privileges on exact match | unset |
//! | `metadata_base_url` | Local metadata service base URL | `http://metadata.google.internal` |
//! | `project_id` | Project id for audience composition | `GOOGLE_CLOUD_PROJECT` env |
//! | `http_timeout` | Timeout for key and metadata fetches | 10 seconds |

use std::time::Duration;

/// Request header the gateway injects the signed assertion into.
pub const ASSERTION_HEADER: &str = "x-goog-iap-jwt-assertion";

/// Endpoint publishing the gateway's public verification keys, as a JSON
/// object of key id to PEM-encoded EC public key.
pub const PUBLIC_KEY_URL: &str = "https://www.gstatic.com/iap/verify/public_key";

/// Base URL of the local metadata service used for audience resolution.
pub const METADATA_BASE_URL: &str = "http://metadata.google.internal";

/// Environment variable supplying the project id for audience composition.
pub const PROJECT_ID_ENV: &str = "GOOGLE_CLOUD_PROJECT";

/// Default freshness window for the cached key set.
///
/// The gateway rotates keys rarely; an unknown `kid` triggers an
/// immediate refresh regardless of this TTL, so the window bounds
/// staleness without making rotation visible to users.
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Default timeout for key-document and metadata fetches. A hang at
/// either endpoint must fail the request, not stall it.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway authentication configuration.
#[derive(Debug, Clone)]
pub struct GatewayAuthConfig {
    /// Header carrying the bearer assertion. Absence of the header is a
    /// normal, non-error case.
    pub header_name: String,
    /// URL of the gateway's published key document.
    pub key_url: String,
    /// Freshness window for cached keys.
    pub key_cache_ttl: Duration,
    /// Statically configured audience. When set, no metadata lookups are
    /// performed; configuration is the cache.
    pub static_audience: Option<String>,
    /// Domain granting elevated privileges on exact match against the
    /// verified identity's domain claim.
    pub admin_domain: Option<String>,
    /// Base URL of the metadata service (overridable for tests).
    pub metadata_base_url: String,
    /// Project id used to compose the audience. Captured from
    /// [`PROJECT_ID_ENV`] by default.
    pub project_id: Option<String>,
    /// Timeout applied to outbound key and metadata fetches.
    pub http_timeout: Duration,
}

impl Default for GatewayAuthConfig {
    fn default() -> Self {
        Self {
            header_name: ASSERTION_HEADER.to_string(),
            key_url: PUBLIC_KEY_URL.to_string(),
            key_cache_ttl: DEFAULT_KEY_CACHE_TTL,
            static_audience: None,
            admin_domain: None,
            metadata_base_url: METADATA_BASE_URL.to_string(),
            project_id: std::env::var(PROJECT_ID_ENV).ok(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl GatewayAuthConfig {
    /// Create a configuration with production defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected audience, skipping metadata resolution.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.static_audience = Some(audience.into());
        self
    }

    /// Set the domain whose members receive elevated privileges.
    pub fn with_admin_domain(mut self, domain: impl Into<String>) -> Self {
        self.admin_domain = Some(domain.into());
        self
    }

    /// Override the assertion header name.
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Override the key document URL.
    pub fn with_key_url(mut self, url: impl Into<String>) -> Self {
        self.key_url = url.into();
        self
    }

    /// Override the key cache freshness window.
    pub fn with_key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.key_cache_ttl = ttl;
        self
    }

    /// Override the metadata service base URL.
    pub fn with_metadata_base_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_base_url = url.into();
        self
    }

    /// Override the project id used for audience composition.
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_production_endpoints() {
        let config = GatewayAuthConfig {
            project_id: None,
            ..GatewayAuthConfig::default()
        };
        assert_eq!(config.header_name, ASSERTION_HEADER);
        assert_eq!(config.key_url, PUBLIC_KEY_URL);
        assert_eq!(config.metadata_base_url, METADATA_BASE_URL);
        assert!(config.static_audience.is_none());
        assert!(config.admin_domain.is_none());
    }

    #[test]
    fn builder_overrides() {
        let config = GatewayAuthConfig::new()
            .with_audience("/projects/123/apps/demo")
            .with_admin_domain("example.com")
            .with_key_cache_ttl(Duration::from_secs(60));
        assert_eq!(
            config.static_audience.as_deref(),
            Some("/projects/123/apps/demo")
        );
        assert_eq!(config.admin_domain.as_deref(), Some("example.com"));
        assert_eq!(config.key_cache_ttl, Duration::from_secs(60));
    }
}
