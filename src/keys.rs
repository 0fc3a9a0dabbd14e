// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gateway verification key fetching and caching.
//!
//! ## Security
//!
//! - Keys are fetched via HTTPS with an explicit timeout
//! - Fetch or parse failure is fail-closed: it surfaces as a
//!   verification failure, never as "no token"
//! - The cache is refreshed after a TTL and on demand; concurrent
//!   cold-start callers are deduplicated into a single fetch
//!
//! ## Key document format
//!
//! The gateway publishes a JSON object mapping key ids to PEM-encoded
//! EC public keys:
//!
//! ```json
//! { "2nMJtw": "-----BEGIN PUBLIC KEY-----\n...\n-----END PUBLIC KEY-----\n" }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use tokio::sync::{Mutex, RwLock};

use crate::config::GatewayAuthConfig;
use crate::error::AuthError;

/// The gateway's current public verification keys.
///
/// Replaced wholesale on every refresh; individual keys are never
/// mutated in place.
#[derive(Clone, Debug)]
pub struct KeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

impl KeySet {
    /// Parse a key set out of the published key document.
    ///
    /// Individually unparseable keys are skipped with a warning so a
    /// single malformed entry cannot take down verification for the
    /// rest; an empty result is an error.
    pub fn from_document(document: &str) -> Result<Self, AuthError> {
        let raw: HashMap<String, String> = serde_json::from_str(document)
            .map_err(|e| AuthError::KeyFetch(format!("key document is not valid JSON: {e}")))?;

        let mut keys = HashMap::with_capacity(raw.len());
        for (kid, pem) in &raw {
            match DecodingKey::from_ec_pem(pem.as_bytes()) {
                Ok(key) => {
                    keys.insert(kid.clone(), key);
                }
                Err(e) => {
                    tracing::warn!(kid = %kid, error = %e, "Skipping unparseable gateway key");
                }
            }
        }

        if keys.is_empty() {
            return Err(AuthError::KeyFetch(
                "key document contained no usable keys".to_string(),
            ));
        }

        Ok(Self {
            keys,
            fetched_at: Instant::now(),
        })
    }

    /// Look up the decoding key for a key id.
    pub fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }

    /// Whether this set knows the given key id.
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// Number of usable keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set is empty. Parsing guarantees it never is.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// When this set was fetched.
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }
}

/// Key store with caching.
///
/// Fetches and caches the gateway's published key document. Shared
/// process-wide: clones share one cache.
#[derive(Clone)]
pub struct KeyStore {
    /// Key document URL
    key_url: String,
    /// Cache TTL
    cache_ttl: Duration,
    /// Cached key set
    cache: Arc<RwLock<Option<KeySet>>>,
    /// Serializes fetches so concurrent cold-start callers deduplicate
    /// into one network call
    fetch_lock: Arc<Mutex<()>>,
    /// HTTP client
    client: reqwest::Client,
}

impl KeyStore {
    /// Create a key store from configuration.
    pub fn new(config: &GatewayAuthConfig) -> Self {
        Self {
            key_url: config.key_url.clone(),
            cache_ttl: config.key_cache_ttl,
            cache: Arc::new(RwLock::new(None)),
            fetch_lock: Arc::new(Mutex::new(())),
            client: reqwest::Client::builder()
                .timeout(config.http_timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Get the current key set, fetching it if the cache is cold or
    /// stale.
    pub async fn get(&self) -> Result<KeySet, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(keys) = &*cache {
                if keys.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(keys.clone());
                }
            }
        }

        // Single-flight: only one caller fetches; the rest find the
        // fresh set on the re-check.
        let _flight = self.fetch_lock.lock().await;

        {
            let cache = self.cache.read().await;
            if let Some(keys) = &*cache {
                if keys.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(keys.clone());
                }
            }
        }

        let keys = self.fetch_keys().await?;

        {
            let mut cache = self.cache.write().await;
            *cache = Some(keys.clone());
        }

        Ok(keys)
    }

    /// Force refresh the cached key set.
    ///
    /// Used by operators and by the authenticator when a token carries a
    /// key id the cached set does not know (key rotation).
    pub async fn refresh(&self) -> Result<KeySet, AuthError> {
        let _flight = self.fetch_lock.lock().await;
        let keys = self.fetch_keys().await?;
        let mut cache = self.cache.write().await;
        *cache = Some(keys.clone());
        Ok(keys)
    }

    /// Drop the cached key set. The next `get` fetches fresh.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }

    /// Check if a key set is currently cached and fresh.
    pub async fn is_cached(&self) -> bool {
        let cache = self.cache.read().await;
        if let Some(keys) = &*cache {
            keys.fetched_at.elapsed() < self.cache_ttl
        } else {
            false
        }
    }

    /// Fetch and parse the key document from the endpoint.
    async fn fetch_keys(&self) -> Result<KeySet, AuthError> {
        let response = self
            .client
            .get(&self.key_url)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyFetch(format!(
                "HTTP {} from key endpoint",
                response.status()
            )));
        }

        let document = response
            .text()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        KeySet::from_document(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(key_url: String) -> GatewayAuthConfig {
        GatewayAuthConfig {
            key_url,
            project_id: None,
            ..GatewayAuthConfig::default()
        }
    }

    /// Serve `document` at `/public_key`, expecting `hits` fetches.
    async fn key_server(document: String, hits: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public_key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(document))
            .expect(hits)
            .mount(&server)
            .await;
        server
    }

    fn pem_document(kid: &str) -> String {
        let pem = crate::verifier::testkeys::generate().public_pem;
        serde_json::to_string(&HashMap::from([(kid.to_string(), pem)])).unwrap()
    }

    #[tokio::test]
    async fn fetches_and_caches_key_document() {
        let server = key_server(pem_document("kid-1"), 1).await;
        let store = KeyStore::new(&test_config(format!("{}/public_key", server.uri())));

        assert!(!store.is_cached().await);

        let keys = store.get().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("kid-1"));
        assert!(store.is_cached().await);

        // Second call must be served from cache (mock expects 1 hit).
        let again = store.get().await.unwrap();
        assert!(again.contains("kid-1"));
    }

    #[tokio::test]
    async fn refresh_always_refetches() {
        let server = key_server(pem_document("kid-1"), 2).await;
        let store = KeyStore::new(&test_config(format!("{}/public_key", server.uri())));

        store.get().await.unwrap();
        store.refresh().await.unwrap();
    }

    #[tokio::test]
    async fn invalidate_forces_next_get_to_fetch() {
        let server = key_server(pem_document("kid-1"), 2).await;
        let store = KeyStore::new(&test_config(format!("{}/public_key", server.uri())));

        store.get().await.unwrap();
        store.invalidate().await;
        assert!(!store.is_cached().await);
        store.get().await.unwrap();
    }

    #[tokio::test]
    async fn http_error_is_key_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public_key"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let store = KeyStore::new(&test_config(format!("{}/public_key", server.uri())));

        let err = store.get().await.unwrap_err();
        assert!(matches!(err, AuthError::KeyFetch(_)));
        assert!(!store.is_cached().await);
    }

    #[tokio::test]
    async fn garbage_document_is_key_fetch_error() {
        let server = key_server("not json at all".to_string(), 1).await;
        let store = KeyStore::new(&test_config(format!("{}/public_key", server.uri())));

        let err = store.get().await.unwrap_err();
        assert!(matches!(err, AuthError::KeyFetch(_)));
    }

    #[tokio::test]
    async fn unparseable_keys_are_skipped_but_empty_set_is_an_error() {
        let doc = serde_json::to_string(&HashMap::from([(
            "kid-1".to_string(),
            "-----BEGIN PUBLIC KEY-----\nnot a key\n-----END PUBLIC KEY-----\n".to_string(),
        )]))
        .unwrap();
        let err = KeySet::from_document(&doc).unwrap_err();
        assert!(matches!(err, AuthError::KeyFetch(_)));
    }

    #[test]
    fn document_with_mixed_keys_keeps_the_good_ones() {
        let good = crate::verifier::testkeys::generate().public_pem;
        let doc = serde_json::to_string(&HashMap::from([
            ("good".to_string(), good),
            ("bad".to_string(), "garbage".to_string()),
        ]))
        .unwrap();
        let keys = KeySet::from_document(&doc).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("good"));
        assert!(!keys.contains("bad"));
    }
}
