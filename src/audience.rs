// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Expected-audience resolution.
//!
//! The audience bound into each assertion identifies the deployment the
//! token was minted for, in the form `/projects/{number}/apps/{id}`.
//! When configuration supplies the audience statically there is nothing
//! to resolve. Otherwise it is composed once from two lookups (the
//! project id from the environment, the numeric project id from the
//! local metadata service) and cached for the process lifetime.
//!
//! Resolution failure is fatal for the current request's authentication
//! attempt: the authenticator treats it as a rejection, never as "no
//! token".

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::config::GatewayAuthConfig;
use crate::error::AuthError;

/// Path of the numeric project id on the metadata service.
const NUMERIC_PROJECT_ID_PATH: &str = "/computeMetadata/v1/project/numeric-project-id";

/// Header the metadata service requires on every request.
const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");

/// Resolves and caches the expected token audience.
///
/// Clones share one cache; the composed value lives for the process
/// lifetime.
#[derive(Clone)]
pub struct AudienceResolver {
    /// Statically configured audience, when present. Configuration is
    /// the cache: no lookup and no separate caching happen in this mode.
    static_audience: Option<String>,
    /// Project id for audience composition.
    project_id: Option<String>,
    /// Metadata service base URL
    metadata_base_url: String,
    /// Cached composed audience
    cache: Arc<RwLock<Option<String>>>,
    /// Deduplicates concurrent first-access lookups
    fetch_lock: Arc<Mutex<()>>,
    /// HTTP client
    client: reqwest::Client,
}

impl AudienceResolver {
    /// Create a resolver from configuration.
    pub fn new(config: &GatewayAuthConfig) -> Self {
        Self {
            static_audience: config.static_audience.clone(),
            project_id: config.project_id.clone(),
            metadata_base_url: config.metadata_base_url.clone(),
            cache: Arc::new(RwLock::new(None)),
            fetch_lock: Arc::new(Mutex::new(())),
            client: reqwest::Client::builder()
                .timeout(config.http_timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Resolve the expected audience.
    pub async fn resolve(&self) -> Result<String, AuthError> {
        if let Some(audience) = &self.static_audience {
            return Ok(audience.clone());
        }

        {
            let cache = self.cache.read().await;
            if let Some(audience) = &*cache {
                return Ok(audience.clone());
            }
        }

        let _flight = self.fetch_lock.lock().await;

        {
            let cache = self.cache.read().await;
            if let Some(audience) = &*cache {
                return Ok(audience.clone());
            }
        }

        let audience = self.compose_audience().await?;

        {
            let mut cache = self.cache.write().await;
            *cache = Some(audience.clone());
        }

        Ok(audience)
    }

    /// Compose `/projects/{number}/apps/{id}` from the environment and
    /// the metadata service.
    async fn compose_audience(&self) -> Result<String, AuthError> {
        let project_id = self.project_id.as_deref().ok_or_else(|| {
            AuthError::AudienceResolution(format!(
                "no static audience and {} is not set",
                crate::config::PROJECT_ID_ENV
            ))
        })?;

        let url = format!("{}{}", self.metadata_base_url, NUMERIC_PROJECT_ID_PATH);
        let response = self
            .client
            .get(&url)
            .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
            .send()
            .await
            .map_err(|e| AuthError::AudienceResolution(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::AudienceResolution(format!(
                "HTTP {} from metadata service",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::AudienceResolution(e.to_string()))?;

        let project_number = body.trim();
        if project_number.is_empty() || !project_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(AuthError::AudienceResolution(format!(
                "metadata service returned a non-numeric project id: {project_number:?}"
            )));
        }

        Ok(format!("/projects/{project_number}/apps/{project_id}"))
    }
}
