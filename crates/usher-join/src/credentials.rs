//! Tiered credential resolution for bots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use usher_store::StateStore;

use crate::CredentialError;

#[derive(Debug, Deserialize)]
struct CredentialResponse {
    api_key: Option<String>,
    api_key_object_id: Option<String>,
}

/// Resolves a bot name to an API key for the joining service.
///
/// Lookup order: in-process cache, operator-provided static overrides, the
/// shared store tier, then the credential-issuing endpoint. A successful
/// remote resolution is written back to both cache tiers. Failures are
/// never cached, so a later call re-attempts resolution.
pub struct CredentialResolver {
    cache: RwLock<HashMap<String, String>>,
    overrides: HashMap<String, String>,
    default_key: Option<String>,
    store: Arc<dyn StateStore>,
    http: Client,
    credential_endpoint: Option<String>,
    internal_secret: Option<String>,
}

impl CredentialResolver {
    /// Create a resolver.
    ///
    /// Without a `credential_endpoint` the remote tier is disabled and only
    /// the caches and overrides are consulted. The `internal_secret`, when
    /// set, is forwarded so the endpoint returns the plaintext key instead
    /// of an opaque object id.
    pub fn new(
        store: Arc<dyn StateStore>,
        credential_endpoint: Option<String>,
        internal_secret: Option<String>,
    ) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            cache: RwLock::new(HashMap::new()),
            overrides: HashMap::new(),
            default_key: None,
            store,
            http,
            credential_endpoint,
            internal_secret,
        }
    }

    /// Add operator-provided static credentials, keyed by bot name.
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Set a single operator-provided API key used for every bot that has
    /// no per-bot override.
    pub fn with_default_key(mut self, key: Option<String>) -> Self {
        self.default_key = key;
        self
    }

    /// Resolve an API key for `bot_name`.
    pub async fn resolve(&self, bot_name: &str) -> Result<String, CredentialError> {
        if let Some(key) = self.cache.read().await.get(bot_name) {
            debug!(bot_name, "credential served from in-process cache");
            return Ok(key.clone());
        }

        if let Some(key) = self.overrides.get(bot_name).or(self.default_key.as_ref()) {
            debug!(bot_name, "credential served from static configuration");
            self.cache
                .write()
                .await
                .insert(bot_name.to_string(), key.clone());
            return Ok(key.clone());
        }

        match self.store.cached_credential(bot_name).await {
            Ok(Some(key)) => {
                debug!(bot_name, "credential served from shared store tier");
                self.cache
                    .write()
                    .await
                    .insert(bot_name.to_string(), key.clone());
                return Ok(key);
            }
            Ok(None) => {}
            // A store outage only skips this tier
            Err(error) => warn!(bot_name, %error, "shared credential tier unavailable"),
        }

        self.resolve_remote(bot_name).await
    }

    async fn resolve_remote(&self, bot_name: &str) -> Result<String, CredentialError> {
        let Some(endpoint) = &self.credential_endpoint else {
            return Err(CredentialError::NotFound(bot_name.to_string()));
        };

        let url = format!("{}/{}", endpoint, bot_name);
        info!(bot_name, "resolving credential from credential service");

        let mut request = self.http.get(&url);
        if let Some(secret) = &self.internal_secret {
            request = request.header("X-Internal-Secret", secret);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(CredentialError::NotFound(bot_name.to_string()));
        }
        if !status.is_success() {
            return Err(CredentialError::Rejected {
                bot_name: bot_name.to_string(),
                status: status.as_u16(),
            });
        }

        let body: CredentialResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

        let key = match (body.api_key, body.api_key_object_id) {
            (Some(key), _) => key,
            (None, Some(_)) => return Err(CredentialError::KeyWithheld(bot_name.to_string())),
            (None, None) => {
                return Err(CredentialError::InvalidResponse(
                    "neither api_key nor api_key_object_id present".to_string(),
                ));
            }
        };

        // Only successful resolutions are cached; a miss is never recorded
        // as a hit
        self.cache
            .write()
            .await
            .insert(bot_name.to_string(), key.clone());
        if let Err(error) = self.store.cache_credential(bot_name, &key).await {
            warn!(bot_name, %error, "failed to write credential to shared tier");
        }

        info!(bot_name, "credential resolved and cached");
        Ok(key)
    }
}
