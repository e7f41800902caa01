use crate::adapters::push::{ApnsAuth, ApnsClient, PushClient, TokenSigner, TransportSettings};
use crate::config::IosConfig;
use crate::domain::{CredentialOverrides, PushRequest};
use crate::error::{CredentialError, DispatchError};
use crate::services::limiter::ConcurrencyLimiter;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use reqwest::Identity;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Supplies provider clients and the shared limiter to the retry controller.
#[async_trait]
pub trait ClientSource: Send + Sync + std::fmt::Debug {
    /// Resolves a client for the request's credentials and environment.
    ///
    /// # Errors
    /// Returns `DispatchError` when the provider is disabled or the credentials
    /// cannot be turned into a client.
    async fn resolve(&self, req: &PushRequest) -> Result<Arc<dyn PushClient>, DispatchError>;

    /// The process-wide limiter bounding in-flight provider calls.
    fn limiter(&self) -> ConcurrencyLimiter;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Pkcs12,
    Pem,
    P8,
}

impl KeyFormat {
    fn from_extension(path: &str) -> Result<Self, CredentialError> {
        let extension = Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or_default();
        Self::parse(extension).ok_or_else(|| CredentialError::UnsupportedExtension(extension.to_string()))
    }

    fn from_key_type(key_type: &str) -> Result<Self, CredentialError> {
        Self::parse(key_type.trim_start_matches('.'))
            .ok_or_else(|| CredentialError::UnsupportedKeyType(key_type.to_string()))
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "p12" => Some(Self::Pkcs12),
            "pem" => Some(Self::Pem),
            "p8" => Some(Self::P8),
            _ => None,
        }
    }
}

/// Deployment credentials with the request's overrides applied field by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub key_path: String,
    pub key_base64: String,
    pub key_type: String,
    pub password: String,
    pub key_id: String,
    pub team_id: String,
    pub production: bool,
}

impl ResolvedCredentials {
    #[must_use]
    pub fn resolve(ios: &IosConfig, overrides: &CredentialOverrides, production: bool) -> Self {
        let pick = |request: &str, deployment: &str| {
            if request.is_empty() { deployment.to_string() } else { request.to_string() }
        };

        Self {
            key_path: pick(&overrides.key_path, &ios.key_path),
            key_base64: pick(&overrides.key_base64, &ios.key_base64),
            key_type: pick(&overrides.key_type, &ios.key_type),
            password: pick(&overrides.password, &ios.password),
            key_id: pick(&overrides.key_id, &ios.key_id),
            team_id: pick(&overrides.team_id, &ios.team_id),
            production,
        }
    }

    #[must_use]
    pub fn has_key_material(&self) -> bool {
        !self.key_path.is_empty() || !self.key_base64.is_empty()
    }

    /// Identifies a client cache entry. Key file contents are not hashed, only
    /// the path.
    #[must_use]
    pub fn fingerprint(&self, proxy: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.key_path.as_str(),
            self.key_base64.as_str(),
            self.key_type.as_str(),
            self.password.as_str(),
            self.key_id.as_str(),
            self.team_id.as_str(),
            if self.production { "production" } else { "development" },
            proxy.unwrap_or_default(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }

    /// Reads or decodes the key material and selects its format.
    ///
    /// # Errors
    /// Returns `CredentialError` for an unknown extension or key type, an
    /// unreadable file, or invalid base64.
    pub async fn load_key(&self) -> Result<(KeyFormat, Vec<u8>), CredentialError> {
        if !self.key_path.is_empty() {
            let format = KeyFormat::from_extension(&self.key_path)?;
            let bytes = tokio::fs::read(&self.key_path)
                .await
                .map_err(|source| CredentialError::Io { path: self.key_path.clone(), source })?;
            return Ok((format, bytes));
        }

        let format = KeyFormat::from_key_type(&self.key_type)?;
        let bytes = STANDARD.decode(self.key_base64.trim())?;
        Ok((format, bytes))
    }

    /// Turns the key material into client authentication.
    ///
    /// # Errors
    /// Returns `CredentialError` when the material cannot be loaded or parsed,
    /// or when token authentication lacks a key id or team id.
    pub async fn authentication(&self) -> Result<ApnsAuth, CredentialError> {
        let (format, bytes) = self.load_key().await?;
        match format {
            KeyFormat::Pkcs12 => Identity::from_pkcs12_der(&bytes, &self.password)
                .map(ApnsAuth::Pkcs12)
                .map_err(|e| CredentialError::InvalidKey(e.to_string())),
            KeyFormat::Pem => {
                if !self.password.is_empty() {
                    tracing::warn!("PEM keys are read unencrypted, ignoring the configured password");
                }
                Identity::from_pem(&bytes).map(ApnsAuth::Pem).map_err(|e| CredentialError::InvalidKey(e.to_string()))
            }
            KeyFormat::P8 => {
                if self.key_id.is_empty() || self.team_id.is_empty() {
                    return Err(CredentialError::MissingTokenIds);
                }
                Ok(ApnsAuth::Token(TokenSigner::from_pem(&bytes, self.key_id.clone(), self.team_id.clone())?))
            }
        }
    }
}

#[derive(Debug)]
struct CachedClient {
    client: Arc<dyn PushClient>,
    last_used: AtomicU64,
}

/// Resolves credentials into cached APNs clients.
///
/// At most `client_cache_size` credential sets keep a live client; the least
/// recently used one is dropped when a new set pushes the cache past that.
/// Rounds already holding an evicted client keep using it until they finish.
#[derive(Debug)]
pub struct ApnsClientFactory {
    ios: IosConfig,
    proxy: Option<String>,
    request_timeout: Duration,
    cache_size: usize,
    clients: DashMap<String, CachedClient>,
    clock: AtomicU64,
    limiter: OnceLock<ConcurrencyLimiter>,
}

impl ApnsClientFactory {
    #[must_use]
    pub fn new(ios: IosConfig, proxy: Option<String>) -> Self {
        let request_timeout = Duration::from_secs(ios.request_timeout_secs);
        let cache_size = ios.client_cache_size.max(1);
        Self {
            ios,
            proxy: proxy.filter(|p| !p.is_empty()),
            request_timeout,
            cache_size,
            clients: DashMap::new(),
            clock: AtomicU64::new(0),
            limiter: OnceLock::new(),
        }
    }

    /// Number of distinct credential sets with a live client.
    #[must_use]
    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn evict_least_recent(&self, keep: &str) {
        while self.clients.len() > self.cache_size {
            let oldest = self
                .clients
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().last_used.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else { break };
            self.clients.remove(&oldest);
            tracing::debug!(cached = self.clients.len(), "Evicted least recently used APNs client");
        }
    }

    async fn build_client(&self, credentials: &ResolvedCredentials) -> Result<Arc<dyn PushClient>, DispatchError> {
        let auth = credentials.authentication().await?;
        let settings = TransportSettings { proxy: self.proxy.clone(), request_timeout: self.request_timeout };
        let client = ApnsClient::new(auth, credentials.production, &settings)?;
        tracing::info!(host = client.host(), proxied = self.proxy.is_some(), "Created APNs client");
        let client: Arc<dyn PushClient> = Arc::new(client);
        Ok(client)
    }
}

#[async_trait]
impl ClientSource for ApnsClientFactory {
    async fn resolve(&self, req: &PushRequest) -> Result<Arc<dyn PushClient>, DispatchError> {
        if !self.ios.enabled {
            return Err(DispatchError::ProviderDisabled);
        }

        let credentials =
            ResolvedCredentials::resolve(&self.ios, &req.credentials, req.use_production(self.ios.production));
        if !credentials.has_key_material() {
            return Err(DispatchError::ProviderDisabled);
        }

        let fingerprint = credentials.fingerprint(self.proxy.as_deref());
        if let Some(cached) = self.clients.get(&fingerprint) {
            cached.last_used.store(self.tick(), Ordering::Relaxed);
            return Ok(Arc::clone(&cached.client));
        }

        // Two concurrent misses may both build; the first insert wins and the
        // other client is dropped.
        let client = self.build_client(&credentials).await?;
        let client = Arc::clone(
            &self
                .clients
                .entry(fingerprint.clone())
                .or_insert_with(|| CachedClient { client, last_used: AtomicU64::new(self.tick()) })
                .client,
        );
        self.evict_least_recent(&fingerprint);
        Ok(client)
    }

    fn limiter(&self) -> ConcurrencyLimiter {
        self.limiter.get_or_init(|| ConcurrencyLimiter::new(self.ios.max_concurrent_pushes)).clone()
    }
}
