use crate::adapters::push::{ApnsNotification, ApnsResponse, PushClient, PushError};
use crate::error::CredentialError;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Identity;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

const PRODUCTION_HOST: &str = "https://api.push.apple.com";
const DEVELOPMENT_HOST: &str = "https://api.sandbox.push.apple.com";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);
const IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(90);
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const PING_TIMEOUT: Duration = Duration::from_secs(1);

// APNs rejects provider tokens older than an hour and throttles refreshes
// issued less than twenty minutes apart.
const TOKEN_REFRESH_AFTER: Duration = Duration::from_secs(50 * 60);

/// Resolved authentication material for an APNs connection.
pub enum ApnsAuth {
    /// TLS client certificate decoded from a PKCS#12 archive.
    Pkcs12(Identity),
    /// TLS client certificate and key decoded from PEM.
    Pem(Identity),
    /// Provider token signed with an ES256 `.p8` key.
    Token(TokenSigner),
}

impl std::fmt::Debug for ApnsAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pkcs12(_) => f.write_str("ApnsAuth::Pkcs12"),
            Self::Pem(_) => f.write_str("ApnsAuth::Pem"),
            Self::Token(signer) => f.debug_tuple("ApnsAuth::Token").field(signer).finish(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransportSettings {
    pub proxy: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Serialize)]
struct ProviderClaims<'a> {
    iss: &'a str,
    iat: i64,
}

struct CachedToken {
    bearer: String,
    issued: Instant,
}

/// Signs and caches provider authentication tokens.
pub struct TokenSigner {
    key: EncodingKey,
    key_id: String,
    team_id: String,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("key_id", &self.key_id).field("team_id", &self.team_id).finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Parses an ES256 private key in PEM form.
    ///
    /// # Errors
    /// Returns `CredentialError::InvalidKey` if the key cannot be parsed.
    pub fn from_pem(pem: &[u8], key_id: impl Into<String>, team_id: impl Into<String>) -> Result<Self, CredentialError> {
        let key = EncodingKey::from_ec_pem(pem).map_err(|e| CredentialError::InvalidKey(e.to_string()))?;
        Ok(Self { key, key_id: key_id.into(), team_id: team_id.into(), cached: Mutex::new(None) })
    }

    /// Returns a valid bearer token, signing a fresh one when the cached token is stale.
    ///
    /// # Errors
    /// Returns `PushError::Signing` if signing fails.
    pub fn bearer(&self) -> Result<String, PushError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = cached.as_ref()
            && token.issued.elapsed() < TOKEN_REFRESH_AFTER
        {
            return Ok(token.bearer.clone());
        }

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());
        let claims = ProviderClaims { iss: &self.team_id, iat: time::OffsetDateTime::now_utc().unix_timestamp() };
        let bearer =
            jsonwebtoken::encode(&header, &claims, &self.key).map_err(|e| PushError::Signing(e.to_string()))?;

        *cached = Some(CachedToken { bearer: bearer.clone(), issued: Instant::now() });
        Ok(bearer)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    reason: String,
}

/// HTTP/2 client for the APNs gateway.
#[derive(Debug)]
pub struct ApnsClient {
    http: reqwest::Client,
    host: &'static str,
    signer: Option<TokenSigner>,
}

impl ApnsClient {
    /// Builds a client bound to one credential set and environment.
    ///
    /// # Errors
    /// Returns `CredentialError::Client` if the HTTP client or proxy cannot be configured.
    pub fn new(auth: ApnsAuth, production: bool, settings: &TransportSettings) -> Result<Self, CredentialError> {
        let mut builder = reqwest::Client::builder()
            .http2_prior_knowledge()
            .http2_keep_alive_interval(HEALTH_CHECK_INTERVAL)
            .http2_keep_alive_timeout(PING_TIMEOUT)
            .http2_keep_alive_while_idle(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE);

        if !settings.request_timeout.is_zero() {
            builder = builder.timeout(settings.request_timeout);
        }

        if let Some(proxy) = settings.proxy.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?).pool_idle_timeout(IDLE_CONN_TIMEOUT);
        }

        let signer = match auth {
            // PKCS#12 identities are only understood by the native TLS backend.
            ApnsAuth::Pkcs12(identity) => {
                builder = builder.use_native_tls().identity(identity);
                None
            }
            ApnsAuth::Pem(identity) => {
                builder = builder.use_rustls_tls().identity(identity);
                None
            }
            ApnsAuth::Token(signer) => {
                builder = builder.use_rustls_tls();
                Some(signer)
            }
        };

        let host = if production { PRODUCTION_HOST } else { DEVELOPMENT_HOST };
        Ok(Self { http: builder.build()?, host, signer })
    }

    #[must_use]
    pub const fn host(&self) -> &'static str {
        self.host
    }
}

#[async_trait]
impl PushClient for ApnsClient {
    async fn push(&self, notification: &ApnsNotification) -> Result<ApnsResponse, PushError> {
        let url = format!("{}/3/device/{}", self.host, notification.device_token);
        let mut request = self.http.post(url).json(&notification.payload);

        if let Some(id) = &notification.apns_id {
            request = request.header("apns-id", id);
        }
        if let Some(topic) = &notification.topic {
            request = request.header("apns-topic", topic);
        }
        if let Some(collapse_id) = &notification.collapse_id {
            request = request.header("apns-collapse-id", collapse_id);
        }
        if let Some(priority) = notification.priority {
            request = request.header("apns-priority", priority.header_value());
        }
        if let Some(expiration) = notification.expiration {
            request = request.header("apns-expiration", expiration.unix_timestamp().to_string());
        }
        if let Some(push_type) = &notification.push_type {
            request = request.header("apns-push-type", push_type);
        }
        if let Some(signer) = &self.signer {
            request = request.bearer_auth(signer.bearer()?);
        }

        let response = request.send().await?;
        let status_code = response.status().as_u16();
        let apns_id = response.headers().get("apns-id").and_then(|v| v.to_str().ok()).map(str::to_string);

        if status_code == 200 {
            return Ok(ApnsResponse { status_code, reason: String::new(), apns_id });
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        Ok(ApnsResponse { status_code, reason: body.reason, apns_id })
    }
}
