use thiserror::Error;

/// Failures while turning credentials into a provider-ready client.
///
/// All of these are configuration problems: they abort the whole request and
/// are never retried.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("wrong certificate key extension: {0:?}")]
    UnsupportedExtension(String),
    #[error("wrong certificate key type: {0:?}")]
    UnsupportedKeyType(String),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to read key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("key id and team id are required for .p8 token authentication")]
    MissingTokenIds,
    #[error("failed to build provider client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Errors that abort a push request before or instead of per-token delivery.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("APNs provider is disabled")]
    ProviderDisabled,
    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("storage is not initialized")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, DispatchError>;
