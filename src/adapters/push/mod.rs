use async_trait::async_trait;
use thiserror::Error;

pub mod apns;
pub mod notification;

pub use apns::{ApnsAuth, ApnsClient, TokenSigner, TransportSettings};
pub use notification::{AlertDictionary, AlertPayload, ApnsNotification, ApnsPriority, Aps, ApsSound, Payload};

/// A failed attempt that never produced a provider response.
#[derive(Error, Debug)]
pub enum PushError {
    #[error("request to provider failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to sign provider token: {0}")]
    Signing(String),
    #[error("External service error: {0}")]
    Other(#[from] anyhow::Error),
}

/// What the provider answered for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApnsResponse {
    pub status_code: u16,
    pub reason: String,
    pub apns_id: Option<String>,
}

impl ApnsResponse {
    #[must_use]
    pub fn accepted() -> Self {
        Self { status_code: 200, reason: String::new(), apns_id: None }
    }

    #[must_use]
    pub fn rejected(status_code: u16, reason: impl Into<String>) -> Self {
        Self { status_code, reason: reason.into(), apns_id: None }
    }

    /// The provider accepted the notification.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        self.status_code == 200
    }
}

#[async_trait]
pub trait PushClient: Send + Sync + std::fmt::Debug {
    /// Sends one notification to the device named by `notification.device_token`.
    ///
    /// # Errors
    /// Returns `PushError` when no provider response was received.
    async fn push(&self, notification: &ApnsNotification) -> Result<ApnsResponse, PushError>;
}
