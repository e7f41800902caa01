use crate::config::CoreConfig;
use crate::domain::LogPushEntry;
use std::time::Duration;

/// Posts failed push log entries to an external webhook.
#[derive(Debug, Clone)]
pub struct FeedbackNotifier {
    client: reqwest::Client,
    url: String,
}

impl FeedbackNotifier {
    /// Creates a notifier whose calls are bounded by `timeout`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }

    /// Builds a notifier when a feedback URL is configured.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(core: &CoreConfig) -> Result<Option<Self>, reqwest::Error> {
        match core.feedback_url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => Ok(Some(Self::new(url, Duration::from_secs(core.feedback_timeout_secs))?)),
            None => Ok(None),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends one entry as JSON.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    #[tracing::instrument(level = "debug", skip(self, entry), fields(url = %self.url), err)]
    pub async fn dispatch(&self, entry: &LogPushEntry) -> Result<(), reqwest::Error> {
        self.client.post(&self.url).json(entry).send().await?.error_for_status()?;
        Ok(())
    }
}
