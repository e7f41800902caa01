use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::LogConfig;
use crate::domain::push::Platform;

/// How a single delivery attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    RetryableFailure,
    PermanentFailure,
}

impl Classification {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Per-token result of one dispatch round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub token: String,
    pub classification: Classification,
    pub error_detail: Option<String>,
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushStatus {
    #[serde(rename = "succeeded-push")]
    Succeeded,
    #[serde(rename = "failed-push")]
    Failed,
}

/// Structured record of one push attempt, used for feedback and sync responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPushEntry {
    #[serde(rename = "type")]
    pub status: PushStatus,
    pub platform: String,
    pub token: String,
    /// Empty, and left out of the JSON, when messages are hidden.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

const TOKEN_MARK_LEN: usize = 10;

impl LogPushEntry {
    #[must_use]
    pub fn new(
        status: PushStatus,
        platform: Platform,
        token: &str,
        message: &str,
        error: Option<String>,
        log: &LogConfig,
    ) -> Self {
        let token = if log.hide_token { hide_token(token, TOKEN_MARK_LEN) } else { token.to_string() };
        let message = if log.hide_messages { String::new() } else { message.to_string() };

        Self {
            status,
            platform: platform.as_str().to_string(),
            token,
            message,
            error,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Keeps the first and last `mark_len` characters of a token and masks the rest.
#[must_use]
pub fn hide_token(token: &str, mark_len: usize) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < mark_len * 2 {
        return "*".repeat(chars.len());
    }

    let head: String = chars[..mark_len].iter().collect();
    let tail: String = chars[chars.len() - mark_len..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - mark_len * 2))
}
