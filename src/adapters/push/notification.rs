use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::domain::Sound;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApnsPriority {
    /// Delivered at a time that conserves power on the device.
    Low,
    /// Delivered immediately.
    High,
}

impl ApnsPriority {
    #[must_use]
    pub const fn header_value(self) -> &'static str {
        match self {
            Self::Low => "5",
            Self::High => "10",
        }
    }
}

/// One APNs request: routing headers plus the JSON payload for a single device.
#[derive(Debug, Clone, PartialEq)]
pub struct ApnsNotification {
    pub device_token: String,
    pub apns_id: Option<String>,
    pub topic: Option<String>,
    pub collapse_id: Option<String>,
    pub expiration: Option<OffsetDateTime>,
    pub priority: Option<ApnsPriority>,
    pub push_type: Option<String>,
    pub payload: Payload,
}

impl ApnsNotification {
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            device_token: String::new(),
            apns_id: None,
            topic: None,
            collapse_id: None,
            expiration: None,
            priority: None,
            push_type: None,
            payload,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Payload {
    pub aps: Aps,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<ApsSound>,
    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    pub content_available: Option<u8>,
    #[serde(rename = "mutable-content", skip_serializing_if = "Option::is_none")]
    pub mutable_content: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "thread-id", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(rename = "url-args", skip_serializing_if = "Vec::is_empty")]
    pub url_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AlertPayload {
    Plain(String),
    Dictionary(AlertDictionary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AlertDictionary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loc_args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub title_loc_args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_arg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_arg_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ApsSound {
    Name(String),
    Structured(Sound),
}

impl Payload {
    /// Sets a plain-text alert, replacing whatever alert was set before.
    pub fn alert_text(&mut self, text: impl Into<String>) {
        self.aps.alert = Some(AlertPayload::Plain(text.into()));
    }

    /// Edits the alert dictionary, promoting a plain-text alert to its body.
    pub fn update_alert(&mut self, update: impl FnOnce(&mut AlertDictionary)) {
        let mut dictionary = match self.aps.alert.take() {
            Some(AlertPayload::Dictionary(dictionary)) => dictionary,
            Some(AlertPayload::Plain(body)) => AlertDictionary { body: Some(body), ..AlertDictionary::default() },
            None => AlertDictionary::default(),
        };
        update(&mut dictionary);
        self.aps.alert = Some(AlertPayload::Dictionary(dictionary));
    }

    /// Edits the structured sound. A plain sound name is replaced.
    pub fn update_sound(&mut self, update: impl FnOnce(&mut Sound)) {
        let mut sound = match self.aps.sound.take() {
            Some(ApsSound::Structured(sound)) => sound,
            Some(ApsSound::Name(_)) | None => Sound::default(),
        };
        update(&mut sound);
        self.aps.sound = Some(ApsSound::Structured(sound));
    }
}
