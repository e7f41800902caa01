use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::DispatchError;

/// Push providers a request can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Platform {
    Ios = 1,
    Android = 2,
    Huawei = 3,
}

impl Platform {
    pub const ALL: [Self; 3] = [Self::Ios, Self::Android, Self::Huawei];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Huawei => "huawei",
        }
    }
}

impl TryFrom<u8> for Platform {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ios),
            2 => Ok(Self::Android),
            3 => Ok(Self::Huawei),
            other => Err(format!("unknown platform {other}")),
        }
    }
}

impl From<Platform> for u8 {
    fn from(platform: Platform) -> Self {
        platform as Self
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured alert dictionary fields of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Alert {
    pub title: String,
    pub subtitle: String,
    pub body: String,
    pub action: String,
    pub action_loc_key: String,
    pub launch_image: String,
    pub loc_key: String,
    pub loc_args: Vec<String>,
    pub title_loc_key: String,
    pub title_loc_args: Vec<String>,
    pub summary_arg: String,
    pub summary_arg_count: i64,
}

/// A structured sound; zero values are omitted from the wire payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sound {
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub critical: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub volume: f32,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_f32(value: &f32) -> bool {
    *value == 0.0
}

impl Sound {
    /// Decodes a loosely typed mapping, ignoring keys it does not know.
    #[must_use]
    pub fn from_mapping(mapping: &Map<String, Value>) -> Self {
        let critical = match mapping.get("critical") {
            Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
            Some(Value::Bool(b)) => i64::from(*b),
            Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
            _ => 0,
        };
        let name = match mapping.get("name") {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        #[allow(clippy::cast_possible_truncation)]
        let volume = match mapping.get("volume") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or_default() as f32,
            Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
            _ => 0.0,
        };
        Self { critical, name, volume }
    }
}

/// The request-level `sound` field, resolved once when the request is parsed.
///
/// A JSON object matching [`Sound`] exactly becomes `Structured`; any other
/// object falls through to `Raw` and is decoded leniently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SoundField {
    Name(String),
    Structured(Sound),
    Raw(Map<String, Value>),
}

/// Per-request credential overrides; an empty field falls back to the deployment value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialOverrides {
    #[serde(rename = "apns_key_path")]
    pub key_path: String,
    #[serde(rename = "apns_key_base64")]
    pub key_base64: String,
    #[serde(rename = "apns_key_type")]
    pub key_type: String,
    #[serde(rename = "apns_password")]
    pub password: String,
    #[serde(rename = "apns_key_id")]
    pub key_id: String,
    #[serde(rename = "apns_team_id")]
    pub team_id: String,
}

/// A batch push submission as received from the HTTP or queue layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub tokens: Vec<String>,
    pub platform: Platform,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub alert: Alert,
    #[serde(default)]
    pub badge: Option<i64>,
    #[serde(default)]
    pub sound: Option<SoundField>,
    #[serde(default)]
    pub sound_name: String,
    #[serde(default)]
    pub sound_volume: f32,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub content_available: bool,
    #[serde(default)]
    pub mutable_content: bool,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub url_args: Vec<String>,
    #[serde(default)]
    pub collapse_id: String,
    #[serde(default)]
    pub push_type: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub expiration: Option<i64>,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub apns_id: String,
    #[serde(flatten)]
    pub credentials: CredentialOverrides,
    #[serde(default)]
    pub production: bool,
    #[serde(default)]
    pub development: bool,
    #[serde(default)]
    pub retry: i32,
}

impl PushRequest {
    /// A minimal iOS request with the given tokens and message.
    #[must_use]
    pub fn ios(tokens: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            tokens,
            platform: Platform::Ios,
            title: String::new(),
            message: message.into(),
            alert: Alert::default(),
            badge: None,
            sound: None,
            sound_name: String::new(),
            sound_volume: 0.0,
            data: Map::new(),
            content_available: false,
            mutable_content: false,
            thread_id: String::new(),
            category: String::new(),
            url_args: Vec::new(),
            collapse_id: String::new(),
            push_type: String::new(),
            priority: String::new(),
            expiration: None,
            topic: String::new(),
            apns_id: String::new(),
            credentials: CredentialOverrides::default(),
            production: false,
            development: false,
            retry: 0,
        }
    }

    /// Checks the request before any provider work is done.
    ///
    /// # Errors
    /// Returns `DispatchError::InvalidRequest` when the token list is empty, the
    /// platform is not iOS, or `apns_id` is not a UUID.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.tokens.is_empty() {
            return Err(DispatchError::InvalidRequest("tokens must not be empty".to_string()));
        }
        if self.platform != Platform::Ios {
            return Err(DispatchError::InvalidRequest(format!(
                "platform {} is not served by the APNs dispatcher",
                self.platform
            )));
        }
        if !self.apns_id.is_empty() && Uuid::parse_str(&self.apns_id).is_err() {
            return Err(DispatchError::InvalidRequest(format!("apns_id {:?} is not a UUID", self.apns_id)));
        }
        Ok(())
    }

    /// Resolves the target environment: request flags first, then the deployment default.
    #[must_use]
    pub const fn use_production(&self, deployment_production: bool) -> bool {
        if self.production {
            true
        } else if self.development {
            false
        } else {
            deployment_production
        }
    }
}
