//! Identity-provider webhook payloads
//!
//! Clerk delivers `{ "type": "user.created", "data": { ... } }`. Only the
//! three user lifecycle events are handled.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";

const DEFAULT_FIRST_NAME: &str = "Unknown";
const DEFAULT_LAST_NAME: &str = "User";

/// Acknowledgement returned for a processed event
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub event_type: String,
}

impl WebhookAck {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            received: true,
            event_type: event_type.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Profile fields extracted from an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileData {
    pub clerk_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub photo_url: Option<String>,
}

/// A verified, supported identity event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    Created(ProfileData),
    Updated(ProfileData),
    Deleted { clerk_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventParseError {
    #[error("Webhook payload is not valid JSON")]
    InvalidJson,

    #[error("Invalid webhook payload: missing event type")]
    MissingType,

    #[error("Unsupported event type: {0}")]
    Unsupported(String),

    #[error("Missing {0} in webhook data")]
    MissingField(&'static str),
}

impl IdentityEvent {
    /// Parse a raw (already authenticated) payload
    pub fn parse(payload: &[u8]) -> Result<Self, EventParseError> {
        let envelope: Envelope =
            serde_json::from_slice(payload).map_err(|_| EventParseError::InvalidJson)?;

        let event_type = envelope
            .event_type
            .filter(|t| !t.trim().is_empty())
            .ok_or(EventParseError::MissingType)?;

        match event_type.as_str() {
            USER_CREATED => Ok(Self::Created(ProfileData::from_data(&envelope.data)?)),
            USER_UPDATED => Ok(Self::Updated(ProfileData::from_data(&envelope.data)?)),
            USER_DELETED => Ok(Self::Deleted {
                clerk_id: clerk_id(&envelope.data)?,
            }),
            _ => Err(EventParseError::Unsupported(event_type)),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => USER_CREATED,
            Self::Updated(_) => USER_UPDATED,
            Self::Deleted { .. } => USER_DELETED,
        }
    }

    pub fn clerk_id(&self) -> &str {
        match self {
            Self::Created(p) | Self::Updated(p) => &p.clerk_id,
            Self::Deleted { clerk_id } => clerk_id,
        }
    }
}

impl ProfileData {
    fn from_data(data: &Value) -> Result<Self, EventParseError> {
        let email = data
            .get("email_addresses")
            .and_then(Value::as_array)
            .and_then(|addrs| addrs.first())
            .and_then(|first| non_blank_str(first, "email_address"))
            .ok_or(EventParseError::MissingField("email address"))?;

        Ok(Self {
            clerk_id: clerk_id(data)?,
            email,
            first_name: non_blank_str(data, "first_name")
                .unwrap_or_else(|| DEFAULT_FIRST_NAME.to_string()),
            last_name: non_blank_str(data, "last_name")
                .unwrap_or_else(|| DEFAULT_LAST_NAME.to_string()),
            photo_url: non_blank_str(data, "image_url"),
        })
    }
}

fn clerk_id(data: &Value) -> Result<String, EventParseError> {
    non_blank_str(data, "id").ok_or(EventParseError::MissingField("user ID"))
}

fn non_blank_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}
