//! Sync relay wire protocol: inbound client frames and outbound server events.
//!
//! Every frame on the wire is a single JSON object discriminated by its `type`
//! field. Inbound frames are decoded into the closed [`ClientFrame`] enum;
//! anything outside it is rejected with a [`FrameError`] that is echoed back to
//! the sender as an `error` event.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;

/// Username recorded for a `register` frame that does not carry one.
pub const DEFAULT_USERNAME: &str = "Unknown";

/// Text relayed by a `test_sync` frame that does not carry a `message`.
pub const DEFAULT_TEST_MESSAGE: &str = "test message";

/// Human-readable text of the `register_success` acknowledgement.
pub const REGISTER_SUCCESS_MESSAGE: &str = "registration succeeded";

/// Path the WebSocket endpoint is mounted at.
pub const WS_PATH: &str = "/ws";

const KNOWN_KINDS: [&str; 6] = [
    "register",
    "heartbeat",
    "message_sync",
    "user_sync",
    "group_sync",
    "test_sync",
];

/// The three opaque payload relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    Message,
    User,
    Group,
}

impl SyncKind {
    /// Lower-case label used in error messages (`Missing <label> data`).
    pub fn label(self) -> &'static str {
        match self {
            SyncKind::Message => "message",
            SyncKind::User => "user",
            SyncKind::Group => "group",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Register {
        device_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    Heartbeat {
        device_id: String,
    },
    MessageSync {
        device_id: String,
        /// Opaque payload; `null` is treated the same as absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    UserSync {
        device_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    GroupSync {
        device_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    TestSync {
        device_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ClientFrame {
    /// Decode a text frame.
    ///
    /// Validation order: the text must be JSON, it must carry a `device_id`,
    /// its `type` must be one of the known kinds, and the kind-specific fields
    /// must have the right shape.
    ///
    /// The device id is not validated for format. Absent, `null`, and other
    /// falsy values (`""`, `0`, `false`, `[]`, `{}`) count as missing; any
    /// other non-string id is normalised to its JSON text, so `42` becomes `"42"`.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let mut value: Value = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;

        let device_id = value
            .get("device_id")
            .and_then(normalise_device_id)
            .ok_or(FrameError::MissingDeviceId)?;
        if let Some(fields) = value.as_object_mut() {
            fields.insert("device_id".to_string(), Value::String(device_id));
        }

        let kind = match value.get("type") {
            Some(Value::String(kind)) if KNOWN_KINDS.contains(&kind.as_str()) => kind.clone(),
            Some(Value::String(kind)) => return Err(FrameError::UnknownType(kind.clone())),
            Some(other) => return Err(FrameError::UnknownType(other.to_string())),
            None => return Err(FrameError::UnknownType("null".to_string())),
        };

        serde_json::from_value(value).map_err(|source| FrameError::Malformed { kind, source })
    }

    pub fn device_id(&self) -> &str {
        match self {
            ClientFrame::Register { device_id, .. }
            | ClientFrame::Heartbeat { device_id }
            | ClientFrame::MessageSync { device_id, .. }
            | ClientFrame::UserSync { device_id, .. }
            | ClientFrame::GroupSync { device_id, .. }
            | ClientFrame::TestSync { device_id, .. } => device_id,
        }
    }

    /// The wire `type` tag of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Register { .. } => "register",
            ClientFrame::Heartbeat { .. } => "heartbeat",
            ClientFrame::MessageSync { .. } => "message_sync",
            ClientFrame::UserSync { .. } => "user_sync",
            ClientFrame::GroupSync { .. } => "group_sync",
            ClientFrame::TestSync { .. } => "test_sync",
        }
    }
}

fn normalise_device_id(raw: &Value) -> Option<String> {
    match raw {
        Value::Null | Value::Bool(false) => None,
        Value::String(id) if id.is_empty() => None,
        Value::String(id) => Some(id.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Object(fields) if fields.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// An outbound event, written either to the sender alone (`register_success`,
/// `error`) or fanned out to every other registered connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    RegisterSuccess {
        device_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
    UserJoined {
        username: String,
        client_id: String,
        timestamp: DateTime<Utc>,
    },
    MessageSync {
        data: Value,
        timestamp: DateTime<Utc>,
    },
    UserSync {
        data: Value,
        timestamp: DateTime<Utc>,
    },
    GroupSync {
        data: Value,
        timestamp: DateTime<Utc>,
    },
    TestSync {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServerEvent {
    pub fn register_success(device_id: impl Into<String>) -> Self {
        ServerEvent::RegisterSuccess {
            device_id: device_id.into(),
            message: REGISTER_SUCCESS_MESSAGE.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user_joined(username: impl Into<String>, client_id: impl Into<String>) -> Self {
        ServerEvent::UserJoined {
            username: username.into(),
            client_id: client_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Wrap an opaque payload for relay. The payload is passed through untouched.
    pub fn sync(kind: SyncKind, data: Value) -> Self {
        let timestamp = Utc::now();
        match kind {
            SyncKind::Message => ServerEvent::MessageSync { data, timestamp },
            SyncKind::User => ServerEvent::UserSync { data, timestamp },
            SyncKind::Group => ServerEvent::GroupSync { data, timestamp },
        }
    }

    pub fn test_sync(message: impl Into<String>) -> Self {
        ServerEvent::TestSync {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// The wire `type` tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::RegisterSuccess { .. } => "register_success",
            ServerEvent::Error { .. } => "error",
            ServerEvent::UserJoined { .. } => "user_joined",
            ServerEvent::MessageSync { .. } => "message_sync",
            ServerEvent::UserSync { .. } => "user_sync",
            ServerEvent::GroupSync { .. } => "group_sync",
            ServerEvent::TestSync { .. } => "test_sync",
        }
    }

    /// Serialize to the JSON text written on the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
