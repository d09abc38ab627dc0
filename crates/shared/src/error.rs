//! Client-facing frame errors.
//!
//! The `Display` text of each variant is exactly the `message` carried by the
//! `error` event sent back to the offending connection.

use thiserror::Error;

use crate::protocol::SyncKind;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid JSON format")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Missing device_id")]
    MissingDeviceId,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// A sync frame arrived without its `data` payload.
    #[error("Missing {0} data")]
    MissingData(SyncKind),

    /// A known frame kind whose fields have the wrong shape.
    #[error("Malformed {kind} frame: {source}")]
    Malformed {
        kind: String,
        source: serde_json::Error,
    },
}

impl FrameError {
    /// Whether the frame that produced this error still counts towards the
    /// processed-message total. Only frames that failed to parse are excluded.
    pub fn counts_as_processed(&self) -> bool {
        !matches!(self, FrameError::InvalidJson(_))
    }
}
