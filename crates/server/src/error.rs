//! Hub-side errors.

use synchub_shared::FrameError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum HubError {
    /// The client sent something the protocol rejects. Reported back verbatim.
    #[error(transparent)]
    Rejected(#[from] FrameError),

    /// The connection's writer has gone away; nothing more can be delivered to it.
    #[error("connection {0} is closed")]
    ConnectionClosed(Uuid),

    /// Serializing an event failed. Events only hold strings, timestamps and
    /// `serde_json::Value`, so this is not expected to occur in practice.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}
