//! Transport-facing handle for a single live connection.
//!
//! The socket itself is owned by the writer task spawned in [`crate::ws`]. A
//! [`ConnectionHandle`] only holds the sending half of that task's queue, so
//! cloning it into the registry never extends the socket's lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::HubError;

/// Work item for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Send a close frame and stop writing.
    Close,
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
    retired: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh identity, returning the queue its writer drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: Uuid::new_v4(),
            tx,
            retired: Arc::new(AtomicBool::new(false)),
        };
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a text frame. Fails once the writer task has stopped.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), HubError> {
        self.tx
            .send(Outbound::Text(text.into()))
            .map_err(|_| HubError::ConnectionClosed(self.id))
    }

    /// Ask the writer to close the socket. A no-op if it is already gone.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Mark the connection as no longer active. Returns `true` only for the
    /// first caller, so the active-connection gauge is decremented exactly once
    /// however the connection ends.
    pub fn retire(&self) -> bool {
        !self.retired.swap(true, Ordering::AcqRel)
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}
