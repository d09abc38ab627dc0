//! Broadcast hub: per-connection dispatch and "everyone but the sender" fan-out.
//!
//! Each connection moves through `Unregistered -> Registered -> Closed`. Any
//! frame is accepted while open; only `register` binds the connection into
//! the [`Registry`]. Delivery is best-effort: a recipient whose write fails is
//! evicted and the fan-out carries on with the rest.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use synchub_shared::{
    ClientFrame, FrameError, ServerEvent, SyncKind, DEFAULT_TEST_MESSAGE, DEFAULT_USERNAME,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::connection::{ConnectionHandle, Outbound};
use crate::error::HubError;
use crate::registry::{ClientConnection, Registry};
use crate::stats::Stats;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unregistered,
    Registered { device_id: String },
    Closed,
}

/// Hub-side view of one accepted connection.
#[derive(Debug)]
pub struct Session {
    connection: ConnectionHandle,
    state: SessionState,
}

impl Session {
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The device id this connection registered under, if any.
    pub fn device_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Registered { device_id } => Some(device_id),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Hub {
    registry: Registry,
    stats: Stats,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Accept a new connection. The returned queue must be drained by a writer
    /// that owns the underlying socket.
    pub fn connect(&self) -> (Session, mpsc::UnboundedReceiver<Outbound>) {
        let (connection, outbound) = ConnectionHandle::new();
        self.stats.connection_opened();
        debug!(conn_id = %connection.id(), "connection accepted");
        let session = Session {
            connection,
            state: SessionState::Unregistered,
        };
        (session, outbound)
    }

    /// Process one inbound text frame. Failures are reported to the sender
    /// only; the connection stays open.
    pub async fn handle_text(&self, session: &mut Session, text: &str) {
        if session.state == SessionState::Closed {
            return;
        }

        let result = match ClientFrame::decode(text) {
            Ok(frame) => {
                self.stats.message_processed();
                debug!(
                    conn_id = %session.connection.id(),
                    kind = frame.kind(),
                    device_id = frame.device_id(),
                    "frame received"
                );
                self.dispatch(session, frame).await
            }
            Err(err) => {
                if err.counts_as_processed() {
                    self.stats.message_processed();
                }
                Err(err.into())
            }
        };

        if let Err(err) = result {
            match &err {
                HubError::Rejected(reason) => {
                    debug!(conn_id = %session.connection.id(), error = %reason, "frame rejected");
                }
                other => {
                    error!(conn_id = %session.connection.id(), error = %other, "failed to process frame");
                }
            }
            self.reply(session, &failure_reply(&err));
        }
    }

    async fn dispatch(&self, session: &mut Session, frame: ClientFrame) -> Result<(), HubError> {
        match frame {
            ClientFrame::Register {
                device_id,
                username,
            } => {
                let username = username.unwrap_or_else(|| DEFAULT_USERNAME.to_string());
                self.register(session, device_id, username).await
            }
            ClientFrame::Heartbeat { .. } => {
                if let Some(device_id) = session.device_id() {
                    if self.registry.touch(device_id, session.connection.id()).await {
                        debug!(device_id, "heartbeat");
                    }
                }
                Ok(())
            }
            ClientFrame::MessageSync { data, .. } => {
                self.relay(session, SyncKind::Message, data).await
            }
            ClientFrame::UserSync { data, .. } => self.relay(session, SyncKind::User, data).await,
            ClientFrame::GroupSync { data, .. } => self.relay(session, SyncKind::Group, data).await,
            ClientFrame::TestSync { message, .. } => {
                let message = message.unwrap_or_else(|| DEFAULT_TEST_MESSAGE.to_string());
                info!(conn_id = %session.connection.id(), message = %message, "test sync");
                self.broadcast_except(session.connection.id(), &ServerEvent::test_sync(message))
                    .await?;
                Ok(())
            }
        }
    }

    async fn register(
        &self,
        session: &mut Session,
        device_id: String,
        username: String,
    ) -> Result<(), HubError> {
        let conn_id = session.connection.id();

        // Moving to a new id drops this connection's old binding.
        if let Some(previous) = session.device_id() {
            if previous != device_id {
                self.registry.release(previous, conn_id).await;
            }
        }

        let replaced = self
            .registry
            .register(device_id.clone(), username.clone(), session.connection.clone())
            .await;
        if let Some(replaced) = replaced {
            if replaced.connection.id() != conn_id {
                info!(
                    device_id = %device_id,
                    superseded = %replaced.connection.id(),
                    "device re-registered, closing previous connection"
                );
                replaced.connection.close();
            }
        }

        session.state = SessionState::Registered {
            device_id: device_id.clone(),
        };
        info!(device_id = %device_id, username = %username, conn_id = %conn_id, "client registered");

        self.reply(session, &ServerEvent::register_success(device_id.clone()));
        self.broadcast_except(conn_id, &ServerEvent::user_joined(username, device_id))
            .await?;
        Ok(())
    }

    async fn relay(
        &self,
        session: &Session,
        kind: SyncKind,
        data: Option<Value>,
    ) -> Result<(), HubError> {
        let data = data.ok_or(FrameError::MissingData(kind))?;
        let item = match data.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(id) => id.to_string(),
            None => "unknown".to_string(),
        };

        let delivered = self
            .broadcast_except(session.connection.id(), &ServerEvent::sync(kind, data))
            .await?;
        info!(kind = %kind, item = %item, delivered, "sync relayed");
        Ok(())
    }

    /// Deliver `event` to every registered connection except `sender`.
    ///
    /// Recipients whose write fails are evicted; the rest still receive the
    /// event. Returns how many writes were queued successfully.
    pub async fn broadcast_except(&self, sender: Uuid, event: &ServerEvent) -> Result<usize, HubError> {
        let text = event.to_json()?;
        let recipients = self.registry.all_except(sender).await;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for entry in recipients {
            match entry.connection.send_text(text.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(device_id = %entry.device_id, error = %err, "broadcast write failed, evicting");
                    failed.push(entry);
                }
            }
        }

        for entry in &failed {
            self.evict(entry).await;
        }

        debug!(kind = event.kind(), delivered, evicted = failed.len(), "broadcast");
        Ok(delivered)
    }

    /// Evict every registered client that has not sent a heartbeat within
    /// `max_idle`, closing its connection. Returns the evicted device ids.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<String> {
        let cutoff = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle));
        let Some(cutoff) = cutoff else {
            return Vec::new();
        };

        let evicted = self.registry.remove_idle(cutoff).await;
        for entry in &evicted {
            warn!(device_id = %entry.device_id, last_heartbeat = %entry.last_heartbeat, "evicting idle client");
            entry.connection.close();
            if entry.connection.retire() {
                self.stats.connection_closed();
            }
        }
        evicted.into_iter().map(|entry| entry.device_id).collect()
    }

    /// Tear down a connection. Safe to call more than once.
    pub async fn disconnect(&self, session: &mut Session) {
        let previous = std::mem::replace(&mut session.state, SessionState::Closed);
        if let SessionState::Registered { device_id } = previous {
            if self
                .registry
                .release(&device_id, session.connection.id())
                .await
                .is_some()
            {
                info!(device_id = %device_id, "client removed");
            }
        }
        if session.connection.retire() {
            self.stats.connection_closed();
        }
        debug!(conn_id = %session.connection.id(), "connection closed");
    }

    async fn evict(&self, entry: &ClientConnection) {
        self.registry
            .release(&entry.device_id, entry.connection.id())
            .await;
        if entry.connection.retire() {
            self.stats.connection_closed();
        }
    }

    fn reply(&self, session: &Session, event: &ServerEvent) {
        let text = match event.to_json() {
            Ok(text) => text,
            Err(err) => {
                error!(kind = event.kind(), error = %err, "failed to encode reply");
                return;
            }
        };
        if let Err(err) = session.connection.send_text(text) {
            debug!(error = %err, kind = event.kind(), "reply dropped");
        }
    }
}

/// The `error` event sent back for a frame that failed. Protocol rejections
/// are echoed verbatim; anything else is reported as a server error.
fn failure_reply(err: &HubError) -> ServerEvent {
    match err {
        HubError::Rejected(reason) => ServerEvent::error(reason.to_string()),
        other => ServerEvent::error(format!("Server error: {other}")),
    }
}
