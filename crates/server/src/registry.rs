//! Registry of registered devices and the connections they are bound to.
//!
//! A connection only appears here after a successful `register`; until then it
//! is invisible to fan-out. All operations go through one lock, and
//! [`Registry::all_except`] hands out an owned point-in-time copy so a
//! broadcast never holds the lock while writing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::connection::ConnectionHandle;

/// State kept for one registered device.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub device_id: String,
    pub username: String,
    pub connection: ConnectionHandle,
    pub connected_at: DateTime<Utc>,
    /// Updated on every heartbeat. Only consulted by the optional idle sweep.
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Registry {
    clients: RwLock<HashMap<String, ClientConnection>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `device_id` to `connection`, replacing any existing binding.
    ///
    /// Returns the entry that was replaced so the caller can decide what to do
    /// with the superseded connection.
    pub async fn register(
        &self,
        device_id: impl Into<String>,
        username: impl Into<String>,
        connection: ConnectionHandle,
    ) -> Option<ClientConnection> {
        let device_id = device_id.into();
        let now = Utc::now();
        let entry = ClientConnection {
            device_id: device_id.clone(),
            username: username.into(),
            connection,
            connected_at: now,
            last_heartbeat: now,
        };
        self.clients.write().await.insert(device_id, entry)
    }

    /// Record a heartbeat for `device_id` if it is still bound to `connection`.
    /// Returns whether the entry was updated.
    pub async fn touch(&self, device_id: &str, connection: Uuid) -> bool {
        match self.clients.write().await.get_mut(device_id) {
            Some(entry) if entry.connection.id() == connection => {
                entry.last_heartbeat = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Remove the entry for `device_id`, whichever connection it is bound to.
    pub async fn remove(&self, device_id: &str) -> Option<ClientConnection> {
        self.clients.write().await.remove(device_id)
    }

    /// Remove the entry for `device_id` only if it is still bound to
    /// `connection`. A superseded connection tearing down must not evict the
    /// connection that replaced it.
    pub async fn release(&self, device_id: &str, connection: Uuid) -> Option<ClientConnection> {
        let mut clients = self.clients.write().await;
        match clients.get(device_id) {
            Some(entry) if entry.connection.id() == connection => clients.remove(device_id),
            _ => None,
        }
    }

    /// Snapshot of every entry whose connection is not `connection`.
    ///
    /// Exclusion is by connection identity rather than device id.
    pub async fn all_except(&self, connection: Uuid) -> Vec<ClientConnection> {
        self.clients
            .read()
            .await
            .values()
            .filter(|entry| entry.connection.id() != connection)
            .cloned()
            .collect()
    }

    /// Remove and return every entry whose last heartbeat is older than `cutoff`.
    pub async fn remove_idle(&self, cutoff: DateTime<Utc>) -> Vec<ClientConnection> {
        let mut clients = self.clients.write().await;
        let idle: Vec<String> = clients
            .values()
            .filter(|entry| entry.last_heartbeat < cutoff)
            .map(|entry| entry.device_id.clone())
            .collect();
        idle.iter().filter_map(|id| clients.remove(id)).collect()
    }

    pub async fn get(&self, device_id: &str) -> Option<ClientConnection> {
        self.clients.read().await.get(device_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use tokio::sync::mpsc;

    fn conn() -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        ConnectionHandle::new()
    }

    #[tokio::test]
    async fn register_and_count() {
        let registry = Registry::new();
        let (a, _rx_a) = conn();
        let (b, _rx_b) = conn();

        assert!(registry.register("d1", "alice", a).await.is_none());
        assert!(registry.register("d2", "bob", b).await.is_none());
        assert_eq!(registry.count().await, 2);

        let entry = registry.get("d1").await.unwrap();
        assert_eq!(entry.username, "alice");
        assert_eq!(entry.connected_at, entry.last_heartbeat);
    }

    #[tokio::test]
    async fn reregister_overwrites_and_returns_previous() {
        let registry = Registry::new();
        let (first, _rx1) = conn();
        let (second, _rx2) = conn();
        let first_id = first.id();
        let second_id = second.id();

        registry.register("d1", "old", first).await;
        let replaced = registry.register("d1", "new", second).await.unwrap();

        assert_eq!(replaced.connection.id(), first_id);
        assert_eq!(registry.count().await, 1);
        let entry = registry.get("d1").await.unwrap();
        assert_eq!(entry.connection.id(), second_id);
        assert_eq!(entry.username, "new");
    }

    #[tokio::test]
    async fn touch_updates_heartbeat() {
        let registry = Registry::new();
        let (a, _rx) = conn();
        let a_id = a.id();
        registry.register("d1", "alice", a).await;
        let before = registry.get("d1").await.unwrap().last_heartbeat;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(registry.touch("d1", a_id).await);
        assert!(registry.get("d1").await.unwrap().last_heartbeat > before);
    }

    #[tokio::test]
    async fn touch_unknown_is_false() {
        let registry = Registry::new();
        let (a, _rx) = conn();
        assert!(!registry.touch("ghost", a.id()).await);
    }

    #[tokio::test]
    async fn touch_from_superseded_connection_is_ignored() {
        let registry = Registry::new();
        let (old, _rx1) = conn();
        let (new, _rx2) = conn();
        let old_id = old.id();
        registry.register("d1", "u", old).await;
        registry.register("d1", "u", new).await;
        let before = registry.get("d1").await.unwrap().last_heartbeat;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(!registry.touch("d1", old_id).await);
        assert_eq!(registry.get("d1").await.unwrap().last_heartbeat, before);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = Registry::new();
        let (a, _rx) = conn();
        registry.register("d1", "alice", a).await;

        assert!(registry.remove("d1").await.is_some());
        assert!(registry.remove("d1").await.is_none());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn release_ignores_superseded_connection() {
        let registry = Registry::new();
        let (old, _rx1) = conn();
        let (new, _rx2) = conn();
        let old_id = old.id();
        let new_id = new.id();

        registry.register("d1", "u", old).await;
        registry.register("d1", "u", new).await;

        assert!(registry.release("d1", old_id).await.is_none());
        assert_eq!(registry.count().await, 1);
        assert!(registry.release("d1", new_id).await.is_some());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn all_except_excludes_by_connection_identity() {
        let registry = Registry::new();
        let (a, _rx_a) = conn();
        let (b, _rx_b) = conn();
        let (c, _rx_c) = conn();
        let a_id = a.id();

        registry.register("a", "a", a).await;
        registry.register("b", "b", b).await;
        registry.register("c", "c", c).await;

        let mut others: Vec<String> = registry
            .all_except(a_id)
            .await
            .into_iter()
            .map(|entry| entry.device_id)
            .collect();
        others.sort();
        assert_eq!(others, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn all_except_unregistered_sender_returns_everyone() {
        let registry = Registry::new();
        let (a, _rx_a) = conn();
        let (outsider, _rx_o) = conn();
        registry.register("a", "a", a).await;

        assert_eq!(registry.all_except(outsider.id()).await.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_is_unaffected_by_later_mutation() {
        let registry = Registry::new();
        let (a, _rx_a) = conn();
        let (b, _rx_b) = conn();
        let (sender, _rx_s) = conn();
        registry.register("a", "a", a).await;

        let snapshot = registry.all_except(sender.id()).await;
        registry.register("b", "b", b).await;
        registry.remove("a").await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].device_id, "a");
    }

    #[tokio::test]
    async fn remove_idle_takes_only_stale_entries() {
        let registry = Registry::new();
        let (a, _rx_a) = conn();
        let (b, _rx_b) = conn();
        registry.register("stale", "a", a).await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let cutoff = Utc::now();
        registry.register("fresh", "b", b).await;

        let evicted = registry.remove_idle(cutoff).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].device_id, "stale");
        assert!(registry.get("fresh").await.is_some());
        assert_eq!(registry.count().await, 1);
    }
}
