//! Optional idle-client eviction.
//!
//! Heartbeats are always recorded; this task is what acts on them. It only
//! runs when an idle timeout is configured.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::hub::Hub;

const MIN_PERIOD: Duration = Duration::from_millis(100);

/// Spawn a task that evicts clients idle for longer than `max_idle`, checking
/// twice per timeout window.
pub fn spawn(hub: Arc<Hub>, max_idle: Duration) -> JoinHandle<()> {
    let period = (max_idle / 2).max(MIN_PERIOD);
    tracing::info!(?max_idle, ?period, "idle sweep enabled");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = hub.evict_idle(max_idle).await;
            if !evicted.is_empty() {
                tracing::info!(count = evicted.len(), "idle sweep evicted clients");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_evicts_silent_clients() {
        let hub = Arc::new(Hub::new());
        let (mut session, _rx) = hub.connect();
        hub.handle_text(&mut session, r#"{"type":"register","device_id":"quiet"}"#)
            .await;
        assert_eq!(hub.registry().count().await, 1);

        let task = spawn(hub.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(400)).await;
        task.abort();

        assert_eq!(hub.registry().count().await, 0);
        assert_eq!(hub.stats().active_connections(), 0);
    }
}
