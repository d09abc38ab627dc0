//! Process-wide connection and traffic counters.
//!
//! Counters use relaxed atomics; readers get approximate values.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use synchub_shared::{format_uptime, HealthReport, StatsReport};

#[derive(Debug)]
pub struct Stats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    messages_processed: AtomicU64,
    start_time: DateTime<Utc>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            messages_processed: AtomicU64::new(0),
            start_time: Utc::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn message_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn health(&self) -> HealthReport {
        let now = Utc::now();
        HealthReport {
            status: "healthy".to_string(),
            timestamp: now,
            uptime: format_uptime(now - self.start_time),
            active_connections: self.active_connections(),
            total_connections: self.total_connections(),
        }
    }

    pub fn report(&self, registered_clients: usize) -> StatsReport {
        let uptime = Utc::now() - self.start_time;
        StatsReport {
            total_connections: self.total_connections(),
            active_connections: self.active_connections(),
            messages_processed: self.messages_processed(),
            registered_clients,
            start_time: self.start_time,
            uptime_seconds: uptime.num_milliseconds() as f64 / 1000.0,
            uptime_formatted: format_uptime(uptime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_close_track_active() {
        let stats = Stats::new();
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();

        assert_eq!(stats.total_connections(), 2);
        assert_eq!(stats.active_connections(), 1);
    }

    #[test]
    fn active_never_underflows() {
        let stats = Stats::new();
        stats.connection_closed();
        assert_eq!(stats.active_connections(), 0);
    }

    #[test]
    fn report_carries_counters() {
        let stats = Stats::new();
        stats.connection_opened();
        stats.message_processed();
        stats.message_processed();

        let report = stats.report(1);
        assert_eq!(report.total_connections, 1);
        assert_eq!(report.messages_processed, 2);
        assert_eq!(report.registered_clients, 1);
        assert!(report.uptime_seconds >= 0.0);

        let health = stats.health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.active_connections, 1);
    }
}
