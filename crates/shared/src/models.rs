//! Report models served by the HTTP health surface.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Body of `GET /` and `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Uptime formatted by [`format_uptime`].
    pub uptime: String,
    pub active_connections: u64,
    pub total_connections: u64,
}

/// Body of `GET /stats`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsReport {
    pub total_connections: u64,
    pub active_connections: u64,
    pub messages_processed: u64,
    pub registered_clients: usize,
    pub start_time: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub uptime_formatted: String,
}

/// Format an uptime as `H:MM:SS`, prefixed by `N day(s), ` once it exceeds a day.
/// Sub-second precision is dropped and negative durations clamp to zero.
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let clock = format!("{hours}:{minutes:02}:{seconds:02}");
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_short_uptime() {
        assert_eq!(format_uptime(Duration::seconds(0)), "0:00:00");
        assert_eq!(format_uptime(Duration::seconds(3_725)), "1:02:05");
        assert_eq!(format_uptime(Duration::milliseconds(59_999)), "0:00:59");
    }

    #[test]
    fn formats_days() {
        assert_eq!(format_uptime(Duration::seconds(86_400 + 61)), "1 day, 0:01:01");
        assert_eq!(format_uptime(Duration::days(3) + Duration::hours(23)), "3 days, 23:00:00");
    }

    #[test]
    fn negative_uptime_clamps() {
        assert_eq!(format_uptime(Duration::seconds(-5)), "0:00:00");
    }
}
