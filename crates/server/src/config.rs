//! Server configuration from environment variables.

use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8766;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Evict registered clients whose last heartbeat is older than this.
    /// `None` leaves idle connections alone.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SYNCHUB_HOST`: bind address (default: "0.0.0.0")
    /// - `PORT`: listen port, as set by most container platforms (default: 8766)
    /// - `SYNCHUB_IDLE_TIMEOUT_SECS`: idle eviction threshold; unset or "0" disables it
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("SYNCHUB_HOST")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "invalid PORT, using {}", DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let idle_timeout = lookup("SYNCHUB_IDLE_TIMEOUT_SECS").and_then(|raw| {
            match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    tracing::warn!(value = %raw, "invalid SYNCHUB_IDLE_TIMEOUT_SECS, idle sweep disabled");
                    None
                }
            }
        });

        Self {
            host,
            port,
            idle_timeout,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config_from(&[]), ServerConfig::default());
        assert_eq!(ServerConfig::default().bind_addr(), "0.0.0.0:8766");
    }

    #[test]
    fn reads_host_port_and_timeout() {
        let config = config_from(&[
            ("SYNCHUB_HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("SYNCHUB_IDLE_TIMEOUT_SECS", "90"),
        ]);
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config_from(&[("PORT", "not-a-port"), ("SYNCHUB_IDLE_TIMEOUT_SECS", "soon")]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.idle_timeout, None);
    }

    #[test]
    fn zero_timeout_disables_sweep() {
        let config = config_from(&[("SYNCHUB_IDLE_TIMEOUT_SECS", "0")]);
        assert_eq!(config.idle_timeout, None);
    }
}
