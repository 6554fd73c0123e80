//! Application configuration loaded from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use domain::{CommandOptions, ConflictPolicy};
use event_store::JournalOptions;
use runtime::RuntimeConfig;

/// Runtime configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory store when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `METRICS_ADDR`: Prometheus listener address; no exporter when unset
/// - `CONFLICT_MAX_RETRIES`: retries after a version conflict (default: `3`)
/// - `CONFLICT_BACKOFF_MS`: pause before each retry (default: `10`)
/// - `JOURNAL_POLL_INTERVAL_MS`: journal re-query interval (default: `500`)
/// - `JOURNAL_BATCH_SIZE`: events per journal query (default: `256`)
/// - `MAILBOX_CAPACITY`: per-entity mailbox size (default: `32`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub log_level: String,
    pub metrics_addr: Option<SocketAddr>,
    pub conflict_max_retries: u32,
    pub conflict_backoff: Duration,
    pub journal_poll_interval: Duration,
    pub journal_batch_size: usize,
    pub mailbox_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from `lookup`. Unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| Parsed(lookup(key));

        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS")
                .get()
                .unwrap_or(defaults.database_max_connections),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            metrics_addr: parsed("METRICS_ADDR").get(),
            conflict_max_retries: parsed("CONFLICT_MAX_RETRIES")
                .get()
                .unwrap_or(defaults.conflict_max_retries),
            conflict_backoff: parsed("CONFLICT_BACKOFF_MS")
                .get()
                .map(Duration::from_millis)
                .unwrap_or(defaults.conflict_backoff),
            journal_poll_interval: parsed("JOURNAL_POLL_INTERVAL_MS")
                .get()
                .map(Duration::from_millis)
                .unwrap_or(defaults.journal_poll_interval),
            journal_batch_size: parsed("JOURNAL_BATCH_SIZE")
                .get()
                .unwrap_or(defaults.journal_batch_size),
            mailbox_capacity: parsed("MAILBOX_CAPACITY")
                .get()
                .unwrap_or(defaults.mailbox_capacity),
        }
    }

    pub fn command_options(&self) -> CommandOptions {
        CommandOptions::default().conflict_policy(ConflictPolicy::Retry {
            max_retries: self.conflict_max_retries,
            backoff: self.conflict_backoff,
        })
    }

    pub fn journal_options(&self) -> JournalOptions {
        JournalOptions::default()
            .batch_size(self.journal_batch_size)
            .poll_interval(self.journal_poll_interval)
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig::default().mailbox_capacity(self.mailbox_capacity)
    }
}

impl Default for Config {
    fn default() -> Self {
        let journal = JournalOptions::default();
        Self {
            database_url: None,
            database_max_connections: 5,
            log_level: "info".to_string(),
            metrics_addr: None,
            conflict_max_retries: 3,
            conflict_backoff: Duration::from_millis(10),
            journal_poll_interval: journal.poll_interval,
            journal_batch_size: journal.batch_size,
            mailbox_capacity: RuntimeConfig::default().mailbox_capacity,
        }
    }
}

/// Raw variable value, parsed on demand into whatever type the field needs.
struct Parsed(Option<String>);

impl Parsed {
    fn get<T: FromStr>(self) -> Option<T> {
        self.0.and_then(|value| value.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert!(config.database_url.is_none());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.mailbox_capacity, 32);
        assert_eq!(config.journal_batch_size, 256);
        assert_eq!(config.journal_poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_values_from_environment() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/events"),
            ("METRICS_ADDR", "127.0.0.1:9000"),
            ("CONFLICT_MAX_RETRIES", "7"),
            ("CONFLICT_BACKOFF_MS", "25"),
            ("JOURNAL_POLL_INTERVAL_MS", "100"),
            ("JOURNAL_BATCH_SIZE", "64"),
            ("MAILBOX_CAPACITY", "8"),
        ]));

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/events"));
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(
            config.command_options().conflict_policy,
            ConflictPolicy::Retry {
                max_retries: 7,
                backoff: Duration::from_millis(25)
            }
        );
        assert_eq!(config.journal_options().batch_size, 64);
        assert_eq!(config.journal_options().poll_interval, Duration::from_millis(100));
        assert_eq!(config.runtime_config().mailbox_capacity, 8);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", ""),
            ("METRICS_ADDR", "not an address"),
            ("MAILBOX_CAPACITY", "lots"),
        ]));
        assert!(config.database_url.is_none());
        assert!(config.metrics_addr.is_none());
        assert_eq!(config.mailbox_capacity, 32);
    }
}
