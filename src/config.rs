//! Application configuration management.
//!
//! Both services read the same set of environment variables. The `envy` crate
//! deserializes them into a type-safe struct; a missing required variable
//! aborts startup.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `RABBITMQ_DSN` (required): AMQP connection string
/// - `RABBITMQ_QUEUE` (required): work queue shared by publisher and consumer
/// - `ADDR` (required): HTTP listen address, `host:port` or a bare port
/// - `LOG_LEVEL` (required): fallback filter when `RUST_LOG` is not set
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `DATABASE_CONNECT_TIMEOUT_SECS` (optional): defaults to 5
/// - `SHUTDOWN_TIMEOUT_SECS` (optional): grace period per component, defaults to 30
/// - `PUBLISH_TIMEOUT_SECS` (optional): bound for each broker send, defaults to 5
/// - `BROADCAST_EXCHANGE` (optional): fan-out exchange name, defaults to `ws-only`
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub rabbitmq_dsn: String,

    pub rabbitmq_queue: String,

    pub addr: String,

    pub log_level: String,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub database_connect_timeout_secs: u64,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,

    #[serde(default = "default_broadcast_exchange")]
    pub broadcast_exchange: String,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_publish_timeout() -> u64 {
    5
}

fn default_broadcast_exchange() -> String {
    "ws-only".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is read first when present.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, is empty, or a
    /// value cannot be parsed into the expected type.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        Self::from_iter(std::env::vars())
    }

    /// Build a configuration from explicit key/value pairs.
    pub fn from_iter<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(vars)?;
        config.ensure_not_empty()?;
        Ok(config)
    }

    /// Socket address to bind, accepting `8080` as shorthand for `0.0.0.0:8080`.
    pub fn listen_addr(&self) -> String {
        if self.addr.contains(':') {
            self.addr.clone()
        } else {
            format!("0.0.0.0:{}", self.addr)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database_connect_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    fn ensure_not_empty(&self) -> Result<(), envy::Error> {
        let required = [
            ("DATABASE_URL", &self.database_url),
            ("RABBITMQ_DSN", &self.rabbitmq_dsn),
            ("RABBITMQ_QUEUE", &self.rabbitmq_queue),
            ("ADDR", &self.addr),
            ("LOG_LEVEL", &self.log_level),
        ];

        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(envy::Error::Custom(format!("{name} must not be empty"))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn required() -> Vec<(String, String)> {
        vars(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("RABBITMQ_DSN", "amqp://localhost:5672"),
            ("RABBITMQ_QUEUE", "transactions"),
            ("ADDR", "8080"),
            ("LOG_LEVEL", "info"),
        ])
    }

    #[test]
    fn loads_required_values_and_defaults() {
        let config = Config::from_iter(required()).unwrap();
        assert_eq!(config.rabbitmq_queue, "transactions");
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.broadcast_exchange, "ws-only");
        assert_eq!(config.publish_timeout(), Duration::from_secs(5));
        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn missing_queue_fails() {
        let mut pairs = required();
        pairs.retain(|(k, _)| k != "RABBITMQ_QUEUE");
        assert!(Config::from_iter(pairs).is_err());
    }

    #[test]
    fn empty_log_level_fails() {
        let mut pairs = required();
        pairs.retain(|(k, _)| k != "LOG_LEVEL");
        pairs.push(("LOG_LEVEL".to_string(), " ".to_string()));
        assert!(Config::from_iter(pairs).is_err());
    }

    #[test]
    fn full_address_is_kept() {
        let mut pairs = required();
        pairs.retain(|(k, _)| k != "ADDR");
        pairs.push(("ADDR".to_string(), "127.0.0.1:9000".to_string()));
        let config = Config::from_iter(pairs).unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:9000");
    }
}
