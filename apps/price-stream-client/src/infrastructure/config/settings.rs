//! Client Configuration Settings
//!
//! Configuration types for the price stream client, loaded from environment
//! variables. Every setting has a default, so an empty environment yields a
//! client pointed at `ws://localhost:8000/ws/prices`.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PRICE_STREAM_URL` | unset (absolute `ws://`/`wss://` URL or a path) |
//! | `PRICE_STREAM_BASE_URL` | `ws://localhost:8000` |
//! | `PRICE_STREAM_RECONNECT_ATTEMPTS` | `5` |
//! | `PRICE_STREAM_RECONNECT_INTERVAL_MS` | `3000` |
//! | `PRICE_STREAM_RECONNECT_MULTIPLIER` | `1.0` |
//! | `PRICE_STREAM_RECONNECT_MAX_INTERVAL_MS` | `30000` |
//! | `PRICE_STREAM_RECONNECT_JITTER` | `0.0` |
//! | `PRICE_STREAM_CONNECT_TIMEOUT_SECS` | `10` |
//! | `PRICE_STREAM_SYMBOLS` | empty (comma-separated tickers) |
//! | `PRICE_STREAM_EVENT_BUFFER` | `1024` |
//! | `PRICE_STREAM_METRICS_PORT` | `0` (disabled) |

use std::str::FromStr;
use std::time::Duration;

use crate::domain::streaming::Symbol;
use crate::domain::subscription::dedup_symbols;
use crate::infrastructure::market_feed::{
    DEFAULT_CONNECT_TIMEOUT, ReconnectConfig, StreamClientConfig, resolve_endpoint,
};

/// Stream connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Absolute endpoint or path relative to `base_url`.
    pub url: Option<String>,
    /// Server base URL.
    pub base_url: Option<String>,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
    /// Handshake timeout.
    pub connect_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: None,
            base_url: None,
            reconnect: ReconnectConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl StreamSettings {
    /// Resolve the endpoint the client connects to.
    #[must_use]
    pub fn endpoint(&self) -> String {
        resolve_endpoint(self.url.as_deref(), self.base_url.as_deref())
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Stream connection settings.
    pub stream: StreamSettings,
    /// Symbols to subscribe at startup.
    pub symbols: Vec<Symbol>,
    /// Capacity of the event channel between the client and the consumer.
    pub event_buffer: usize,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stream: StreamSettings::default(),
            symbols: Vec::new(),
            event_buffer: 1024,
            metrics_port: 0,
        }
    }
}

impl AppConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let reconnect_defaults = ReconnectConfig::default();
        let env = Env { lookup: &lookup };

        let reconnect = ReconnectConfig {
            max_attempts: env.parse(
                "PRICE_STREAM_RECONNECT_ATTEMPTS",
                reconnect_defaults.max_attempts,
            )?,
            interval: env.millis(
                "PRICE_STREAM_RECONNECT_INTERVAL_MS",
                reconnect_defaults.interval,
            )?,
            multiplier: env.parse(
                "PRICE_STREAM_RECONNECT_MULTIPLIER",
                reconnect_defaults.multiplier,
            )?,
            max_interval: env.millis(
                "PRICE_STREAM_RECONNECT_MAX_INTERVAL_MS",
                reconnect_defaults.max_interval,
            )?,
            jitter_factor: env.parse(
                "PRICE_STREAM_RECONNECT_JITTER",
                reconnect_defaults.jitter_factor,
            )?,
        };

        if !(0.0..=1.0).contains(&reconnect.jitter_factor) {
            return Err(ConfigError::InvalidValue {
                key: "PRICE_STREAM_RECONNECT_JITTER".to_string(),
                value: reconnect.jitter_factor.to_string(),
            });
        }

        let stream = StreamSettings {
            url: env.string("PRICE_STREAM_URL"),
            base_url: env.string("PRICE_STREAM_BASE_URL"),
            reconnect,
            connect_timeout: env.secs(
                "PRICE_STREAM_CONNECT_TIMEOUT_SECS",
                defaults.stream.connect_timeout,
            )?,
        };

        let symbols = env
            .string("PRICE_STREAM_SYMBOLS")
            .map(|raw| parse_symbols(&raw))
            .unwrap_or_default();

        let event_buffer = env.parse("PRICE_STREAM_EVENT_BUFFER", defaults.event_buffer)?;
        if event_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PRICE_STREAM_EVENT_BUFFER".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            stream,
            symbols,
            event_buffer,
            metrics_port: env.parse("PRICE_STREAM_METRICS_PORT", defaults.metrics_port)?,
        })
    }

    /// Build the stream client configuration.
    #[must_use]
    pub fn client_config(&self) -> StreamClientConfig {
        StreamClientConfig::new(self.stream.endpoint())
            .with_reconnect(self.stream.reconnect.clone())
            .with_connect_timeout(self.stream.connect_timeout)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable is set but cannot be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// Split a comma-separated symbol list, trimming and upper-casing entries.
#[must_use]
pub fn parse_symbols(raw: &str) -> Vec<Symbol> {
    dedup_symbols(
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase),
    )
}

struct Env<'a, F> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.string(key) {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.string(key) {
            Some(_) => self.parse::<u64>(key, 0).map(Duration::from_millis),
            None => Ok(default),
        }
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.string(key) {
            Some(_) => self.parse::<u64>(key, 0).map(Duration::from_secs),
            None => Ok(default),
        }
    }
}
