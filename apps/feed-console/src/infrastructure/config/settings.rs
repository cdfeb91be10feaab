//! Client Configuration Settings
//!
//! Configuration for the feed console, loaded from environment variables.
//! Tuning values fall back to their defaults when unset or malformed;
//! what to subscribe to is validated and rejected when invalid.

use std::time::Duration;

use crate::application::services::SessionSettings;
use crate::domain::events::EventType;
use crate::domain::subscription::{Symbol, SymbolError};
use crate::infrastructure::dxlink::{AccessToken, DxLinkConfig, KeepaliveConfig, ReconnectConfig};

/// Public dxLink demo endpoint.
pub const DEFAULT_ADDRESS: &str = "wss://demo.dxfeed.com/dxlink-ws";

/// Symbol subscribed when none are configured.
pub const DEFAULT_SYMBOLS: &str = "ETH/USD:GDAX";

/// What to connect to and subscribe for.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Feed address.
    pub address: String,
    /// Optional access token.
    pub token: Option<AccessToken>,
    /// Event type to subscribe to.
    pub event_type: EventType,
    /// Symbols to subscribe.
    pub symbols: Vec<Symbol>,
}

/// Connection tuning.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Interval between outgoing keepalives.
    pub keepalive_interval: Duration,
    /// Server silence after which the connection is considered dead.
    pub keepalive_timeout: Duration,
    /// Timeout for the handshake and for opening a channel.
    pub request_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0,
        }
    }
}

impl ConnectionSettings {
    /// Keepalive configuration for the dxLink client.
    #[must_use]
    pub const fn keepalive(&self) -> KeepaliveConfig {
        KeepaliveConfig::new(self.keepalive_interval, self.keepalive_timeout)
    }

    /// Reconnection configuration for the dxLink client.
    #[must_use]
    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: self.reconnect_delay_initial,
            max_delay: self.reconnect_delay_max,
            multiplier: self.reconnect_delay_multiplier,
            max_attempts: self.max_reconnect_attempts,
            ..ReconnectConfig::default()
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Feed settings.
    pub feed: FeedSettings,
    /// Connection settings.
    pub connection: ConnectionSettings,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the address, event type or symbol list is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the address, event type or symbol list is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let address = lookup("FEED_ADDRESS").unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        let address = address.trim().to_string();
        if address.is_empty() {
            return Err(ConfigError::EmptyValue("FEED_ADDRESS".to_string()));
        }

        let token = lookup("FEED_AUTH_TOKEN").and_then(AccessToken::new);

        let event_type = match lookup("FEED_EVENT_TYPE") {
            Some(raw) => EventType::from_str_case_insensitive(raw.trim())
                .ok_or(ConfigError::InvalidEventType(raw))?,
            None => EventType::default(),
        };

        let symbols = Symbol::parse_list(
            &lookup("FEED_SYMBOLS").unwrap_or_else(|| DEFAULT_SYMBOLS.to_string()),
        )
        .map_err(|source| ConfigError::InvalidSymbols {
            key: "FEED_SYMBOLS".to_string(),
            source,
        })?;

        let defaults = ConnectionSettings::default();
        let connection = ConnectionSettings {
            keepalive_interval: parse_env_duration_secs(
                &lookup,
                "FEED_KEEPALIVE_INTERVAL_SECS",
                defaults.keepalive_interval,
            ),
            keepalive_timeout: parse_env_duration_secs(
                &lookup,
                "FEED_KEEPALIVE_TIMEOUT_SECS",
                defaults.keepalive_timeout,
            ),
            request_timeout: parse_env_duration_secs(
                &lookup,
                "FEED_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                &lookup,
                "FEED_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                &lookup,
                "FEED_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                &lookup,
                "FEED_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_env_u32(
                &lookup,
                "FEED_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
        };

        Ok(Self {
            feed: FeedSettings {
                address,
                token,
                event_type,
                symbols,
            },
            connection,
        })
    }

    /// Settings for the console session.
    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            address: self.feed.address.clone(),
            event_type: self.feed.event_type,
            symbols: self.feed.symbols.clone(),
        }
    }

    /// Configuration for the dxLink connector.
    #[must_use]
    pub fn dxlink_config(&self) -> DxLinkConfig {
        DxLinkConfig {
            token: self.feed.token.clone(),
            keepalive: self.connection.keepalive(),
            reconnect: self.connection.reconnect(),
            request_timeout: self.connection.request_timeout,
            ..DxLinkConfig::default()
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),

    /// Event type is not supported.
    #[error("unsupported event type: {0} (expected one of TimeAndSale, Trade, Quote)")]
    InvalidEventType(String),

    /// Symbol list holds no symbol.
    #[error("invalid symbol list in {key}: {source}")]
    InvalidSymbols {
        /// Environment variable.
        key: String,
        /// Validation failure.
        #[source]
        source: SymbolError,
    },
}

fn parse_env_u32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(default)
}

fn parse_env_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
