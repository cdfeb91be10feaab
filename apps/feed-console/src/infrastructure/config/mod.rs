//! Configuration Module
//!
//! Environment-driven configuration for the feed console.

mod settings;

pub use settings::{
    ClientConfig, ConfigError, ConnectionSettings, DEFAULT_ADDRESS, DEFAULT_SYMBOLS, FeedSettings,
};
