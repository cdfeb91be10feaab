//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the session service and the port interfaces
//! that define how the console client talks to a market data feed.

/// Port interfaces for the feed (connect, subscribe, listen).
pub mod ports;

/// Session setup service.
pub mod services;
