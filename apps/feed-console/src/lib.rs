#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Feed Console - Market Data Sample Client
//!
//! Connects to a dxLink market data feed, subscribes to one event type for
//! a set of symbols and prints every received event as a single line.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Event records and subscription types
//!   - `events`: `TimeAndSale`, `Trade`, `Quote` and their enumerations
//!   - `subscription`: Symbols and per-subscription symbol sets
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Feed connector, connection, subscription and listener traits
//!   - `services`: The console session and its exit codes
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `console`: Text conversion, line formatting, printing listener
//!   - `dxlink`: WebSocket feed adapter
//!   - `config`: Environment configuration
//!   - `telemetry`: Logging and trace export
//!
//! # Data Flow
//!
//! ```text
//! dxLink WS ──► DxLinkConnection ──► EventListener ──► ConsolePrinter ──► stdout
//!                     ▲
//!               ConsoleSession (connect, subscribe, add symbols)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Event records and subscription types.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::events::{EventType, MarketEvent, Quote, TimeAndSale, Trade};
pub use domain::subscription::{SubscriptionState, Symbol, SymbolError};

// Ports and session
pub use application::ports::{
    EventListener, FeedConnection, FeedConnector, FeedError, FeedSubscription, InMemoryFeed,
};
pub use application::services::{ActiveSession, ConsoleSession, SessionError, SessionSettings};

// Infrastructure
pub use infrastructure::config::{ClientConfig, ConfigError};
pub use infrastructure::console::{ConsolePrinter, EventFormatter, TextConverter};
pub use infrastructure::dxlink::{DxLinkConfig, DxLinkConnector};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
