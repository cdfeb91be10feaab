//! Domain Layer - Market event types and subscription bookkeeping.
//!
//! This layer contains the event records delivered by the feed and the
//! symbol types used to subscribe to them. It has no I/O and no
//! dependency on any particular feed protocol.

/// Market event records (time and sale, trade, quote).
pub mod events;

/// Symbols and per-subscription symbol sets.
pub mod subscription;
