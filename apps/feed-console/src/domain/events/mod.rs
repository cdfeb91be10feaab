//! Market Event Types
//!
//! Event records delivered by the feed. These types are protocol-agnostic:
//! adapters decode their wire format into them and listeners consume them.
//!
//! # Event Categories
//!
//! - `TimeAndSale`: a single trade print with its conditions and flags
//! - `Trade`: last trade snapshot with day volume
//! - `Quote`: best bid and offer

use std::fmt;

// =============================================================================
// Event Type
// =============================================================================

/// Event category a subscription is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventType {
    /// Trade prints (time and sale).
    #[default]
    TimeAndSale,
    /// Last trade snapshots.
    Trade,
    /// Best bid/offer quotes.
    Quote,
}

impl EventType {
    /// Get all supported event types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::TimeAndSale, Self::Trade, Self::Quote]
    }

    /// Name of the event type, as used on the wire and in console output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TimeAndSale => "TimeAndSale",
            Self::Trade => "Trade",
            Self::Quote => "Quote",
        }
    }

    /// Parse an event type name, ignoring case.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Enumerated Fields
// =============================================================================

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSide {
    /// Side is not known.
    #[default]
    Undefined,
    /// Buyer initiated.
    Buy,
    /// Seller initiated.
    Sell,
}

impl OrderSide {
    const LABELS: [&'static str; 3] = ["Undefined", "Buy", "Sell"];

    /// Console label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        Self::LABELS[self.code() as usize]
    }

    /// Numeric code used in packed flags.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Undefined => 0,
            Self::Buy => 1,
            Self::Sell => 2,
        }
    }

    /// Parse the wire representation (`BUY`, `SELL`, anything else is undefined).
    #[must_use]
    pub fn from_wire(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Self::Buy,
            "SELL" => Self::Sell,
            _ => Self::Undefined,
        }
    }
}

/// Kind of a time and sale record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeAndSaleType {
    /// Regular new trade.
    #[default]
    New,
    /// Correction of a previous trade.
    Correction,
    /// Cancellation of a previous trade.
    Cancel,
}

impl TimeAndSaleType {
    const LABELS: [&'static str; 3] = ["New", "Correction", "Cancel"];

    /// Console label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        Self::LABELS[self.code() as usize]
    }

    /// Numeric code used in packed flags.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::New => 0,
            Self::Correction => 1,
            Self::Cancel => 2,
        }
    }

    /// Parse the wire representation (`NEW`, `CORRECTION`, `CANCEL`).
    #[must_use]
    pub fn from_wire(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "CORRECTION" => Self::Correction,
            "CANCEL" => Self::Cancel,
            _ => Self::New,
        }
    }
}

/// Scope of an event: consolidated across venues or venue specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Consolidated across all venues.
    #[default]
    Composite,
    /// Single venue.
    Regional,
    /// Aggregated price level.
    Aggregate,
    /// Individual order.
    Order,
}

impl Scope {
    const LABELS: [&'static str; 4] = ["Composite", "Regional", "Aggregate", "Order"];

    /// Console label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        Self::LABELS[self as usize]
    }

    /// Scope of a trade print reported by the given exchange.
    ///
    /// Prints without an exchange code are composite.
    #[must_use]
    pub const fn for_exchange(exchange_code: Option<char>) -> Self {
        match exchange_code {
            None => Self::Composite,
            Some(_) => Self::Regional,
        }
    }
}

// =============================================================================
// Time and Sale
// =============================================================================

const TTE_MASK: u32 = 0xFF;
const TTE_SHIFT: u32 = 8;
const SIDE_SHIFT: u32 = 5;
const SPREAD_LEG: u32 = 1 << 4;
const ETH: u32 = 1 << 3;
const VALID_TICK: u32 = 1 << 2;

/// A single trade print.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeAndSale {
    /// Instrument symbol.
    pub event_symbol: String,
    /// Transactional event flags.
    pub event_flags: u32,
    /// Unique per-symbol index of this print.
    pub index: i64,
    /// Time of the print, milliseconds since the Unix epoch.
    pub time: i64,
    /// Exchange code, if the print is venue specific.
    pub exchange_code: Option<char>,
    /// Trade price.
    pub price: f64,
    /// Trade size.
    pub size: f64,
    /// Bid price at the time of the print.
    pub bid_price: f64,
    /// Ask price at the time of the print.
    pub ask_price: f64,
    /// Sale conditions reported by the exchange.
    pub exchange_sale_conditions: String,
    /// Buyer id, if disclosed.
    pub buyer: String,
    /// Seller id, if disclosed.
    pub seller: String,
    /// Aggressor side.
    pub aggressor_side: OrderSide,
    /// New, correction or cancel.
    pub kind: TimeAndSaleType,
    /// Whether the print updates last price.
    pub valid_tick: bool,
    /// Whether the print happened during extended trading hours.
    pub extended_trading_hours: bool,
    /// Trade-through exempt code.
    pub trade_through_exempt: Option<char>,
    /// Whether the print is a leg of a spread.
    pub spread_leg: bool,
    /// Composite or regional.
    pub scope: Scope,
}

impl TimeAndSale {
    /// Pack the trade attributes into the feed's flags word.
    ///
    /// Layout (low to high): type (2 bits), valid tick, ETH, spread leg,
    /// side (2 bits at 5), trade-through exempt (8 bits at 8).
    #[must_use]
    pub fn raw_flags(&self) -> u32 {
        let tte = self
            .trade_through_exempt
            .map_or(0, |c| u32::from(c) & TTE_MASK);

        let mut flags = (tte << TTE_SHIFT) | (self.aggressor_side.code() << SIDE_SHIFT);
        if self.spread_leg {
            flags |= SPREAD_LEG;
        }
        if self.extended_trading_hours {
            flags |= ETH;
        }
        if self.valid_tick {
            flags |= VALID_TICK;
        }
        flags | self.kind.code()
    }
}

// =============================================================================
// Trade and Quote
// =============================================================================

/// Last trade snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trade {
    /// Instrument symbol.
    pub event_symbol: String,
    /// Time of the last trade, milliseconds since the Unix epoch.
    pub time: i64,
    /// Exchange of the last trade.
    pub exchange_code: Option<char>,
    /// Last trade price.
    pub price: f64,
    /// Change from the previous day close.
    pub change: f64,
    /// Last trade size.
    pub size: f64,
    /// Accumulated volume for the day.
    pub day_volume: f64,
    /// Whether the last trade happened during extended trading hours.
    pub extended_trading_hours: bool,
}

/// Best bid and offer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Quote {
    /// Instrument symbol.
    pub event_symbol: String,
    /// Time of the last bid change, milliseconds since the Unix epoch.
    pub bid_time: i64,
    /// Exchange of the best bid.
    pub bid_exchange_code: Option<char>,
    /// Best bid price.
    pub bid_price: f64,
    /// Best bid size.
    pub bid_size: f64,
    /// Time of the last ask change, milliseconds since the Unix epoch.
    pub ask_time: i64,
    /// Exchange of the best ask.
    pub ask_exchange_code: Option<char>,
    /// Best ask price.
    pub ask_price: f64,
    /// Best ask size.
    pub ask_size: f64,
}

// =============================================================================
// Market Event
// =============================================================================

/// Any event record delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// Trade print.
    TimeAndSale(TimeAndSale),
    /// Last trade snapshot.
    Trade(Trade),
    /// Best bid/offer.
    Quote(Quote),
}

impl MarketEvent {
    /// Event category of this record.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::TimeAndSale(_) => EventType::TimeAndSale,
            Self::Trade(_) => EventType::Trade,
            Self::Quote(_) => EventType::Quote,
        }
    }

    /// Symbol the event belongs to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::TimeAndSale(e) => &e.event_symbol,
            Self::Trade(e) => &e.event_symbol,
            Self::Quote(e) => &e.event_symbol,
        }
    }
}
