//! Console Formatting
//!
//! Renders timestamps and event records as single human-readable lines:
//!
//! ```text
//! TimeAndSale{symbol=ETH/USD:GDAX, index=..., time=2024-01-15 10:00:00.123, ...}
//! ```
//!
//! Prices and sizes use six decimals, enumerations use fixed labels,
//! booleans print as `True`/`False` and flag words print in hexadecimal
//! with an upper-case `0X` prefix.

use std::fmt::{Display, Write};

use chrono::{Local, TimeZone};

use crate::domain::events::{MarketEvent, Quote, TimeAndSale, Trade};

/// Default layout for the date and time part of a timestamp.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// Timestamps
// =============================================================================

/// Format seconds since the Unix epoch in `tz` using a `strftime` layout.
///
/// Out-of-range timestamps and invalid layouts yield an empty string.
#[must_use]
pub fn format_time_in<Tz>(tz: &Tz, seconds: i64, format: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let Some(datetime) = tz.timestamp_opt(seconds, 0).earliest() else {
        return String::new();
    };

    let mut out = String::new();
    if write!(out, "{}", datetime.format(format)).is_err() {
        return String::new();
    }
    out
}

/// Format milliseconds since the Unix epoch in `tz` as
/// `YYYY-MM-DD HH:MM:SS.mmm`.
///
/// The millisecond part is always three zero-padded digits, including for
/// timestamps before the epoch.
#[must_use]
pub fn format_timestamp_millis_in<Tz>(tz: &Tz, millis: i64) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let seconds = millis.div_euclid(1000);
    let fraction = millis.rem_euclid(1000);
    format!(
        "{}.{fraction:03}",
        format_time_in(tz, seconds, DEFAULT_TIME_FORMAT)
    )
}

/// Format seconds since the Unix epoch in the local time zone.
#[must_use]
pub fn format_local_time(seconds: i64) -> String {
    format_time_in(&Local, seconds, DEFAULT_TIME_FORMAT)
}

/// Format milliseconds since the Unix epoch in the local time zone.
#[must_use]
pub fn format_timestamp_millis(millis: i64) -> String {
    format_timestamp_millis_in(&Local, millis)
}

// =============================================================================
// Events
// =============================================================================

const fn bool_label(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn char_text(value: Option<char>) -> String {
    value.map(String::from).unwrap_or_default()
}

/// Formats event records as console lines.
#[derive(Debug, Clone)]
pub struct EventFormatter<Tz = Local> {
    tz: Tz,
}

impl EventFormatter<Local> {
    /// Formatter rendering times in the local time zone.
    #[must_use]
    pub const fn local() -> Self {
        Self { tz: Local }
    }
}

impl Default for EventFormatter<Local> {
    fn default() -> Self {
        Self::local()
    }
}

impl<Tz> EventFormatter<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    /// Formatter rendering times in `tz`.
    #[must_use]
    pub const fn with_timezone(tz: Tz) -> Self {
        Self { tz }
    }

    /// Render one event as `<EventType>{symbol=<symbol>, <field>=<value>, ...}`.
    #[must_use]
    pub fn format(&self, event: &MarketEvent) -> String {
        let mut out = format!("{}{{symbol={}, ", event.event_type(), event.symbol());
        let fields = match event {
            MarketEvent::TimeAndSale(tns) => self.time_and_sale_fields(tns),
            MarketEvent::Trade(trade) => self.trade_fields(trade),
            MarketEvent::Quote(quote) => self.quote_fields(quote),
        };
        out.push_str(&fields);
        out.push('}');
        out
    }

    fn time(&self, millis: i64) -> String {
        format_timestamp_millis_in(&self.tz, millis)
    }

    fn time_and_sale_fields(&self, tns: &TimeAndSale) -> String {
        format!(
            "index={}, time={}, exchange={}, price={:.6}, size={:.6}, bid price={:.6}, \
             ask price={:.6}, exchange sale conditions={}, buyer={}, seller={}, side={}, \
             type={}, is valid tick={}, is ETH trade={}, Trade Through Exempt={}, \
             is spread leg={}, scope={}, event flags=0X{:X}, raw_flags=0X{:X}",
            tns.index,
            self.time(tns.time),
            char_text(tns.exchange_code),
            tns.price,
            tns.size,
            tns.bid_price,
            tns.ask_price,
            tns.exchange_sale_conditions,
            tns.buyer,
            tns.seller,
            tns.aggressor_side.label(),
            tns.kind.label(),
            bool_label(tns.valid_tick),
            bool_label(tns.extended_trading_hours),
            char_text(tns.trade_through_exempt),
            bool_label(tns.spread_leg),
            tns.scope.label(),
            tns.event_flags,
            tns.raw_flags(),
        )
    }

    fn trade_fields(&self, trade: &Trade) -> String {
        format!(
            "time={}, exchange={}, price={:.6}, change={:.6}, size={:.6}, \
             day volume={:.6}, is ETH trade={}",
            self.time(trade.time),
            char_text(trade.exchange_code),
            trade.price,
            trade.change,
            trade.size,
            trade.day_volume,
            bool_label(trade.extended_trading_hours),
        )
    }

    fn quote_fields(&self, quote: &Quote) -> String {
        format!(
            "bid time={}, bid exchange={}, bid price={:.6}, bid size={:.6}, \
             ask time={}, ask exchange={}, ask price={:.6}, ask size={:.6}",
            self.time(quote.bid_time),
            char_text(quote.bid_exchange_code),
            quote.bid_price,
            quote.bid_size,
            self.time(quote.ask_time),
            char_text(quote.ask_exchange_code),
            quote.ask_price,
            quote.ask_size,
        )
    }
}
