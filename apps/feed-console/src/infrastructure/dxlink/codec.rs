//! dxLink Codec
//!
//! Encodes client messages to JSON text frames and decodes server frames
//! into [`ServerMessage`]s. `FEED_DATA` payloads are turned into domain
//! events using the channel's effective field layout.
//!
//! # Feed Data Formats
//!
//! `COMPACT` sends an event type name followed by a flat value array that
//! holds one row per event, columns in field order:
//!
//! ```json
//! ["Trade", ["Trade", "SPY", 1700000000123, "Q", 450.1, ...]]
//! ```
//!
//! `FULL` sends an array of objects keyed by field name:
//!
//! ```json
//! [{"eventType": "Trade", "eventSymbol": "SPY", "price": 450.1}]
//! ```
//!
//! Numeric fields may arrive as the strings `"NaN"`, `"Infinity"` or
//! `"-Infinity"`. Character fields may arrive as one-character strings or
//! as UTF-16 code units.

use std::collections::HashMap;

use serde_json::Value;

use super::messages::{ClientMessage, ServerMessage, event_fields};
use crate::domain::events::{
    EventType, MarketEvent, OrderSide, Quote, Scope, TimeAndSale, TimeAndSaleType, Trade,
};
use crate::infrastructure::console::TextConverter;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary frame was not valid UTF-8.
    #[error("binary frame is not valid UTF-8")]
    InvalidUtf8,

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// Effective field names per event type name, as announced in `FEED_CONFIG`.
pub type FieldLayout = HashMap<String, Vec<String>>;

/// JSON codec for dxLink frames.
#[derive(Debug, Default, Clone)]
pub struct DxLinkCodec {
    text: TextConverter,
}

impl DxLinkCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new(text: TextConverter) -> Self {
        Self { text }
    }

    /// Encode a client message as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, msg: &ClientMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(msg)?)
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object with a known shape.
    pub fn decode(&self, text: &str) -> Result<ServerMessage, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                trimmed.chars().take(50).collect::<String>()
            )));
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    /// Decode a binary frame carrying UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not UTF-8 or not a valid message.
    pub fn decode_binary(&self, bytes: &[u8]) -> Result<ServerMessage, CodecError> {
        let text = self.text.decode_utf8(Some(bytes));
        if text.is_empty() {
            return Err(CodecError::InvalidUtf8);
        }
        self.decode(&text)
    }

    /// Decode a `FEED_DATA` payload into events.
    ///
    /// `layout` supplies the column order of compact rows; event types it
    /// does not mention fall back to the fields this client requests.
    /// Rows of event types this client does not model are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is neither compact nor full data.
    pub fn decode_feed_data(
        &self,
        data: &Value,
        layout: &FieldLayout,
    ) -> Result<Vec<MarketEvent>, CodecError> {
        let Value::Array(items) = data else {
            return Err(CodecError::InvalidFormat(
                "feed data must be an array".to_string(),
            ));
        };

        match items.first() {
            None => Ok(Vec::new()),
            Some(Value::String(_)) => self.decode_compact(items, layout),
            Some(Value::Object(_)) => self.decode_full(items),
            Some(other) => Err(CodecError::InvalidFormat(format!(
                "unexpected feed data element: {other}"
            ))),
        }
    }

    fn decode_compact(
        &self,
        items: &[Value],
        layout: &FieldLayout,
    ) -> Result<Vec<MarketEvent>, CodecError> {
        let mut events = Vec::new();

        for pair in items.chunks(2) {
            let [Value::String(type_name), Value::Array(values)] = pair else {
                return Err(CodecError::InvalidFormat(
                    "compact data must alternate event type and values".to_string(),
                ));
            };
            let Some(event_type) = EventType::from_str_case_insensitive(type_name) else {
                tracing::trace!(event_type = %type_name, "Skipping unsupported event type");
                continue;
            };

            let fields: Vec<&str> = layout.get(type_name).map_or_else(
                || event_fields(event_type).to_vec(),
                |fields| fields.iter().map(String::as_str).collect(),
            );
            if fields.is_empty() || values.len() % fields.len() != 0 {
                return Err(CodecError::InvalidFormat(format!(
                    "{type_name} values do not match {} fields",
                    fields.len()
                )));
            }

            for row in values.chunks(fields.len()) {
                let row = Row {
                    values: fields.iter().copied().zip(row).collect(),
                    text: self.text,
                };
                events.push(row.to_event(event_type));
            }
        }

        Ok(events)
    }

    fn decode_full(&self, items: &[Value]) -> Result<Vec<MarketEvent>, CodecError> {
        let mut events = Vec::with_capacity(items.len());

        for item in items {
            let Value::Object(object) = item else {
                return Err(CodecError::InvalidFormat(
                    "full data must be an array of objects".to_string(),
                ));
            };
            let type_name = object
                .get("eventType")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let Some(event_type) = EventType::from_str_case_insensitive(type_name) else {
                tracing::trace!(event_type = %type_name, "Skipping unsupported event type");
                continue;
            };

            let row = Row {
                values: object.iter().map(|(k, v)| (k.as_str(), v)).collect(),
                text: self.text,
            };
            events.push(row.to_event(event_type));
        }

        Ok(events)
    }
}

// =============================================================================
// Rows
// =============================================================================

/// One event's values keyed by field name.
struct Row<'a> {
    values: HashMap<&'a str, &'a Value>,
    text: TextConverter,
}

impl Row<'_> {
    fn to_event(&self, event_type: EventType) -> MarketEvent {
        match event_type {
            EventType::TimeAndSale => MarketEvent::TimeAndSale(self.time_and_sale()),
            EventType::Trade => MarketEvent::Trade(self.trade()),
            EventType::Quote => MarketEvent::Quote(self.quote()),
        }
    }

    fn time_and_sale(&self) -> TimeAndSale {
        let exchange_code = self.char("exchangeCode");
        TimeAndSale {
            event_symbol: self.string("eventSymbol"),
            event_flags: u32::try_from(self.i64("eventFlags")).unwrap_or(0),
            index: self.i64("index"),
            time: self.i64("time"),
            exchange_code,
            price: self.f64("price"),
            size: self.f64("size"),
            bid_price: self.f64("bidPrice"),
            ask_price: self.f64("askPrice"),
            exchange_sale_conditions: self.string("exchangeSaleConditions"),
            buyer: self.string("buyer"),
            seller: self.string("seller"),
            aggressor_side: OrderSide::from_wire(&self.string("aggressorSide")),
            kind: TimeAndSaleType::from_wire(&self.string("type")),
            valid_tick: self.bool("validTick"),
            extended_trading_hours: self.bool("extendedTradingHours"),
            trade_through_exempt: self.char("tradeThroughExempt"),
            spread_leg: self.bool("spreadLeg"),
            scope: Scope::for_exchange(exchange_code),
        }
    }

    fn trade(&self) -> Trade {
        Trade {
            event_symbol: self.string("eventSymbol"),
            time: self.i64("time"),
            exchange_code: self.char("exchangeCode"),
            price: self.f64("price"),
            change: self.f64("change"),
            size: self.f64("size"),
            day_volume: self.f64("dayVolume"),
            extended_trading_hours: self.bool("extendedTradingHours"),
        }
    }

    fn quote(&self) -> Quote {
        Quote {
            event_symbol: self.string("eventSymbol"),
            bid_time: self.i64("bidTime"),
            bid_exchange_code: self.char("bidExchangeCode"),
            bid_price: self.f64("bidPrice"),
            bid_size: self.f64("bidSize"),
            ask_time: self.i64("askTime"),
            ask_exchange_code: self.char("askExchangeCode"),
            ask_price: self.f64("askPrice"),
            ask_size: self.f64("askSize"),
        }
    }

    fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field).copied()
    }

    /// Missing or unparseable numbers are NaN.
    fn f64(&self, field: &str) -> f64 {
        match self.get(field) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            Some(Value::String(s)) => s.parse().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn i64(&self, field: &str) -> i64 {
        match self.get(field) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    fn string(&self, field: &str) -> String {
        match self.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn char(&self, field: &str) -> Option<char> {
        match self.get(field)? {
            Value::String(s) => s.chars().next().filter(|c| *c != '\0'),
            Value::Number(n) => n
                .as_u64()
                .and_then(|unit| u16::try_from(unit).ok())
                .and_then(|unit| self.text.unit_to_char(unit)),
            _ => None,
        }
    }

    fn bool(&self, field: &str) -> bool {
        match self.get(field) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn codec() -> DxLinkCodec {
        DxLinkCodec::new(TextConverter::new())
    }

    fn time_and_sale(event: &MarketEvent) -> &TimeAndSale {
        match event {
            MarketEvent::TimeAndSale(tns) => tns,
            other => panic!("expected TimeAndSale, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_non_objects() {
        assert!(matches!(
            codec().decode("[1, 2, 3]"),
            Err(CodecError::InvalidFormat(_))
        ));
        assert!(matches!(codec().decode("{not json"), Err(CodecError::Json(_))));
    }

    #[test]
    fn decode_binary_frames() {
        let msg = codec()
            .decode_binary(br#"{"type":"KEEPALIVE","channel":0}"#)
            .unwrap();
        assert_eq!(msg, ServerMessage::Keepalive { channel: 0 });
        assert!(matches!(
            codec().decode_binary(&[0xFF, 0xFE]),
            Err(CodecError::InvalidUtf8)
        ));
    }

    #[test]
    fn encode_keepalive() {
        assert_eq!(
            codec().encode(&ClientMessage::keepalive()).unwrap(),
            r#"{"type":"KEEPALIVE","channel":0}"#
        );
    }

    #[test]
    fn compact_time_and_sale_with_default_layout() {
        let data = json!([
            "TimeAndSale",
            [
                "TimeAndSale", "ETH/USD:GDAX", 0, 7_300_000_000_000_001_i64, 1_700_000_000_123_i64,
                "G", 2043.5, 0.25, 2043.49, 2043.51, "", null, "BUY", false, false, true, "NEW",
                "", "",
                "TimeAndSale", "ETH/USD:GDAX", 0, 7_300_000_000_000_002_i64, 1_700_000_000_456_i64,
                "G", "NaN", 1.0, 2043.49, 2043.51, "", null, "SELL", false, false, true, "NEW",
                "", ""
            ]
        ]);

        let events = codec().decode_feed_data(&data, &FieldLayout::new()).unwrap();
        assert_eq!(events.len(), 2);

        let first = time_and_sale(&events[0]);
        assert_eq!(first.event_symbol, "ETH/USD:GDAX");
        assert_eq!(first.index, 7_300_000_000_000_001);
        assert_eq!(first.time, 1_700_000_000_123);
        assert_eq!(first.exchange_code, Some('G'));
        assert!((first.price - 2043.5).abs() < f64::EPSILON);
        assert_eq!(first.aggressor_side, OrderSide::Buy);
        assert!(first.valid_tick);
        assert_eq!(first.trade_through_exempt, None);
        assert_eq!(first.scope, Scope::Regional);

        let second = time_and_sale(&events[1]);
        assert!(second.price.is_nan());
        assert_eq!(second.aggressor_side, OrderSide::Sell);
    }

    #[test]
    fn compact_uses_announced_layout() {
        let layout = FieldLayout::from([(
            "Trade".to_string(),
            vec![
                "eventSymbol".to_string(),
                "price".to_string(),
                "exchangeCode".to_string(),
            ],
        )]);
        let data = json!(["Trade", ["SPY", 450.25, 81, "QQQ", "Infinity", "N"]]);

        let events = codec().decode_feed_data(&data, &layout).unwrap();
        assert_eq!(events.len(), 2);
        let MarketEvent::Trade(spy) = &events[0] else {
            panic!("expected Trade");
        };
        assert_eq!(spy.event_symbol, "SPY");
        assert_eq!(spy.exchange_code, Some('Q'));
        assert!(spy.change.is_nan());
        let MarketEvent::Trade(qqq) = &events[1] else {
            panic!("expected Trade");
        };
        assert!(qqq.price.is_infinite());
    }

    #[test]
    fn compact_rejects_ragged_rows() {
        let layout = FieldLayout::from([(
            "Trade".to_string(),
            vec!["eventSymbol".to_string(), "price".to_string()],
        )]);
        let data = json!(["Trade", ["SPY", 1.0, "QQQ"]]);
        assert!(matches!(
            codec().decode_feed_data(&data, &layout),
            Err(CodecError::InvalidFormat(_))
        ));
    }

    #[test]
    fn compact_skips_unknown_event_types() {
        let data = json!(["Greeks", ["Greeks", "SPY", 0.5]]);
        let events = codec().decode_feed_data(&data, &FieldLayout::new()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn full_format_objects() {
        let data = json!([
            {
                "eventType": "Quote",
                "eventSymbol": "AAPL",
                "bidPrice": 150.0,
                "askPrice": 150.01,
                "bidExchangeCode": "Q",
                "askExchangeCode": 80
            },
            {"eventType": "Summary", "eventSymbol": "AAPL"}
        ]);
        let events = codec().decode_feed_data(&data, &FieldLayout::new()).unwrap();
        assert_eq!(events.len(), 1);
        let MarketEvent::Quote(quote) = &events[0] else {
            panic!("expected Quote");
        };
        assert_eq!(quote.event_symbol, "AAPL");
        assert_eq!(quote.bid_exchange_code, Some('Q'));
        assert_eq!(quote.ask_exchange_code, Some('P'));
        assert!(quote.bid_size.is_nan());
    }

    #[test]
    fn empty_and_invalid_payloads() {
        assert!(
            codec()
                .decode_feed_data(&json!([]), &FieldLayout::new())
                .unwrap()
                .is_empty()
        );
        assert!(codec().decode_feed_data(&json!({}), &FieldLayout::new()).is_err());
        assert!(codec().decode_feed_data(&json!([1, 2]), &FieldLayout::new()).is_err());
    }
}
