//! dxLink Message Types
//!
//! Serde representations of the dxLink WebSocket protocol messages. Every
//! message is a JSON object carrying a `type` tag and the `channel` it
//! belongs to. Channel 0 is the connection's control channel; feed
//! channels are numbered by the client.
//!
//! # Wire Format (JSON)
//! ```json
//! {"type":"SETUP","channel":0,"version":"0.1","keepaliveTimeout":60,"acceptKeepaliveTimeout":60}
//! {"type":"CHANNEL_REQUEST","channel":1,"service":"FEED","parameters":{"contract":"AUTO"}}
//! {"type":"FEED_SUBSCRIPTION","channel":1,"add":[{"type":"TimeAndSale","symbol":"ETH/USD:GDAX"}]}
//! {"type":"FEED_DATA","channel":1,"data":["TimeAndSale",["TimeAndSale","ETH/USD:GDAX",...]]}
//! ```
//!
//! # References
//!
//! - [dxLink protocol](https://demo.dxfeed.com/dxlink-ws/debug/)

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::events::EventType;
use crate::domain::subscription::Symbol;

/// Control channel number.
pub const CONTROL_CHANNEL: u64 = 0;

/// Protocol version announced in `SETUP`.
pub const PROTOCOL_VERSION: &str = "0.1-feed-console";

/// Service name for market data channels.
pub const FEED_SERVICE: &str = "FEED";

/// Data format requested in `FEED_SETUP`.
pub const COMPACT_FORMAT: &str = "COMPACT";

// =============================================================================
// Event Fields
// =============================================================================

const TIME_AND_SALE_FIELDS: &[&str] = &[
    "eventType",
    "eventSymbol",
    "eventFlags",
    "index",
    "time",
    "exchangeCode",
    "price",
    "size",
    "bidPrice",
    "askPrice",
    "exchangeSaleConditions",
    "tradeThroughExempt",
    "aggressorSide",
    "spreadLeg",
    "extendedTradingHours",
    "validTick",
    "type",
    "buyer",
    "seller",
];

const TRADE_FIELDS: &[&str] = &[
    "eventType",
    "eventSymbol",
    "time",
    "exchangeCode",
    "price",
    "change",
    "size",
    "dayVolume",
    "extendedTradingHours",
];

const QUOTE_FIELDS: &[&str] = &[
    "eventType",
    "eventSymbol",
    "bidTime",
    "bidExchangeCode",
    "bidPrice",
    "bidSize",
    "askTime",
    "askExchangeCode",
    "askPrice",
    "askSize",
];

/// Fields requested for an event type, in compact column order.
#[must_use]
pub const fn event_fields(event_type: EventType) -> &'static [&'static str] {
    match event_type {
        EventType::TimeAndSale => TIME_AND_SALE_FIELDS,
        EventType::Trade => TRADE_FIELDS,
        EventType::Quote => QUOTE_FIELDS,
    }
}

// =============================================================================
// Client Messages
// =============================================================================

/// Channel parameters for `CHANNEL_REQUEST`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelParameters {
    /// Feed contract (`AUTO`, `TICKER`, `HISTORY`, `STREAM`).
    pub contract: String,
}

impl Default for ChannelParameters {
    fn default() -> Self {
        Self {
            contract: "AUTO".to_string(),
        }
    }
}

/// One entry of a `FEED_SUBSCRIPTION` add or remove list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    /// Event type name.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event symbol.
    pub symbol: String,
}

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Connection setup, always on the control channel.
    #[serde(rename_all = "camelCase")]
    Setup {
        /// Channel (always 0).
        channel: u64,
        /// Client protocol version.
        version: String,
        /// Seconds within which the client promises to send something.
        keepalive_timeout: u64,
        /// Seconds within which the server should send something.
        accept_keepalive_timeout: u64,
    },

    /// Authorization token.
    Auth {
        /// Channel (always 0).
        channel: u64,
        /// Access token.
        token: String,
    },

    /// Keepalive.
    Keepalive {
        /// Channel (always 0).
        channel: u64,
    },

    /// Open a service channel.
    ChannelRequest {
        /// New channel number.
        channel: u64,
        /// Service name.
        service: String,
        /// Service parameters.
        parameters: ChannelParameters,
    },

    /// Close a service channel.
    ChannelCancel {
        /// Channel to close.
        channel: u64,
    },

    /// Configure the feed channel.
    #[serde(rename_all = "camelCase")]
    FeedSetup {
        /// Feed channel.
        channel: u64,
        /// Requested aggregation period in seconds.
        accept_aggregation_period: f64,
        /// Requested data format.
        accept_data_format: String,
        /// Requested fields per event type.
        accept_event_fields: HashMap<String, Vec<String>>,
    },

    /// Change the channel's subscription.
    FeedSubscription {
        /// Feed channel.
        channel: u64,
        /// Subscriptions to add.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        add: Vec<SubscriptionEntry>,
        /// Subscriptions to remove.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        remove: Vec<SubscriptionEntry>,
        /// Drop every existing subscription first.
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        reset: bool,
    },
}

impl ClientMessage {
    /// `SETUP` announcing keepalive timeouts in seconds.
    #[must_use]
    pub fn setup(keepalive_timeout: u64, accept_keepalive_timeout: u64) -> Self {
        Self::Setup {
            channel: CONTROL_CHANNEL,
            version: PROTOCOL_VERSION.to_string(),
            keepalive_timeout,
            accept_keepalive_timeout,
        }
    }

    /// `AUTH` with an access token.
    #[must_use]
    pub fn auth(token: impl Into<String>) -> Self {
        Self::Auth {
            channel: CONTROL_CHANNEL,
            token: token.into(),
        }
    }

    /// `KEEPALIVE` on the control channel.
    #[must_use]
    pub const fn keepalive() -> Self {
        Self::Keepalive {
            channel: CONTROL_CHANNEL,
        }
    }

    /// `CHANNEL_REQUEST` for a feed channel.
    #[must_use]
    pub fn channel_request(channel: u64) -> Self {
        Self::ChannelRequest {
            channel,
            service: FEED_SERVICE.to_string(),
            parameters: ChannelParameters::default(),
        }
    }

    /// `CHANNEL_CANCEL` for a channel.
    #[must_use]
    pub const fn channel_cancel(channel: u64) -> Self {
        Self::ChannelCancel { channel }
    }

    /// `FEED_SETUP` requesting compact data with the default fields of
    /// `event_type`.
    #[must_use]
    pub fn feed_setup(channel: u64, event_type: EventType, aggregation_period: f64) -> Self {
        let fields = event_fields(event_type)
            .iter()
            .map(|f| (*f).to_string())
            .collect();
        Self::FeedSetup {
            channel,
            accept_aggregation_period: aggregation_period,
            accept_data_format: COMPACT_FORMAT.to_string(),
            accept_event_fields: HashMap::from([(event_type.as_str().to_string(), fields)]),
        }
    }

    /// `FEED_SUBSCRIPTION` adding `symbols` for `event_type`.
    #[must_use]
    pub fn subscribe(channel: u64, event_type: EventType, symbols: &[Symbol], reset: bool) -> Self {
        Self::FeedSubscription {
            channel,
            add: symbols
                .iter()
                .map(|s| SubscriptionEntry {
                    event_type: event_type.as_str().to_string(),
                    symbol: s.as_str().to_string(),
                })
                .collect(),
            remove: Vec::new(),
            reset,
        }
    }

    /// Channel this message belongs to.
    #[must_use]
    pub const fn channel(&self) -> u64 {
        match self {
            Self::Setup { channel, .. }
            | Self::Auth { channel, .. }
            | Self::Keepalive { channel }
            | Self::ChannelRequest { channel, .. }
            | Self::ChannelCancel { channel }
            | Self::FeedSetup { channel, .. }
            | Self::FeedSubscription { channel, .. } => *channel,
        }
    }
}

// =============================================================================
// Server Messages
// =============================================================================

/// Authorization state reported in `AUTH_STATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStatus {
    /// The connection may open channels.
    Authorized,
    /// A token is required or was rejected.
    Unauthorized,
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Server side of the connection setup.
    #[serde(rename_all = "camelCase")]
    Setup {
        /// Server protocol version.
        #[serde(default)]
        version: String,
        /// Seconds within which the server promises to send something.
        #[serde(default)]
        keepalive_timeout: Option<u64>,
        /// Seconds within which the server expects the client to send.
        #[serde(default)]
        accept_keepalive_timeout: Option<u64>,
    },

    /// Authorization state change.
    #[serde(rename_all = "camelCase")]
    AuthState {
        /// New state.
        state: AuthStatus,
        /// Authorized user, when known.
        #[serde(default)]
        user_id: Option<String>,
    },

    /// Keepalive.
    Keepalive {
        /// Channel.
        #[serde(default)]
        channel: u64,
    },

    /// Protocol or service error.
    Error {
        /// Channel the error refers to.
        #[serde(default)]
        channel: u64,
        /// Error code, e.g. `UNAUTHORIZED` or `INVALID_MESSAGE`.
        error: String,
        /// Human-readable detail.
        #[serde(default)]
        message: String,
    },

    /// A requested channel is open.
    ChannelOpened {
        /// Channel.
        channel: u64,
        /// Service name.
        #[serde(default)]
        service: String,
    },

    /// A channel was closed by the server.
    ChannelClosed {
        /// Channel.
        channel: u64,
    },

    /// Effective feed configuration of a channel.
    #[serde(rename_all = "camelCase")]
    FeedConfig {
        /// Channel.
        channel: u64,
        /// Effective aggregation period in seconds.
        #[serde(default)]
        aggregation_period: f64,
        /// Effective data format (`COMPACT` or `FULL`).
        #[serde(default)]
        data_format: String,
        /// Effective fields per event type.
        #[serde(default)]
        event_fields: Option<HashMap<String, Vec<String>>>,
    },

    /// Event data of a channel.
    FeedData {
        /// Channel.
        channel: u64,
        /// Payload in the channel's data format.
        data: Value,
    },

    /// Any message type this client does not handle.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn setup_wire_format() {
        let msg = serde_json::to_value(ClientMessage::setup(60, 60)).unwrap();
        assert_eq!(
            msg,
            json!({
                "type": "SETUP",
                "channel": 0,
                "version": PROTOCOL_VERSION,
                "keepaliveTimeout": 60,
                "acceptKeepaliveTimeout": 60,
            })
        );
    }

    #[test]
    fn channel_request_wire_format() {
        let msg = serde_json::to_value(ClientMessage::channel_request(3)).unwrap();
        assert_eq!(
            msg,
            json!({
                "type": "CHANNEL_REQUEST",
                "channel": 3,
                "service": "FEED",
                "parameters": {"contract": "AUTO"},
            })
        );
    }

    #[test]
    fn feed_setup_lists_event_fields() {
        let msg = ClientMessage::feed_setup(1, EventType::Quote, 0.1);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "FEED_SETUP");
        assert_eq!(value["acceptDataFormat"], "COMPACT");
        assert_eq!(
            value["acceptEventFields"]["Quote"][1],
            json!("eventSymbol")
        );
        assert_eq!(msg.channel(), 1);
    }

    #[test]
    fn subscribe_omits_empty_parts() {
        let symbols = vec![Symbol::new("ETH/USD:GDAX").unwrap()];
        let value =
            serde_json::to_value(ClientMessage::subscribe(1, EventType::TimeAndSale, &symbols, false))
                .unwrap();
        assert_eq!(
            value,
            json!({
                "type": "FEED_SUBSCRIPTION",
                "channel": 1,
                "add": [{"type": "TimeAndSale", "symbol": "ETH/USD:GDAX"}],
            })
        );

        let value =
            serde_json::to_value(ClientMessage::subscribe(1, EventType::Trade, &symbols, true))
                .unwrap();
        assert_eq!(value["reset"], json!(true));
    }

    #[test]
    fn keepalive_wire_format() {
        let value = serde_json::to_value(ClientMessage::keepalive()).unwrap();
        assert_eq!(value, json!({"type": "KEEPALIVE", "channel": 0}));
    }

    #[test]
    fn decode_auth_state() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "AUTH_STATE",
            "channel": 0,
            "state": "AUTHORIZED",
            "userId": "demo",
        }))
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::AuthState {
                state: AuthStatus::Authorized,
                user_id: Some("demo".to_string()),
            }
        );
    }

    #[test]
    fn decode_error() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "ERROR",
            "channel": 1,
            "error": "INVALID_MESSAGE",
            "message": "unknown service",
        }))
        .unwrap();
        assert!(matches!(msg, ServerMessage::Error { channel: 1, .. }));
    }

    #[test]
    fn decode_feed_config() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "FEED_CONFIG",
            "channel": 1,
            "aggregationPeriod": 0.1,
            "dataFormat": "COMPACT",
            "eventFields": {"Trade": ["eventType", "eventSymbol", "price"]},
        }))
        .unwrap();
        let ServerMessage::FeedConfig { event_fields, .. } = msg else {
            panic!("expected FEED_CONFIG");
        };
        assert_eq!(event_fields.unwrap()["Trade"].len(), 3);
    }

    #[test]
    fn unknown_types_decode_as_unknown() {
        let msg: ServerMessage =
            serde_json::from_value(json!({"type": "DOM_SNAPSHOT", "channel": 5})).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn every_event_type_has_fields() {
        for event_type in EventType::all() {
            let fields = event_fields(*event_type);
            assert_eq!(fields[0], "eventType");
            assert_eq!(fields[1], "eventSymbol");
        }
    }
}
