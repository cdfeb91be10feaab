//! dxLink Loopback Integration Tests
//!
//! Runs the dxLink connector against a scripted WebSocket server on
//! localhost and checks the handshake, channel setup and event delivery.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use feed_console::application::services::{
    EXIT_CONNECT_FAILED, EXIT_SUBSCRIBE_FAILED, SessionError,
};
use feed_console::infrastructure::dxlink::{KeepaliveConfig, ReconnectConfig};
use feed_console::{
    ConsoleSession, DxLinkConfig, DxLinkConnector, EventListener, EventType, FeedConnector,
    FeedError, MarketEvent, SessionSettings, Symbol, TimeAndSale,
};

/// Replies to one client message, or `None` to drop the socket.
///
/// Gets the zero-based number of the connection the message arrived on.
type Responder = fn(usize, &Value) -> Option<Vec<Value>>;

/// Client messages per connection, in arrival order.
type Received = Arc<Mutex<Vec<Vec<Value>>>>;

/// Start a server answering each client message with `respond`.
///
/// Returns the server address and every message received so far.
async fn start_server(respond: Responder) -> (String, Received) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let log = Arc::clone(&log);
            let connection = {
                let mut log = log.lock();
                log.push(Vec::new());
                log.len() - 1
            };
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(frame)) = ws.next().await {
                    let Message::Text(text) = frame else {
                        continue;
                    };
                    let msg: Value = serde_json::from_str(&text).unwrap();
                    let replies = respond(connection, &msg);
                    log.lock()[connection].push(msg);
                    let Some(replies) = replies else {
                        return;
                    };
                    for reply in replies {
                        if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    (format!("ws://{addr}"), received)
}

fn handshake(msg: &Value) -> Option<Vec<Value>> {
    (msg["type"] == "SETUP").then(|| {
        vec![
            json!({
                "type": "SETUP",
                "channel": 0,
                "version": "1.0-loopback",
                "keepaliveTimeout": 60,
                "acceptKeepaliveTimeout": 60
            }),
            json!({"type": "AUTH_STATE", "channel": 0, "state": "AUTHORIZED", "userId": "demo"}),
        ]
    })
}

fn message_types(messages: &[Value]) -> Vec<&str> {
    messages
        .iter()
        .map(|msg| msg["type"].as_str().unwrap_or_default())
        .collect()
}

/// Opens every channel, answers keepalives and answers each subscribed
/// symbol with one print.
fn feed_server(_connection: usize, msg: &Value) -> Option<Vec<Value>> {
    Some(feed_replies(msg))
}

fn feed_replies(msg: &Value) -> Vec<Value> {
    if let Some(replies) = handshake(msg) {
        return replies;
    }

    let channel = msg["channel"].clone();
    match msg["type"].as_str() {
        Some("KEEPALIVE") => vec![json!({"type": "KEEPALIVE", "channel": 0})],
        Some("CHANNEL_REQUEST") => vec![json!({
            "type": "CHANNEL_OPENED",
            "channel": channel,
            "service": "FEED",
            "parameters": {"contract": "AUTO"}
        })],
        Some("FEED_SETUP") => vec![json!({
            "type": "FEED_CONFIG",
            "channel": channel,
            "aggregationPeriod": 0.1,
            "dataFormat": "COMPACT",
            "eventFields": {
                "TimeAndSale": ["eventType", "eventSymbol", "time", "price", "size", "exchangeCode"]
            }
        })],
        Some("FEED_SUBSCRIPTION") => msg["add"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|entry| {
                json!({
                    "type": "FEED_DATA",
                    "channel": channel,
                    "data": [
                        "TimeAndSale",
                        ["TimeAndSale", entry["symbol"], 1_705_312_800_123_i64, 2_345.5, 0.25, "Q"]
                    ]
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Drops the first connection right after its first subscription.
fn dropping_server(connection: usize, msg: &Value) -> Option<Vec<Value>> {
    if connection == 0 && msg["type"] == "FEED_SUBSCRIPTION" {
        return None;
    }
    Some(feed_replies(msg))
}

/// Goes silent on the first connection once the channel is set up.
fn silent_server(connection: usize, msg: &Value) -> Option<Vec<Value>> {
    if connection == 0 && msg["type"] == "KEEPALIVE" {
        return Some(Vec::new());
    }
    Some(feed_replies(msg))
}

/// Authorizes but refuses every channel.
fn refusing_server(_connection: usize, msg: &Value) -> Option<Vec<Value>> {
    if let Some(replies) = handshake(msg) {
        return Some(replies);
    }

    if msg["type"] != "CHANNEL_REQUEST" {
        return Some(Vec::new());
    }
    Some(vec![json!({
        "type": "ERROR",
        "channel": msg["channel"],
        "error": "UNSUPPORTED_PROTOCOL",
        "message": "FEED service is not available"
    })])
}

/// Authorizes but never answers a channel request.
fn unanswering_server(_connection: usize, msg: &Value) -> Option<Vec<Value>> {
    Some(handshake(msg).unwrap_or_default())
}

/// Starts unauthorized and never authorizes.
fn token_server(_connection: usize, msg: &Value) -> Option<Vec<Value>> {
    Some(if msg["type"] == "SETUP" {
        vec![json!({"type": "AUTH_STATE", "channel": 0, "state": "UNAUTHORIZED"})]
    } else {
        Vec::new()
    })
}

/// Starts unauthorized, then authorizes without asking for a token.
fn late_authorizing_server(_connection: usize, msg: &Value) -> Option<Vec<Value>> {
    Some(if msg["type"] == "SETUP" {
        vec![
            json!({"type": "SETUP", "channel": 0, "version": "1.0-loopback"}),
            json!({"type": "AUTH_STATE", "channel": 0, "state": "UNAUTHORIZED"}),
            json!({"type": "AUTH_STATE", "channel": 0, "state": "AUTHORIZED"}),
        ]
    } else {
        Vec::new()
    })
}

fn connector() -> DxLinkConnector {
    DxLinkConnector::new(DxLinkConfig {
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    })
}

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(50),
        jitter_factor: 0.0,
        ..Default::default()
    }
}

async fn next_print(events: &mut mpsc::UnboundedReceiver<MarketEvent>) -> TimeAndSale {
    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    let MarketEvent::TimeAndSale(tns) = event else {
        panic!("expected a TimeAndSale event");
    };
    tns
}

fn settings(address: String, symbols: &str) -> SessionSettings {
    SessionSettings {
        address,
        event_type: EventType::TimeAndSale,
        symbols: Symbol::parse_list(symbols).unwrap(),
    }
}

fn collector() -> (Arc<dyn EventListener>, mpsc::UnboundedReceiver<MarketEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = move |event: &MarketEvent| {
        let _ = tx.send(event.clone());
    };
    (Arc::new(listener) as Arc<dyn EventListener>, rx)
}

#[tokio::test]
async fn delivers_events_for_subscribed_symbols() {
    let (address, received) = start_server(feed_server).await;
    let session = ConsoleSession::new(connector(), settings(address, "ETH/USD:GDAX,BTC/USD:GDAX"));
    let (listener, mut events) = collector();

    let active = session.start(listener).await.unwrap();

    let mut symbols = Vec::new();
    for _ in 0..2 {
        let tns = next_print(&mut events).await;
        assert_eq!(tns.time, 1_705_312_800_123);
        assert_eq!(tns.price, 2_345.5);
        assert_eq!(tns.exchange_code, Some('Q'));
        assert!(tns.bid_price.is_nan());
        symbols.push(tns.event_symbol);
    }
    symbols.sort();
    assert_eq!(symbols, vec!["BTC/USD:GDAX", "ETH/USD:GDAX"]);

    active.close().await;

    let connections = received.lock();
    assert_eq!(connections.len(), 1);
    let requests = &connections[0];
    let types = message_types(requests);
    assert_eq!(
        &types[..3],
        &["SETUP", "CHANNEL_REQUEST", "FEED_SETUP"]
    );
    assert_eq!(types.iter().filter(|t| **t == "CHANNEL_REQUEST").count(), 1);
    assert_eq!(types.iter().filter(|t| **t == "FEED_SETUP").count(), 1);
    assert_eq!(types.iter().filter(|t| **t == "FEED_SUBSCRIPTION").count(), 2);

    let setup = requests.iter().find(|m| m["type"] == "FEED_SETUP").unwrap();
    assert_eq!(setup["acceptDataFormat"], "COMPACT");
    let request = requests.iter().find(|m| m["type"] == "CHANNEL_REQUEST").unwrap();
    assert_eq!(request["service"], "FEED");
    assert_ne!(request["channel"], 0);
}

#[tokio::test]
async fn refused_channel_exits_with_subscribe_code() {
    let (address, _) = start_server(refusing_server).await;
    let session = ConsoleSession::new(connector(), settings(address, "ETH/USD:GDAX"));
    let (listener, _events) = collector();

    let err = session.start(listener).await.err().unwrap();

    assert!(matches!(
        &err,
        SessionError::Subscribe {
            source: FeedError::Subscription(message),
            ..
        } if message.contains("UNSUPPORTED_PROTOCOL")
    ));
    assert_eq!(err.exit_code(), EXIT_SUBSCRIBE_FAILED);
}

#[tokio::test]
async fn unanswered_channel_times_out_and_is_cancelled() {
    let (address, received) = start_server(unanswering_server).await;
    let connector = DxLinkConnector::new(DxLinkConfig {
        request_timeout: Duration::from_millis(300),
        ..Default::default()
    });
    let session = ConsoleSession::new(connector, settings(address, "ETH/USD:GDAX"));
    let (listener, _events) = collector();

    let err = session.start(listener).await.err().unwrap();

    assert!(matches!(
        err,
        SessionError::Subscribe {
            source: FeedError::Timeout(_),
            ..
        }
    ));
    assert_eq!(err.exit_code(), EXIT_SUBSCRIBE_FAILED);

    let cancelled = |received: &Received| {
        received.lock()[0]
            .iter()
            .any(|msg| msg["type"] == "CHANNEL_CANCEL")
    };
    timeout(Duration::from_secs(5), async {
        while !cancelled(&received) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let connections = received.lock();
    let types = message_types(&connections[0]);
    assert_eq!(&types[..2], &["SETUP", "CHANNEL_REQUEST"]);
    let cancel = connections[0]
        .iter()
        .find(|msg| msg["type"] == "CHANNEL_CANCEL")
        .unwrap();
    assert_eq!(cancel["channel"], connections[0][1]["channel"]);
}

#[tokio::test]
async fn unreachable_feed_exits_with_connect_code() {
    // Bind then drop to get a port nobody listens on.
    let port = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let session = ConsoleSession::new(connector(), settings(format!("ws://127.0.0.1:{port}"), "SPY"));
    let (listener, _events) = collector();

    let err = session.start(listener).await.err().unwrap();

    assert!(matches!(err, SessionError::Connect { .. }));
    assert_eq!(err.exit_code(), EXIT_CONNECT_FAILED);
}

#[tokio::test]
async fn lost_connection_restores_channel_and_symbols() {
    let (address, received) = start_server(dropping_server).await;
    let connector = DxLinkConnector::new(DxLinkConfig {
        request_timeout: Duration::from_secs(5),
        reconnect: fast_reconnect(),
        ..Default::default()
    });
    let session = ConsoleSession::new(connector, settings(address, "ETH/USD:GDAX"));
    let (listener, mut events) = collector();

    let active = session.start(listener).await.unwrap();

    // Only the second connection answers the subscription.
    let tns = next_print(&mut events).await;
    assert_eq!(tns.event_symbol, "ETH/USD:GDAX");
    active.close().await;

    let connections = received.lock();
    assert!(connections.len() >= 2);
    assert_eq!(
        message_types(&connections[0]),
        vec!["SETUP", "CHANNEL_REQUEST", "FEED_SETUP", "FEED_SUBSCRIPTION"]
    );
    assert_eq!(
        message_types(&connections[1]),
        vec!["SETUP", "CHANNEL_REQUEST", "FEED_SETUP", "FEED_SUBSCRIPTION"]
    );
    assert_eq!(connections[1][1]["channel"], connections[0][1]["channel"]);
    let resubscribe = &connections[1][3];
    assert_eq!(resubscribe["reset"], true);
    assert_eq!(resubscribe["add"][0]["type"], "TimeAndSale");
    assert_eq!(resubscribe["add"][0]["symbol"], "ETH/USD:GDAX");
}

#[tokio::test]
async fn silent_server_triggers_keepalive_reconnect() {
    let (address, received) = start_server(silent_server).await;
    let connector = DxLinkConnector::new(DxLinkConfig {
        request_timeout: Duration::from_secs(5),
        keepalive: KeepaliveConfig::new(Duration::from_millis(100), Duration::from_millis(300)),
        reconnect: fast_reconnect(),
        ..Default::default()
    });
    let session = ConsoleSession::new(connector, settings(address, "ETH/USD:GDAX"));
    let (listener, mut events) = collector();

    let active = session.start(listener).await.unwrap();

    // One print per connection: the original and the restored one.
    assert_eq!(next_print(&mut events).await.event_symbol, "ETH/USD:GDAX");
    assert_eq!(next_print(&mut events).await.event_symbol, "ETH/USD:GDAX");
    active.close().await;

    let connections = received.lock();
    assert!(connections.len() >= 2);
    assert!(message_types(&connections[0]).contains(&"KEEPALIVE"));
    assert_eq!(
        &message_types(&connections[1])[..2],
        &["SETUP", "CHANNEL_REQUEST"]
    );
}

#[tokio::test]
async fn late_authorization_without_token_succeeds() {
    let (address, _) = start_server(late_authorizing_server).await;

    let connection = connector().connect(&address).await;

    assert!(connection.is_ok());
}

#[tokio::test]
async fn missing_token_fails_authentication() {
    let (address, _) = start_server(token_server).await;
    let connector = DxLinkConnector::new(DxLinkConfig {
        request_timeout: Duration::from_millis(500),
        ..Default::default()
    });

    let result = connector.connect(&address).await;

    assert!(matches!(result, Err(FeedError::Authentication(_))));
}
