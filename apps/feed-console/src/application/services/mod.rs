//! Application Services
//!
//! `ConsoleSession` drives the feed ports through the sample's single
//! use case: connect, create one subscription, attach the listener and add
//! the configured symbols. Each failure point maps to its own process exit
//! code.

use std::sync::Arc;

use super::ports::{EventListener, FeedConnection, FeedConnector, FeedError, FeedSubscription};
use crate::domain::events::EventType;
use crate::domain::subscription::Symbol;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit code when the feed connection cannot be established.
pub const EXIT_CONNECT_FAILED: u8 = 1;

/// Exit code when the subscription cannot be created.
pub const EXIT_SUBSCRIBE_FAILED: u8 = 2;

/// Exit code when the configuration is invalid.
pub const EXIT_CONFIG_INVALID: u8 = 3;

/// Exit code when a symbol cannot be added to the subscription.
pub const EXIT_ADD_SYMBOL_FAILED: u8 = 4;

// =============================================================================
// Errors
// =============================================================================

/// Session setup failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Connecting to the feed failed.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// Feed address.
        address: String,
        /// Underlying feed error.
        #[source]
        source: FeedError,
    },

    /// Creating the subscription failed.
    #[error("failed to create {event_type} subscription: {source}")]
    Subscribe {
        /// Requested event type.
        event_type: EventType,
        /// Underlying feed error.
        #[source]
        source: FeedError,
    },

    /// Adding a symbol to the subscription failed.
    #[error("failed to add symbol {symbol}: {source}")]
    AddSymbol {
        /// Rejected symbol.
        symbol: Symbol,
        /// Underlying feed error.
        #[source]
        source: FeedError,
    },
}

impl SessionError {
    /// Process exit code for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Connect { .. } => EXIT_CONNECT_FAILED,
            Self::Subscribe { .. } => EXIT_SUBSCRIBE_FAILED,
            Self::AddSymbol { .. } => EXIT_ADD_SYMBOL_FAILED,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// What the session connects to and subscribes for.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Feed address.
    pub address: String,
    /// Event type to subscribe to.
    pub event_type: EventType,
    /// Symbols to add to the subscription.
    pub symbols: Vec<Symbol>,
}

/// Sets up the feed subscription for the console client.
pub struct ConsoleSession<C> {
    connector: C,
    settings: SessionSettings,
}

impl<C: FeedConnector> ConsoleSession<C> {
    /// Create a new session.
    #[must_use]
    pub const fn new(connector: C, settings: SessionSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// Session settings.
    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Connect, subscribe, attach `listener` and add every configured symbol.
    ///
    /// On failure any connection that was opened is closed again.
    pub async fn start(
        &self,
        listener: Arc<dyn EventListener>,
    ) -> Result<ActiveSession, SessionError> {
        let address = &self.settings.address;
        let event_type = self.settings.event_type;

        tracing::info!(%address, "Connecting to feed");
        let connection = self
            .connector
            .connect(address)
            .await
            .map_err(|source| SessionError::Connect {
                address: address.clone(),
                source,
            })?;

        let subscription = match connection.create_subscription(event_type).await {
            Ok(subscription) => subscription,
            Err(source) => {
                connection.close().await;
                return Err(SessionError::Subscribe { event_type, source });
            }
        };
        tracing::info!(%event_type, "Subscription created");

        subscription.attach_listener(listener);

        for symbol in &self.settings.symbols {
            if let Err(source) = subscription.add_symbol(symbol).await {
                connection.close().await;
                return Err(SessionError::AddSymbol {
                    symbol: symbol.clone(),
                    source,
                });
            }
            tracing::debug!(%symbol, "Symbol added");
        }

        tracing::info!(
            %event_type,
            symbols = self.settings.symbols.len(),
            "Session ready"
        );

        Ok(ActiveSession {
            connection,
            subscription,
        })
    }
}

/// A running session. Dropping it leaves the connection open; call `close`.
pub struct ActiveSession {
    connection: Arc<dyn FeedConnection>,
    subscription: Arc<dyn FeedSubscription>,
}

impl ActiveSession {
    /// The session's subscription.
    #[must_use]
    pub const fn subscription(&self) -> &Arc<dyn FeedSubscription> {
        &self.subscription
    }

    /// Close the feed connection.
    pub async fn close(self) {
        tracing::info!("Closing feed connection");
        self.connection.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        InMemoryFeed, MockFeedConnection, MockFeedConnector, MockFeedSubscription,
    };
    use crate::domain::events::{MarketEvent, TimeAndSale};

    fn settings(symbols: &[&str]) -> SessionSettings {
        SessionSettings {
            address: "wss://feed.test/dxlink-ws".to_string(),
            event_type: EventType::TimeAndSale,
            symbols: symbols.iter().map(|s| Symbol::new(s).unwrap()).collect(),
        }
    }

    fn noop_listener() -> Arc<dyn EventListener> {
        Arc::new(|_: &MarketEvent| {})
    }

    #[tokio::test]
    async fn connect_failure_exits_with_one() {
        let mut connector = MockFeedConnector::new();
        connector
            .expect_connect()
            .withf(|address| address.ends_with("feed.test/dxlink-ws"))
            .times(1)
            .returning(|_| Err(FeedError::Connection("refused".to_string())));

        let session = ConsoleSession::new(connector, settings(&["SPY"]));
        let err = session.start(noop_listener()).await.err().unwrap();

        assert!(matches!(err, SessionError::Connect { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn subscribe_failure_exits_with_two_and_closes() {
        let mut connection = MockFeedConnection::new();
        connection
            .expect_create_subscription()
            .times(1)
            .returning(|_| Err(FeedError::Subscription("denied".to_string())));
        connection.expect_close().times(1).returning(|| ());
        let connection: Arc<dyn FeedConnection> = Arc::new(connection);

        let mut connector = MockFeedConnector::new();
        connector
            .expect_connect()
            .return_once(move |_| Ok(connection));

        let session = ConsoleSession::new(connector, settings(&["SPY"]));
        let err = session.start(noop_listener()).await.err().unwrap();

        assert!(matches!(
            err,
            SessionError::Subscribe {
                event_type: EventType::TimeAndSale,
                ..
            }
        ));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn add_symbol_failure_exits_with_four() {
        let mut subscription = MockFeedSubscription::new();
        subscription.expect_attach_listener().times(1).returning(|_| ());
        subscription
            .expect_add_symbol()
            .returning(|_| Err(FeedError::Closed));
        let subscription: Arc<dyn FeedSubscription> = Arc::new(subscription);

        let mut connection = MockFeedConnection::new();
        connection
            .expect_create_subscription()
            .return_once(move |_| Ok(subscription));
        connection.expect_close().times(1).returning(|| ());
        let connection: Arc<dyn FeedConnection> = Arc::new(connection);

        let mut connector = MockFeedConnector::new();
        connector
            .expect_connect()
            .return_once(move |_| Ok(connection));

        let session = ConsoleSession::new(connector, settings(&["SPY"]));
        let err = session.start(noop_listener()).await.err().unwrap();
        assert_eq!(err.exit_code(), EXIT_ADD_SYMBOL_FAILED);
    }

    #[tokio::test]
    async fn start_subscribes_every_symbol() {
        let feed = InMemoryFeed::new();
        let session = ConsoleSession::new(feed.clone(), settings(&["SPY", "QQQ"]));

        let active = session.start(noop_listener()).await.unwrap();

        assert_eq!(
            feed.connected_addresses(),
            vec!["wss://feed.test/dxlink-ws".to_string()]
        );
        assert_eq!(
            feed.subscribed_symbols(EventType::TimeAndSale),
            vec![Symbol::new("SPY").unwrap(), Symbol::new("QQQ").unwrap()]
        );
        assert_eq!(active.subscription().event_type(), EventType::TimeAndSale);

        let delivered = feed.publish(&MarketEvent::TimeAndSale(TimeAndSale {
            event_symbol: "QQQ".to_string(),
            ..Default::default()
        }));
        assert_eq!(delivered, 1);

        active.close().await;
        assert!(feed.is_closed());
    }
}
