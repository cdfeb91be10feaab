//! Port Interfaces
//!
//! Defines the interfaces (ports) for the market data feed following
//! the Hexagonal Architecture pattern. Infrastructure adapters implement
//! these; the session service only talks to the traits.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedConnector`: Establish a connection to a feed address
//! - `FeedConnection`: Create subscriptions on an open connection
//! - `FeedSubscription`: Attach listeners and add symbols
//!
//! ## Driver Ports (Inbound)
//!
//! - `EventListener`: Callback invoked for every received event

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::domain::events::{EventType, MarketEvent};
use crate::domain::subscription::{SubscriptionState, Symbol};

// =============================================================================
// Errors
// =============================================================================

/// Errors reported by feed adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The connection could not be established or was lost.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The feed rejected our credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The feed refused or failed to open a subscription.
    #[error("subscription failed: {0}")]
    Subscription(String),

    /// A request did not complete in time.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The connection has been closed.
    #[error("connection closed")]
    Closed,
}

// =============================================================================
// Listener
// =============================================================================

/// Receives every event delivered on a subscription.
///
/// Listeners are invoked from the adapter's connection task and must not
/// block for long.
pub trait EventListener: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &MarketEvent);
}

impl<F> EventListener for F
where
    F: Fn(&MarketEvent) + Send + Sync,
{
    fn on_event(&self, event: &MarketEvent) {
        self(event);
    }
}

// =============================================================================
// Feed Ports
// =============================================================================

/// Opens connections to a feed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Connect to the feed at `address`.
    async fn connect(&self, address: &str) -> Result<Arc<dyn FeedConnection>, FeedError>;
}

/// An open feed connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedConnection: Send + Sync {
    /// Create a subscription for one event type.
    async fn create_subscription(
        &self,
        event_type: EventType,
    ) -> Result<Arc<dyn FeedSubscription>, FeedError>;

    /// Close the connection. Subscriptions stop delivering events.
    async fn close(&self);
}

/// A subscription for one event type on a connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedSubscription: Send + Sync {
    /// Event type this subscription delivers.
    fn event_type(&self) -> EventType;

    /// Attach a listener invoked for every event of this subscription.
    fn attach_listener(&self, listener: Arc<dyn EventListener>);

    /// Add a symbol to the subscription.
    async fn add_symbol(&self, symbol: &Symbol) -> Result<(), FeedError>;
}

// =============================================================================
// In-Memory Feed
// =============================================================================

#[derive(Default)]
struct InMemoryState {
    fail_connect: AtomicBool,
    fail_subscribe: AtomicBool,
    closed: AtomicBool,
    addresses: Mutex<Vec<String>>,
    subscriptions: RwLock<Vec<Arc<InMemorySubscription>>>,
}

/// In-memory feed for tests and offline runs.
///
/// Records connection addresses and subscribed symbols, and delivers
/// published events to the listeners of matching subscriptions.
#[derive(Clone, Default)]
pub struct InMemoryFeed {
    state: Arc<InMemoryState>,
}

impl InMemoryFeed {
    /// Create a new in-memory feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `connect` calls fail.
    pub fn fail_connect(&self) {
        self.state.fail_connect.store(true, Ordering::SeqCst);
    }

    /// Make subsequent `create_subscription` calls fail.
    pub fn fail_subscribe(&self) {
        self.state.fail_subscribe.store(true, Ordering::SeqCst);
    }

    /// Addresses passed to `connect`, in call order.
    #[must_use]
    pub fn connected_addresses(&self) -> Vec<String> {
        self.state.addresses.lock().clone()
    }

    /// Symbols subscribed for an event type across all subscriptions.
    #[must_use]
    pub fn subscribed_symbols(&self, event_type: EventType) -> Vec<Symbol> {
        self.state
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.event_type() == event_type)
            .flat_map(|s| s.symbols.lock().symbols().to_vec())
            .collect()
    }

    /// Whether the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Deliver an event to every listener subscribed to its type and symbol.
    ///
    /// Returns the number of listeners invoked.
    pub fn publish(&self, event: &MarketEvent) -> usize {
        if self.is_closed() {
            return 0;
        }

        let subscriptions = self.state.subscriptions.read().clone();
        let mut delivered = 0;
        for subscription in subscriptions {
            if subscription.event_type() != event.event_type()
                || !subscription.symbols.lock().contains(event.symbol())
            {
                continue;
            }

            let listeners = subscription.listeners.read().clone();
            for listener in listeners {
                listener.on_event(event);
                delivered += 1;
            }
        }
        delivered
    }
}

#[async_trait]
impl FeedConnector for InMemoryFeed {
    async fn connect(&self, address: &str) -> Result<Arc<dyn FeedConnection>, FeedError> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(FeedError::Connection(format!("cannot reach {address}")));
        }

        self.state.addresses.lock().push(address.to_string());
        self.state.closed.store(false, Ordering::SeqCst);
        Ok(Arc::new(self.clone()) as Arc<dyn FeedConnection>)
    }
}

#[async_trait]
impl FeedConnection for InMemoryFeed {
    async fn create_subscription(
        &self,
        event_type: EventType,
    ) -> Result<Arc<dyn FeedSubscription>, FeedError> {
        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(FeedError::Subscription(format!(
                "{event_type} subscriptions are not available"
            )));
        }
        if self.is_closed() {
            return Err(FeedError::Closed);
        }

        let subscription = Arc::new(InMemorySubscription::new(event_type));
        self.state
            .subscriptions
            .write()
            .push(Arc::clone(&subscription));
        Ok(subscription as Arc<dyn FeedSubscription>)
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

struct InMemorySubscription {
    symbols: Mutex<SubscriptionState>,
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl InMemorySubscription {
    fn new(event_type: EventType) -> Self {
        Self {
            symbols: Mutex::new(SubscriptionState::new(event_type)),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FeedSubscription for InMemorySubscription {
    fn event_type(&self) -> EventType {
        self.symbols.lock().event_type()
    }

    fn attach_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().push(listener);
    }

    async fn add_symbol(&self, symbol: &Symbol) -> Result<(), FeedError> {
        self.symbols.lock().add(symbol);
        Ok(())
    }
}
