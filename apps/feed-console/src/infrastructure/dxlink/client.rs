//! dxLink WebSocket Client
//!
//! Implements the feed ports over dxLink. One connection task per
//! WebSocket owns the socket: it writes queued client messages, answers
//! keepalives, opens feed channels and hands decoded events to the
//! listeners of each channel.
//!
//! # Connection Lifecycle
//!
//! 1. Connect and send `SETUP`
//! 2. Wait for `AUTH_STATE` `AUTHORIZED`, sending `AUTH` when required
//! 3. Per subscription: `CHANNEL_REQUEST`, then `FEED_SETUP` once the
//!    channel is opened, then `FEED_SUBSCRIPTION` per added symbol
//! 4. On connection loss: back off, reconnect, reopen every channel and
//!    resubscribe its symbols
//!
//! # Endpoint
//!
//! - Demo: `wss://demo.dxfeed.com/dxlink-ws`

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::auth::{AccessToken, AuthAction, AuthError, AuthHandler};
use super::codec::{CodecError, DxLinkCodec, FieldLayout};
use super::keepalive::{KeepaliveConfig, KeepaliveEvent, KeepaliveManager, KeepaliveState};
use super::messages::{AuthStatus, CONTROL_CHANNEL, ClientMessage, ServerMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{
    EventListener, FeedConnection, FeedConnector, FeedError, FeedSubscription,
};
use crate::domain::events::EventType;
use crate::domain::subscription::{SubscriptionState, Symbol};
use crate::infrastructure::console::TextConverter;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const COMMAND_BUFFER: usize = 256;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the dxLink client.
#[derive(Debug, thiserror::Error)]
pub enum DxLinkError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Authorization failed.
    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A step did not complete within the request timeout.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// The server stopped sending keepalives.
    #[error("keepalive timeout")]
    KeepaliveTimeout,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl From<DxLinkError> for FeedError {
    fn from(err: DxLinkError) -> Self {
        match err {
            DxLinkError::Auth(e) => Self::Authentication(e.to_string()),
            DxLinkError::Timeout(step) => Self::Timeout(step.to_string()),
            DxLinkError::ConnectionClosed => Self::Closed,
            other => Self::Connection(other.to_string()),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for dxLink connections.
#[derive(Debug, Clone)]
pub struct DxLinkConfig {
    /// Access token, sent when the server asks for authorization.
    pub token: Option<AccessToken>,
    /// Keepalive configuration.
    pub keepalive: KeepaliveConfig,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Timeout for the handshake and for opening a channel.
    pub request_timeout: Duration,
    /// Aggregation period requested in `FEED_SETUP`, in seconds.
    pub aggregation_period: f64,
}

impl Default for DxLinkConfig {
    fn default() -> Self {
        Self {
            token: None,
            keepalive: KeepaliveConfig::default(),
            reconnect: ReconnectConfig::default(),
            request_timeout: Duration::from_secs(10),
            aggregation_period: 0.1,
        }
    }
}

/// WebSocket URL for a feed address. Addresses without a scheme use `wss://`.
#[must_use]
pub fn endpoint_url(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        address.to_string()
    } else {
        format!("wss://{address}")
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Opens dxLink connections.
#[derive(Debug, Clone, Default)]
pub struct DxLinkConnector {
    config: DxLinkConfig,
}

impl DxLinkConnector {
    /// Create a connector using `config` for every connection.
    #[must_use]
    pub const fn new(config: DxLinkConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FeedConnector for DxLinkConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn FeedConnection>, FeedError> {
        let connection = DxLinkConnection::open(address, self.config.clone())
            .await
            .map_err(|e| {
                tracing::error!(%address, error = %e, "dxLink connection failed");
                FeedError::from(e)
            })?;
        Ok(Arc::new(connection) as Arc<dyn FeedConnection>)
    }
}

// =============================================================================
// Shared Channel State
// =============================================================================

type OpenedTx = oneshot::Sender<Result<(), FeedError>>;

/// One feed channel as seen by the client.
struct Channel {
    subscription: SubscriptionState,
    fields: FieldLayout,
    listeners: Vec<Arc<dyn EventListener>>,
    opened: Option<OpenedTx>,
}

impl Channel {
    fn new(event_type: EventType, opened: OpenedTx) -> Self {
        Self {
            subscription: SubscriptionState::new(event_type),
            fields: FieldLayout::new(),
            listeners: Vec::new(),
            opened: Some(opened),
        }
    }
}

struct Shared {
    config: DxLinkConfig,
    codec: DxLinkCodec,
    channels: RwLock<BTreeMap<u64, Channel>>,
}

impl Shared {
    /// Clear the field layouts of opened channels and return their ids.
    fn take_restorable(&self) -> Vec<u64> {
        self.channels
            .write()
            .iter_mut()
            .filter(|(_, channel)| channel.opened.is_none())
            .map(|(&id, channel)| {
                channel.fields.clear();
                id
            })
            .collect()
    }

    /// Fail and forget every channel still waiting for `CHANNEL_OPENED`.
    fn fail_pending(&self, err: &FeedError) {
        self.channels.write().retain(|_, channel| {
            channel.opened.take().is_none_or(|tx| {
                let _ = tx.send(Err(err.clone()));
                false
            })
        });
    }
}

// =============================================================================
// Connection
// =============================================================================

/// An authorized dxLink connection.
pub struct DxLinkConnection {
    url: String,
    shared: Arc<Shared>,
    commands: mpsc::Sender<ClientMessage>,
    next_channel: AtomicU64,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DxLinkConnection {
    /// Connect to `address`, complete the handshake and start the
    /// connection task.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket cannot be opened or the server
    /// does not authorize the connection within the request timeout.
    pub async fn open(address: &str, config: DxLinkConfig) -> Result<Self, DxLinkError> {
        let url = endpoint_url(address);
        let codec = DxLinkCodec::new(TextConverter::new());
        let ws = establish(&url, &config, &codec).await?;

        let shared = Arc::new(Shared {
            config,
            codec,
            channels: RwLock::new(BTreeMap::new()),
        });
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel = CancellationToken::new();

        let task = ConnectionTask {
            url: url.clone(),
            shared: Arc::clone(&shared),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run(ws, command_rx));

        Ok(Self {
            url,
            shared,
            commands,
            next_channel: AtomicU64::new(CONTROL_CHANNEL + 1),
            cancel,
            task: Mutex::new(Some(handle)),
        })
    }

    /// WebSocket URL of this connection.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, msg: ClientMessage) -> Result<(), FeedError> {
        self.commands.send(msg).await.map_err(|_| FeedError::Closed)
    }
}

impl Drop for DxLinkConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl FeedConnection for DxLinkConnection {
    async fn create_subscription(
        &self,
        event_type: EventType,
    ) -> Result<Arc<dyn FeedSubscription>, FeedError> {
        if self.cancel.is_cancelled() {
            return Err(FeedError::Closed);
        }

        let channel = self.next_channel.fetch_add(1, Ordering::Relaxed);
        let (opened_tx, opened_rx) = oneshot::channel();
        self.shared
            .channels
            .write()
            .insert(channel, Channel::new(event_type, opened_tx));
        tracing::debug!(channel, %event_type, "Requesting feed channel");

        self.send(ClientMessage::channel_request(channel)).await?;
        let opened = match tokio::time::timeout(self.shared.config.request_timeout, opened_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FeedError::Closed),
            Err(_) => {
                if let Err(e) = self.commands.try_send(ClientMessage::channel_cancel(channel)) {
                    tracing::debug!(channel, error = %e, "Dropping channel cancel");
                }
                Err(FeedError::Timeout(format!("opening {event_type} channel")))
            }
        };
        if let Err(e) = opened {
            self.shared.channels.write().remove(&channel);
            return Err(e);
        }

        tracing::info!(channel, %event_type, "Feed channel opened");
        Ok(Arc::new(DxLinkSubscription {
            channel,
            event_type,
            shared: Arc::clone(&self.shared),
            commands: self.commands.clone(),
        }) as Arc<dyn FeedSubscription>)
    }

    async fn close(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        let Some(handle) = handle else {
            return;
        };
        if tokio::time::timeout(CLOSE_TIMEOUT, handle).await.is_err() {
            tracing::warn!(url = %self.url, "dxLink connection task did not stop in time");
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

struct DxLinkSubscription {
    channel: u64,
    event_type: EventType,
    shared: Arc<Shared>,
    commands: mpsc::Sender<ClientMessage>,
}

#[async_trait]
impl FeedSubscription for DxLinkSubscription {
    fn event_type(&self) -> EventType {
        self.event_type
    }

    fn attach_listener(&self, listener: Arc<dyn EventListener>) {
        match self.shared.channels.write().get_mut(&self.channel) {
            Some(channel) => channel.listeners.push(listener),
            None => tracing::warn!(channel = self.channel, "Listener attached to closed channel"),
        }
    }

    async fn add_symbol(&self, symbol: &Symbol) -> Result<(), FeedError> {
        let added = {
            let mut channels = self.shared.channels.write();
            let channel = channels.get_mut(&self.channel).ok_or(FeedError::Closed)?;
            channel.subscription.add(symbol)
        };
        if !added {
            return Ok(());
        }

        let msg = ClientMessage::subscribe(
            self.channel,
            self.event_type,
            std::slice::from_ref(symbol),
            false,
        );
        self.commands.send(msg).await.map_err(|_| FeedError::Closed)
    }
}

// =============================================================================
// Handshake
// =============================================================================

async fn send<S>(sink: &mut S, codec: &DxLinkCodec, msg: &ClientMessage) -> Result<(), DxLinkError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let json = codec.encode(msg)?;
    tracing::trace!(%json, "Sending dxLink message");
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Open the WebSocket and authorize within the request timeout.
async fn establish(
    url: &str,
    config: &DxLinkConfig,
    codec: &DxLinkCodec,
) -> Result<WsStream, DxLinkError> {
    tracing::info!(%url, "Connecting to dxLink");

    let mut auth = AuthHandler::new(config.token.clone());
    let handshake = async {
        let (mut ws, _response) = tokio_tungstenite::connect_async(url).await?;
        authorize(&mut ws, &mut auth, config, codec).await?;
        Ok::<_, DxLinkError>(ws)
    };
    let outcome = tokio::time::timeout(config.request_timeout, handshake).await;
    match outcome {
        Ok(result) => result,
        Err(_) => Err(auth
            .on_timeout()
            .map_or(DxLinkError::Timeout("handshake"), DxLinkError::Auth)),
    }
}

async fn authorize(
    ws: &mut WsStream,
    auth: &mut AuthHandler,
    config: &DxLinkConfig,
    codec: &DxLinkCodec,
) -> Result<(), DxLinkError> {
    let timeout = config.keepalive.timeout_secs();
    send(ws, codec, &ClientMessage::setup(timeout, timeout)).await?;

    while let Some(frame) = ws.next().await {
        let msg = match frame? {
            Message::Text(text) => codec.decode(&text)?,
            Message::Binary(bytes) => codec.decode_binary(&bytes)?,
            Message::Ping(data) => {
                ws.send(Message::Pong(data)).await?;
                continue;
            }
            Message::Close(_) => return Err(DxLinkError::ConnectionClosed),
            _ => continue,
        };

        match msg {
            ServerMessage::Setup { version, .. } => {
                tracing::debug!(%version, "Server setup received");
            }
            ServerMessage::AuthState { state, .. } => match auth.on_auth_state(state)? {
                AuthAction::Send(reply) => send(ws, codec, &reply).await?,
                AuthAction::Wait => tracing::debug!("Waiting for authorization"),
                AuthAction::Authorized => {
                    tracing::info!("dxLink connection authorized");
                    return Ok(());
                }
            },
            ServerMessage::Error { error, message, .. } => {
                return Err(auth.on_error(&error, &message).into());
            }
            other => tracing::trace!(?other, "Ignoring message before authorization"),
        }
    }

    Err(DxLinkError::ConnectionClosed)
}

// =============================================================================
// Connection Task
// =============================================================================

struct ConnectionTask {
    url: String,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl ConnectionTask {
    /// Serve connections until closed or reconnection is exhausted.
    async fn run(self, ws: WsStream, mut commands: mpsc::Receiver<ClientMessage>) {
        let mut policy = ReconnectPolicy::new(self.shared.config.reconnect.clone());
        let mut ws = ws;
        let mut reconnected = false;

        loop {
            match self.serve(ws, &mut commands, reconnected).await {
                Ok(()) => {
                    tracing::info!(url = %self.url, "dxLink connection closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "dxLink connection lost");
                    self.shared
                        .fail_pending(&FeedError::Connection(e.to_string()));

                    match self.reconnect(&mut policy).await {
                        Some(next) => {
                            ws = next;
                            reconnected = true;
                        }
                        None => break,
                    }
                }
            }
        }

        self.shared.fail_pending(&FeedError::Closed);
    }

    async fn reconnect(&self, policy: &mut ReconnectPolicy) -> Option<WsStream> {
        loop {
            let Some(delay) = policy.next_delay() else {
                tracing::error!(
                    attempts = policy.attempt_count(),
                    "Maximum reconnection attempts exceeded"
                );
                return None;
            };
            tracing::info!(
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to dxLink"
            );

            tokio::select! {
                () = self.cancel.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }

            let attempt = tokio::select! {
                () = self.cancel.cancelled() => return None,
                result = establish(&self.url, &self.shared.config, &self.shared.codec) => result,
            };
            match attempt {
                Ok(ws) => {
                    policy.reset();
                    return Some(ws);
                }
                Err(e) => tracing::warn!(error = %e, "Reconnect attempt failed"),
            }
        }
    }

    /// Run one authorized WebSocket until cancelled or broken.
    ///
    /// Known channels are requested again when `reconnected`; on the first
    /// connection each subscription requests its own channel.
    ///
    /// Returns `Ok` on a requested shutdown and `Err` when the connection
    /// was lost.
    async fn serve(
        &self,
        ws: WsStream,
        commands: &mut mpsc::Receiver<ClientMessage>,
        reconnected: bool,
    ) -> Result<(), DxLinkError> {
        let codec = &self.shared.codec;
        let (mut write, mut read) = ws.split();
        if reconnected {
            self.restore(&mut write).await?;
        }

        let keepalive_state = Arc::new(KeepaliveState::new());
        let (keepalive_tx, mut keepalive_rx) = mpsc::channel(4);
        let keepalive_cancel = self.cancel.child_token();
        let _keepalive_guard = keepalive_cancel.clone().drop_guard();
        tokio::spawn(
            KeepaliveManager::new(
                self.shared.config.keepalive.clone(),
                Arc::clone(&keepalive_state),
                keepalive_tx,
                keepalive_cancel,
            )
            .run(),
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    // flush what was queued before the close, e.g. CHANNEL_CANCEL
                    while let Ok(msg) = commands.try_recv() {
                        if send(&mut write, codec, &msg).await.is_err() {
                            break;
                        }
                    }
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                command = commands.recv() => {
                    let Some(msg) = command else {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    };
                    send(&mut write, codec, &msg).await?;
                }
                Some(event) = keepalive_rx.recv() => match event {
                    KeepaliveEvent::SendKeepalive => {
                        send(&mut write, codec, &ClientMessage::keepalive()).await?;
                    }
                    KeepaliveEvent::Timeout => return Err(DxLinkError::KeepaliveTimeout),
                },
                frame = read.next() => {
                    keepalive_state.record_activity();
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.handle(codec.decode(&text), &mut write).await?;
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            self.handle(codec.decode_binary(&bytes), &mut write).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Server sent close frame");
                            return Err(DxLinkError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(DxLinkError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// Request every opened channel again after a reconnect.
    ///
    /// Channels still waiting to open have their request queued as a
    /// command and are skipped.
    async fn restore(&self, write: &mut WsSink) -> Result<(), DxLinkError> {
        let channels = self.shared.take_restorable();

        for channel in channels {
            tracing::info!(channel, "Restoring feed channel");
            send(write, &self.shared.codec, &ClientMessage::channel_request(channel)).await?;
        }
        Ok(())
    }

    async fn handle(
        &self,
        decoded: Result<ServerMessage, CodecError>,
        write: &mut WsSink,
    ) -> Result<(), DxLinkError> {
        let msg = match decoded {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable dxLink frame");
                return Ok(());
            }
        };

        match msg {
            ServerMessage::AuthState {
                state: AuthStatus::Unauthorized,
                ..
            } => return Err(AuthError::TokenRejected.into()),
            ServerMessage::Error {
                channel,
                error,
                message,
            } => self.on_error(channel, &error, &message),
            ServerMessage::ChannelOpened { channel, .. } => {
                self.on_channel_opened(channel, write).await?;
            }
            ServerMessage::ChannelClosed { channel } => self.on_channel_closed(channel),
            ServerMessage::FeedConfig {
                channel,
                data_format,
                event_fields,
                ..
            } => self.on_feed_config(channel, &data_format, event_fields),
            ServerMessage::FeedData { channel, data } => self.on_feed_data(channel, &data),
            other => tracing::trace!(?other, "Ignoring dxLink message"),
        }
        Ok(())
    }

    async fn on_channel_opened(&self, channel: u64, write: &mut WsSink) -> Result<(), DxLinkError> {
        let prepared = {
            let mut channels = self.shared.channels.write();
            channels.get_mut(&channel).map(|state| {
                let event_type = state.subscription.event_type();
                let mut replies = vec![ClientMessage::feed_setup(
                    channel,
                    event_type,
                    self.shared.config.aggregation_period,
                )];
                if !state.subscription.is_empty() {
                    replies.push(ClientMessage::subscribe(
                        channel,
                        event_type,
                        state.subscription.symbols(),
                        true,
                    ));
                }
                (replies, state.opened.take())
            })
        };

        let Some((replies, opened)) = prepared else {
            tracing::warn!(channel, "Cancelling unknown channel");
            return send(write, &self.shared.codec, &ClientMessage::channel_cancel(channel)).await;
        };

        for reply in &replies {
            send(write, &self.shared.codec, reply).await?;
        }
        if let Some(tx) = opened {
            let _ = tx.send(Ok(()));
        }
        Ok(())
    }

    fn on_channel_closed(&self, channel: u64) {
        let removed = self.shared.channels.write().remove(&channel);
        match removed.and_then(|mut state| state.opened.take()) {
            Some(tx) => {
                let _ = tx.send(Err(FeedError::Subscription(
                    "channel closed by server".to_string(),
                )));
            }
            None => tracing::warn!(channel, "Feed channel closed by server"),
        }
    }

    fn on_error(&self, channel: u64, error: &str, message: &str) {
        if channel != CONTROL_CHANNEL {
            let pending = {
                let mut channels = self.shared.channels.write();
                let opened = channels
                    .get_mut(&channel)
                    .and_then(|state| state.opened.take());
                if opened.is_some() {
                    channels.remove(&channel);
                }
                opened
            };
            if let Some(tx) = pending {
                let _ = tx.send(Err(FeedError::Subscription(format!("{error}: {message}"))));
                return;
            }
        }

        tracing::error!(channel, %error, %message, "dxLink error");
    }

    fn on_feed_config(&self, channel: u64, data_format: &str, event_fields: Option<FieldLayout>) {
        if let Some(state) = self.shared.channels.write().get_mut(&channel) {
            if let Some(fields) = event_fields {
                state.fields.extend(fields);
            }
            tracing::debug!(channel, %data_format, "Feed configuration received");
        }
    }

    fn on_feed_data(&self, channel: u64, data: &Value) {
        let decoded = {
            let channels = self.shared.channels.read();
            channels.get(&channel).map(|state| {
                (
                    self.shared.codec.decode_feed_data(data, &state.fields),
                    state.listeners.clone(),
                )
            })
        };

        match decoded {
            Some((Ok(events), listeners)) => {
                for event in &events {
                    for listener in &listeners {
                        listener.on_event(event);
                    }
                }
            }
            Some((Err(e), _)) => tracing::warn!(channel, error = %e, "Dropping feed data"),
            None => tracing::trace!(channel, "Feed data for unknown channel"),
        }
    }
}
