//! dxLink Feed Adapter
//!
//! Implements the feed ports over dxFeed's dxLink WebSocket protocol:
//!
//! - **Handshake**: `SETUP` plus optional token authorization
//! - **Channels**: one `FEED` channel per subscription, compact data format
//! - **Resilience**: keepalives and reconnection with backoff

pub mod auth;
pub mod client;
pub mod codec;
pub mod keepalive;
pub mod messages;
pub mod reconnect;

pub use auth::{AccessToken, AuthAction, AuthError, AuthHandler, AuthState};
pub use client::{DxLinkConfig, DxLinkConnection, DxLinkConnector, DxLinkError, endpoint_url};
pub use codec::{CodecError, DxLinkCodec, FieldLayout};
pub use keepalive::{KeepaliveConfig, KeepaliveEvent, KeepaliveManager, KeepaliveState};
pub use messages::{AuthStatus, ClientMessage, ServerMessage, SubscriptionEntry, event_fields};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
