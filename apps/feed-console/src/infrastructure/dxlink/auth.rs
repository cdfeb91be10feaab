//! dxLink Authorization
//!
//! Tracks the connection's authorization state during the handshake.
//!
//! # Authorization Flow
//!
//! 1. Client sends `SETUP`
//! 2. Server replies with `SETUP` and `AUTH_STATE`
//! 3. On `UNAUTHORIZED` the client sends `AUTH` with its token, if it has
//!    one, and otherwise keeps waiting
//! 4. Server reports `AUTH_STATE` `AUTHORIZED`, or `UNAUTHORIZED` again if
//!    the token was rejected
//!
//! Servers start out `UNAUTHORIZED` and public demo endpoints follow up
//! with `AUTHORIZED` without any `AUTH`.

use thiserror::Error;

use super::messages::{AuthStatus, ClientMessage};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authorization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The server requires a token and none is configured.
    #[error("server requires an access token")]
    TokenRequired,

    /// The server rejected the configured token.
    #[error("access token rejected")]
    TokenRejected,

    /// The server reported an error before authorizing.
    #[error("server error ({error}): {message}")]
    ServerError {
        /// Error code from server
        error: String,
        /// Error message from server
        message: String,
    },
}

impl AuthError {
    /// Map an `ERROR` message received during the handshake.
    #[must_use]
    pub fn from_server(error: &str, message: &str) -> Self {
        if error == "UNAUTHORIZED" {
            Self::TokenRejected
        } else {
            Self::ServerError {
                error: error.to_string(),
                message: message.to_string(),
            }
        }
    }
}

// =============================================================================
// Access Token
// =============================================================================

/// dxLink access token. `Debug` redacts the value.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a token. Blank input yields `None`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// Token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

// =============================================================================
// Authorization State
// =============================================================================

/// Current state of authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// `SETUP` sent, no `AUTH_STATE` received yet.
    #[default]
    Connected,

    /// Token sent, awaiting response.
    Authenticating,

    /// Authorized to open channels.
    Authorized,

    /// Authorization failed.
    Failed,
}

impl AuthState {
    /// Check if currently authorized.
    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized)
    }
}

/// What the handshake should do after an `AUTH_STATE` message.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthAction {
    /// Send this message and keep waiting.
    Send(ClientMessage),
    /// Nothing to send; keep waiting.
    Wait,
    /// Handshake complete.
    Authorized,
}

/// Handles the authorization state machine of a dxLink connection.
#[derive(Debug)]
pub struct AuthHandler {
    token: Option<AccessToken>,
    state: AuthState,
    unauthorized_seen: bool,
}

impl AuthHandler {
    /// Create a handler, optionally holding a token.
    #[must_use]
    pub const fn new(token: Option<AccessToken>) -> Self {
        Self {
            token,
            state: AuthState::Connected,
            unauthorized_seen: false,
        }
    }

    /// Get the current authorization state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Process an `AUTH_STATE` message.
    ///
    /// # Errors
    ///
    /// Returns `TokenRejected` when the server stays unauthorized after the
    /// token was sent.
    pub fn on_auth_state(&mut self, status: AuthStatus) -> Result<AuthAction, AuthError> {
        match (status, self.state) {
            (AuthStatus::Authorized, _) => {
                self.state = AuthState::Authorized;
                Ok(AuthAction::Authorized)
            }
            (AuthStatus::Unauthorized, AuthState::Connected) => match &self.token {
                Some(token) => {
                    self.state = AuthState::Authenticating;
                    Ok(AuthAction::Send(ClientMessage::auth(token.expose())))
                }
                None => {
                    self.unauthorized_seen = true;
                    Ok(AuthAction::Wait)
                }
            },
            (AuthStatus::Unauthorized, _) => {
                self.state = AuthState::Failed;
                Err(AuthError::TokenRejected)
            }
        }
    }

    /// Process an `ERROR` message received before authorization.
    pub fn on_error(&mut self, error: &str, message: &str) -> AuthError {
        self.state = AuthState::Failed;
        match AuthError::from_server(error, message) {
            AuthError::TokenRejected if self.token.is_none() => AuthError::TokenRequired,
            other => other,
        }
    }

    /// Error for a handshake that ran out of time.
    ///
    /// `TokenRequired` when the server reported `UNAUTHORIZED` and there was
    /// no token to send, `None` otherwise.
    pub fn on_timeout(&mut self) -> Option<AuthError> {
        if self.state.is_authorized() || !self.unauthorized_seen {
            return None;
        }
        self.state = AuthState::Failed;
        Some(AuthError::TokenRequired)
    }
}
