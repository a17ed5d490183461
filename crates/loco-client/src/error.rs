//! Client-side error taxonomy.
//!
//! Every fallible operation on the facade, session, and entity layers
//! returns [`ClientError`]. Variants are grouped by origin: authentication,
//! session lifecycle, transport, and entity-state violations.

use thiserror::Error;

use loco_core::{ChannelId, CodecError, UserId};

use crate::network::connection::ConnectionError;

/// Unified error type for the client.
#[derive(Debug, Error)]
pub enum ClientError {
    // ── Authentication ────────────────────────────────────────────────────
    /// The credential service rejected the login form.
    #[error("login failed with service status {status}")]
    LoginFailed { status: i32 },

    /// The settings fetch after a successful credential exchange failed.
    #[error("settings fetch failed with service status {status}")]
    SettingsFetchFailed { status: i32 },

    /// A second login was attempted while a session is already established.
    #[error("already logged on")]
    AlreadyLoggedOn,

    /// `relogin` was called before any login ever succeeded.
    #[error("no prior successful login to replay")]
    NoPriorLogin,

    // ── Session ───────────────────────────────────────────────────────────
    /// The handshake response did not arrive within the configured window.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The chat server rejected the handshake.
    #[error("handshake rejected with server status {status}")]
    LoginRejected { status: i32 },

    /// A request failed with a non-zero server status.
    #[error("{method} request failed with server status {status}")]
    RequestFailed { method: String, status: i32 },

    /// The connection dropped while a request was outstanding, or a write
    /// could not be completed.
    #[error("connection lost")]
    ConnectionLost,

    /// An operation that needs a live connection was called without one.
    #[error("not connected")]
    NotConnected,

    // ── Entity state ──────────────────────────────────────────────────────
    /// The server delivered data that contradicts client-held state, e.g. a
    /// chat routed to a channel object with a different id.
    #[error("protocol invariant violated: {0}")]
    ProtocolInvariantViolation(String),

    /// A membership operation referenced a user the channel does not hold.
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// A join was applied for a user already present in the channel.
    #[error("user {0} already joined")]
    DuplicateJoin(UserId),

    /// A remote-membership operation was applied to the client's own user.
    #[error("operation not applicable to the client's own user")]
    ForbiddenOperation,

    /// A push or request referenced a channel the store does not hold.
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    // ── Transport ─────────────────────────────────────────────────────────
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
