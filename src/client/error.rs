// ABOUTME: Session error taxonomy covering the handshake, framing, transcoding and transport
// ABOUTME: Distinguishes connection-fatal failures from recoverable per-message errors

use crate::codec::FrameError;
use crate::transcode::{DecodeError, EncodeError};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Error type for every box-connection session operation.
///
/// Fatal variants end the connection and are followed by exactly one
/// `on_connection_closed` callback; the per-message variants
/// ([`Decode`](SessionError::Decode), [`Encode`](SessionError::Encode))
/// surface through `on_exception_caught` and leave the session running.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport-level connect failure.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// The connect phase outlived the configured bound.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The connection closed before the identify write was delivered.
    #[error("handshake failed, connection closed prematurely: {0}")]
    HandshakeFailed(#[source] io::Error),

    /// Corrupt or hostile length prefix; fatal to the connection.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// One inbound message could not be decoded; the session stays up.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// One outbound message has no wire representation; the session stays up.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// A write made no progress within the configured bound.
    #[error("write stalled for more than {0:?}")]
    WriteTimeout(Duration),

    /// Transport error while the session was established.
    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    /// The engine already has a session that has not yet closed.
    #[error("an earlier session is still active")]
    SessionActive,

    /// The session was already torn down when the operation was submitted.
    #[error("session is closed")]
    Closed,
}

impl SessionError {
    /// Whether this error must tear the connection down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::Decode(_) | SessionError::Encode(_))
    }
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
