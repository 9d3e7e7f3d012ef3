//! Client errors.

use std::fmt;

use veilchat_core::ProtocolError;

/// Errors that can occur while connecting to or talking through a relay.
///
/// Transport-level errors are terminal: the client (and all session keys
/// inside it) must be dropped and a fresh registration performed.
#[derive(Debug)]
pub enum ClientError {
    /// Failed to establish the WebSocket connection.
    ConnectionFailed(String),
    /// Protocol-level error from veilchat-core.
    Protocol(ProtocolError),
    /// WebSocket error after connect.
    WebSocket(String),
    /// The relay closed the connection or the stream ended.
    Disconnected,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            Self::Protocol(e) => write!(f, "protocol error: {}", e),
            Self::WebSocket(msg) => write!(f, "websocket error: {}", msg),
            Self::Disconnected => write!(f, "disconnected from relay"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}
