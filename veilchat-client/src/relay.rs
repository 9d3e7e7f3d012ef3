//! WebSocket envelope pipe.
//!
//! Internal module for the relay connection.
//!
//! # Frame Handling Invariants
//!
//! - Strict 1:1 mapping: one WS text message = one envelope
//! - No buffering, no message combining/splitting
//! - Malformed frames are logged and dropped, never processed partially

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::warn;
use veilchat_core::Envelope;

use crate::error::ClientError;

/// Internal WebSocket envelope transport.
///
/// Does not implement `Clone` to prevent socket duplication.
pub(crate) struct RelayLink {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayLink {
    /// Open a WebSocket connection to the relay.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        Ok(Self { ws })
    }

    /// Send one envelope as one WS text message.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let text = envelope.to_json()?;
        self.ws
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| ClientError::WebSocket(e.to_string()))
    }

    /// Receive the next envelope.
    ///
    /// Skips non-text frames and drops malformed frames with a logged
    /// diagnostic. Returns [`ClientError::Disconnected`] when the relay
    /// closes the stream.
    pub async fn recv(&mut self) -> Result<Envelope, ClientError> {
        loop {
            match self.ws.next().await {
                Some(Ok(WsMessage::Text(text))) => match Envelope::parse(&text) {
                    Ok(envelope) => return Ok(envelope),
                    Err(e) => {
                        warn!(error = %e, "dropping malformed relay frame");
                        continue;
                    }
                },
                Some(Ok(WsMessage::Close(_))) => return Err(ClientError::Disconnected),
                Some(Ok(_)) => continue, // Ignore Binary, Ping, Pong
                Some(Err(e)) => return Err(ClientError::WebSocket(e.to_string())),
                None => return Err(ClientError::Disconnected),
            }
        }
    }
}

impl std::fmt::Debug for RelayLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayLink").finish()
    }
}
