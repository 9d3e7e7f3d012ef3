//! The high-level client.
//!
//! One [`Client`] is one registered participant. Construction performs
//! identity key generation and registration; afterwards the caller drives
//! the session by alternating [`Client::next_event`] (inbound) and
//! [`Client::send_to`] (outbound). Both run on the caller's task, which
//! is the single-threaded event queue the protocol assumes.

use tracing::{debug, info, warn};
use veilchat_core::{Envelope, PeerIdentity, RouterEvent, SessionContext};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::relay::RelayLink;

/// Something the session surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The presence list was replaced. Includes ourselves.
    PeerList(Vec<PeerIdentity>),
    /// A decrypted chat message.
    Message {
        /// Sender identity id.
        from: String,
        /// Decrypted plaintext.
        text: String,
        /// Sender-supplied RFC 3339 timestamp.
        timestamp: String,
    },
    /// A chat message arrived that could not be decrypted. Display as a
    /// distinct placeholder, never as partial plaintext. Not retried:
    /// the sender has no acknowledgment channel.
    DecryptFailed {
        /// Sender identity id.
        from: String,
    },
    /// A session key from this peer was installed.
    KeyInstalled {
        /// Sender identity id.
        from: String,
    },
    /// A key-exchange frame from this peer could not be unwrapped.
    ExchangeFailed {
        /// Sender identity id.
        from: String,
    },
}

/// A registered participant session.
///
/// Does not implement `Clone`. Dropping the client discards the WebSocket
/// and all session key material; there is no session resumption.
pub struct Client {
    context: SessionContext,
    link: RelayLink,
}

impl Client {
    /// Connect to the relay and register.
    ///
    /// This performs:
    /// 1. Identity key pair generation (fatal if the provider fails)
    /// 2. WebSocket connection to the relay
    /// 3. `register` announcement with our public key
    /// 4. Wait for the relay's `welcome`
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; nothing is retried.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        // Validate URL scheme
        if !config.insecure_dev && !config.relay_url.starts_with("wss://") {
            return Err(ClientError::ConnectionFailed(
                "wss:// required (use insecure_dev for local testing)".into(),
            ));
        }

        let context = SessionContext::new(&config.username)?;
        let link = RelayLink::connect(&config.relay_url).await?;

        let mut client = Self { context, link };
        let register = client.context.register_envelope()?;
        client.link.send(&register).await?;

        // Drive the router until registration is acknowledged. Frames that
        // arrive before `welcome` (e.g. an eager presence list) still land
        // in the context and surface through next_event() later.
        loop {
            let envelope = client.link.recv().await?;
            if client.context.handle_envelope(envelope) == RouterEvent::Connected {
                break;
            }
        }

        info!(
            id = %client.context.local_id(),
            username = %client.context.username(),
            "registered with relay"
        );
        Ok(client)
    }

    /// Wait for the next application-visible event.
    ///
    /// Cryptographic failures are logged here and returned as events, so
    /// the caller can render them; they never tear the connection down.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the relay connection is lost. That
    /// is terminal: drop the client and reconnect from scratch.
    pub async fn next_event(&mut self) -> Result<ClientEvent, ClientError> {
        loop {
            let envelope = self.link.recv().await?;
            match self.context.handle_envelope(envelope) {
                RouterEvent::Connected => continue, // duplicate welcome
                RouterEvent::Ignored => {
                    debug!("ignoring unroutable frame");
                    continue;
                }
                RouterEvent::PeersUpdated => {
                    return Ok(ClientEvent::PeerList(self.context.peers().to_vec()));
                }
                RouterEvent::KeyInstalled { from } => {
                    debug!(from = %from, "session key installed");
                    return Ok(ClientEvent::KeyInstalled { from });
                }
                RouterEvent::ExchangeFailed { from } => {
                    warn!(from = %from, "failed to unwrap incoming session key");
                    return Ok(ClientEvent::ExchangeFailed { from });
                }
                RouterEvent::Message {
                    from,
                    text,
                    timestamp,
                } => {
                    return Ok(ClientEvent::Message {
                        from,
                        text,
                        timestamp,
                    });
                }
                RouterEvent::DecryptFailed { from } => {
                    warn!(from = %from, "failed to decrypt incoming message");
                    return Ok(ClientEvent::DecryptFailed { from });
                }
            }
        }
    }

    /// Encrypt and send a chat message to a peer.
    ///
    /// On first contact this also generates, installs, and transmits the
    /// wrapped session key, optimistically, without waiting for the peer.
    ///
    /// # Errors
    ///
    /// Protocol errors ([`veilchat_core::ProtocolError::UnknownPeer`],
    /// [`veilchat_core::ProtocolError::MalformedKey`], cipher failures)
    /// leave the connection usable; transport errors are terminal.
    pub async fn send_to(&mut self, peer_id: &str, text: &str) -> Result<(), ClientError> {
        let envelopes = self.context.send_chat(peer_id, text)?;
        for envelope in &envelopes {
            if matches!(envelope, Envelope::KeyExchange { .. }) {
                debug!(to = %peer_id, "initiating session key exchange");
            }
            self.link.send(envelope).await?;
        }
        Ok(())
    }

    /// Our identity id.
    pub fn local_id(&self) -> &str {
        self.context.local_id()
    }

    /// Our display name.
    pub fn username(&self) -> &str {
        self.context.username()
    }

    /// The current presence list, in relay order. Includes ourselves.
    pub fn peers(&self) -> &[PeerIdentity] {
        self.context.peers()
    }

    /// True if a session key is established for this peer.
    pub fn has_session_key(&self, peer_id: &str) -> bool {
        self.context.has_session_key(peer_id)
    }

    /// Short fingerprint of our public key for display.
    pub fn fingerprint(&self) -> Option<String> {
        self.context.fingerprint()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("context", &self.context)
            .finish()
    }
}
