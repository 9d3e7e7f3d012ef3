//! Per-participant session state and envelope routing.
//!
//! [`SessionContext`] owns everything a connected participant holds: the
//! identity key pair, the current peer set, and the session key store. It is
//! created when a connection starts and dropped (discarding all key
//! material) when the connection ends. There is no session resumption.
//!
//! All mutation happens through two entry points driven by one logical
//! thread: [`SessionContext::handle_envelope`] for inbound frames and
//! [`SessionContext::send_chat`] for local user action. Handlers are atomic;
//! no envelope is ever processed partially.

use chrono::{SecondsFormat, Utc};
use rand::RngCore;

use crate::cipher;
use crate::envelope::{Envelope, PeerIdentity};
use crate::error::ProtocolError;
use crate::exchange;
use crate::identity::IdentityKeyPair;
use crate::keystore::{EnsureOutcome, SessionKeyStore};

/// Length of the random local identity id in bytes (hex encoded on the wire).
const LOCAL_ID_LEN: usize = 16;

/// What the router decided about an inbound envelope.
///
/// Decrypt and unwrap failures are surfaced as events rather than errors:
/// they are per-message conditions the user must see (a placeholder, not
/// corrupted text), and the sender has no acknowledgment channel to know a
/// retry is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// Registration acknowledged; the session is live.
    Connected,
    /// The peer set was replaced by a fresh presence snapshot.
    PeersUpdated,
    /// A session key from this peer was unwrapped and installed.
    KeyInstalled {
        /// Sender identity id.
        from: String,
    },
    /// A key-exchange frame from this peer could not be unwrapped.
    ExchangeFailed {
        /// Sender identity id.
        from: String,
    },
    /// A chat message decrypted successfully.
    Message {
        /// Sender identity id.
        from: String,
        /// Decrypted plaintext.
        text: String,
        /// Sender-supplied timestamp, passed through untouched.
        timestamp: String,
    },
    /// A chat message could not be decrypted (no session key for the
    /// sender, wrong key, or tampered ciphertext). Must be shown to the
    /// user as a distinct state, never as partial plaintext.
    DecryptFailed {
        /// Sender identity id.
        from: String,
    },
    /// Frame was valid but not addressed to this handler; dropped.
    Ignored,
}

/// All session state owned by one connected participant.
pub struct SessionContext {
    identity: IdentityKeyPair,
    local_id: String,
    username: String,
    peers: Vec<PeerIdentity>,
    keys: SessionKeyStore,
    connected: bool,
}

impl SessionContext {
    /// Create a fresh context: generate the identity key pair and a random
    /// local id.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CryptoUnavailable`] if identity key
    /// generation fails. Fatal: the connection attempt must be aborted.
    pub fn new(username: impl Into<String>) -> Result<Self, ProtocolError> {
        let identity = IdentityKeyPair::generate()?;
        let mut id_bytes = [0u8; LOCAL_ID_LEN];
        rand::rngs::OsRng.fill_bytes(&mut id_bytes);

        Ok(Self {
            identity,
            local_id: hex::encode(id_bytes),
            username: username.into(),
            peers: Vec::new(),
            keys: SessionKeyStore::new(),
            connected: false,
        })
    }

    /// Our identity id.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Our display name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// True once the relay has acknowledged registration.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The current peer set, in relay order. Includes ourselves.
    pub fn peers(&self) -> &[PeerIdentity] {
        &self.peers
    }

    /// Look up one peer by id.
    pub fn peer(&self, peer_id: &str) -> Option<&PeerIdentity> {
        self.peers.iter().find(|p| p.id == peer_id)
    }

    /// True if a session key is established for this peer.
    pub fn has_session_key(&self, peer_id: &str) -> bool {
        self.keys.get(peer_id).is_some()
    }

    /// Short fingerprint of our public key for display.
    pub fn fingerprint(&self) -> Option<String> {
        self.identity.fingerprint()
    }

    /// Build the registration envelope announcing our identity.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CryptoUnavailable`] if the public key
    /// cannot be exported.
    pub fn register_envelope(&self) -> Result<Envelope, ProtocolError> {
        Ok(Envelope::Register {
            from: self.local_id.clone(),
            content: self.username.clone(),
            public_key: self.identity.export_public_key()?,
        })
    }

    /// Encrypt a chat message to a peer, establishing a session key first
    /// if none exists.
    ///
    /// Returns the envelopes to transmit in order: a `keyExchange` frame
    /// when a key was freshly initiated, then the `chat` frame. The new key
    /// is authoritative immediately; we do not wait for the peer to
    /// install it, so the first message can race the exchange (see the
    /// module docs of [`crate::exchange`]).
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnknownPeer`] if the peer is not in the presence
    /// list, [`ProtocolError::MalformedKey`] if its public key cannot be
    /// imported (messaging to that peer stays disabled), or a cipher error.
    pub fn send_chat(
        &mut self,
        peer_id: &str,
        text: &str,
    ) -> Result<Vec<Envelope>, ProtocolError> {
        let peer = self.peer(peer_id).ok_or(ProtocolError::UnknownPeer)?;
        let peer_public = peer.public_key.clone();

        let mut out = Vec::with_capacity(2);
        let outcome = self.keys.ensure(peer_id, &peer_public)?;
        if let EnsureOutcome::Initiated { ref wrapped, .. } = outcome {
            out.push(Envelope::KeyExchange {
                from: self.local_id.clone(),
                to: peer_id.to_string(),
                content: wrapped.clone(),
            });
        }

        let content = cipher::encrypt(text, outcome.key())?;
        out.push(Envelope::Chat {
            from: self.local_id.clone(),
            to: peer_id.to_string(),
            content,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        Ok(out)
    }

    /// Route one inbound envelope to the appropriate handler.
    ///
    /// Never fails: anything unroutable is reported as
    /// [`RouterEvent::Ignored`] and per-message crypto failures come back
    /// as their own event variants, so a hostile frame can never take the
    /// connection down.
    pub fn handle_envelope(&mut self, envelope: Envelope) -> RouterEvent {
        match envelope {
            Envelope::Welcome => {
                self.connected = true;
                RouterEvent::Connected
            }

            Envelope::UserList { users } => {
                // Wholesale replacement; no incremental patching.
                self.peers = users;
                RouterEvent::PeersUpdated
            }

            Envelope::KeyExchange { from, content, .. } => {
                match exchange::accept(&self.identity, &content) {
                    Ok(key) => {
                        // Unconditional overwrite: re-exchange is always
                        // accepted so a restarted peer can re-establish.
                        self.keys.install(&from, key);
                        RouterEvent::KeyInstalled { from }
                    }
                    Err(_) => RouterEvent::ExchangeFailed { from },
                }
            }

            Envelope::Chat {
                from,
                content,
                timestamp,
                ..
            } => match self.keys.get(&from) {
                Some(key) => match cipher::decrypt(&content, key) {
                    Ok(text) => RouterEvent::Message {
                        from,
                        text,
                        timestamp,
                    },
                    Err(_) => RouterEvent::DecryptFailed { from },
                },
                None => RouterEvent::DecryptFailed { from },
            },

            // Clients never receive registration frames.
            Envelope::Register { .. } => RouterEvent::Ignored,
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("local_id", &self.local_id)
            .field("username", &self.username)
            .field("peers", &self.peers.len())
            .field("session_keys", &self.keys.len())
            .field("connected", &self.connected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_of(ctx: &SessionContext) -> PeerIdentity {
        PeerIdentity {
            id: ctx.local_id().to_string(),
            username: ctx.username().to_string(),
            public_key: ctx.register_envelope().and_then(|e| match e {
                Envelope::Register { public_key, .. } => Ok(public_key),
                _ => Err(ProtocolError::EncodeFailed),
            }).unwrap(),
        }
    }

    /// Wire both contexts with a presence list containing each other.
    fn introduce(a: &mut SessionContext, b: &mut SessionContext) {
        let users = vec![identity_of(a), identity_of(b)];
        assert_eq!(
            a.handle_envelope(Envelope::UserList { users: users.clone() }),
            RouterEvent::PeersUpdated
        );
        assert_eq!(
            b.handle_envelope(Envelope::UserList { users }),
            RouterEvent::PeersUpdated
        );
    }

    #[test]
    fn test_welcome_marks_connected() {
        let mut ctx = SessionContext::new("alice").unwrap();
        assert!(!ctx.is_connected());
        assert_eq!(ctx.handle_envelope(Envelope::Welcome), RouterEvent::Connected);
        assert!(ctx.is_connected());
    }

    #[test]
    fn test_user_list_replaces_wholesale() {
        let mut ctx = SessionContext::new("alice").unwrap();
        let bob = PeerIdentity {
            id: "b".into(),
            username: "bob".into(),
            public_key: "PEM".into(),
        };
        ctx.handle_envelope(Envelope::UserList { users: vec![bob] });
        assert!(ctx.peer("b").is_some());

        ctx.handle_envelope(Envelope::UserList { users: vec![] });
        assert!(ctx.peer("b").is_none());
    }

    #[test]
    fn test_full_exchange_scenario() {
        // A registers, receives presence containing B, selects B, sends
        // "hello"; B installs the key and decrypts exactly "hello".
        let mut alice = SessionContext::new("alice").unwrap();
        let mut bob = SessionContext::new("bob").unwrap();
        introduce(&mut alice, &mut bob);

        let envelopes = alice.send_chat(bob.local_id(), "hello").unwrap();
        assert_eq!(envelopes.len(), 2, "fresh peer: keyExchange then chat");

        match &envelopes[0] {
            Envelope::KeyExchange { from, to, .. } => {
                assert_eq!(from, alice.local_id());
                assert_eq!(to, bob.local_id());
            }
            other => panic!("expected keyExchange first, got {:?}", other),
        }

        let alice_id = alice.local_id().to_string();
        assert_eq!(
            bob.handle_envelope(envelopes[0].clone()),
            RouterEvent::KeyInstalled { from: alice_id.clone() }
        );
        match bob.handle_envelope(envelopes[1].clone()) {
            RouterEvent::Message { from, text, .. } => {
                assert_eq!(from, alice_id);
                assert_eq!(text, "hello");
            }
            other => panic!("expected decrypted message, got {:?}", other),
        }

        // Second message reuses the established key: chat frame only.
        let again = alice.send_chat(bob.local_id(), "again").unwrap();
        assert_eq!(again.len(), 1);
        match bob.handle_envelope(again[0].clone()) {
            RouterEvent::Message { text, .. } => assert_eq!(text, "again"),
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_dropped_key_exchange_surfaces_decrypt_failure() {
        // The keyExchange frame is lost in transit; the chat frame that
        // follows must fail visibly at B, not silently.
        let mut alice = SessionContext::new("alice").unwrap();
        let mut bob = SessionContext::new("bob").unwrap();
        introduce(&mut alice, &mut bob);

        let envelopes = alice.send_chat(bob.local_id(), "hello?").unwrap();
        // envelopes[0] (keyExchange) is dropped.
        assert_eq!(
            bob.handle_envelope(envelopes[1].clone()),
            RouterEvent::DecryptFailed {
                from: alice.local_id().to_string()
            }
        );
    }

    #[test]
    fn test_reexchange_overwrites_stale_key() {
        // A restarts and re-initiates under the same id: B must accept the
        // new exchange, and the stale key must stop working.
        let mut alice = SessionContext::new("alice").unwrap();
        let mut bob = SessionContext::new("bob").unwrap();
        introduce(&mut alice, &mut bob);
        let alice_id = alice.local_id().to_string();

        let first = alice.send_chat(bob.local_id(), "one").unwrap();
        bob.handle_envelope(first[0].clone());

        // Fresh exchange from the same sender id (restarted Alice).
        let bob_pem = identity_of(&bob).public_key;
        let (new_key, wrapped) = crate::exchange::initiate(&bob_pem).unwrap();
        match bob.handle_envelope(Envelope::KeyExchange {
            from: alice_id.clone(),
            to: bob.local_id().to_string(),
            content: wrapped,
        }) {
            RouterEvent::KeyInstalled { .. } => {}
            other => panic!("re-exchange must be accepted, got {:?}", other),
        }

        // Messages under the new key decrypt.
        let content = cipher::encrypt("two", &new_key).unwrap();
        match bob.handle_envelope(Envelope::Chat {
            from: alice_id.clone(),
            to: bob.local_id().to_string(),
            content,
            timestamp: "2026-08-06T12:00:00.000Z".into(),
        }) {
            RouterEvent::Message { text, .. } => assert_eq!(text, "two"),
            other => panic!("expected message, got {:?}", other),
        }

        // The pre-restart key was overwritten: old-Alice's traffic now
        // fails to decrypt.
        let stale = alice.send_chat(bob.local_id(), "stale").unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(
            bob.handle_envelope(stale[0].clone()),
            RouterEvent::DecryptFailed { from: alice_id }
        );
    }

    #[test]
    fn test_send_to_unknown_peer() {
        let mut ctx = SessionContext::new("alice").unwrap();
        assert_eq!(
            ctx.send_chat("nobody", "hi").unwrap_err(),
            ProtocolError::UnknownPeer
        );
    }

    #[test]
    fn test_send_to_peer_with_malformed_key() {
        let mut ctx = SessionContext::new("alice").unwrap();
        ctx.handle_envelope(Envelope::UserList {
            users: vec![PeerIdentity {
                id: "m".into(),
                username: "mallory".into(),
                public_key: "not a key".into(),
            }],
        });
        // Messaging to that peer is disabled; every attempt fails cleanly.
        assert_eq!(
            ctx.send_chat("m", "hi").unwrap_err(),
            ProtocolError::MalformedKey
        );
        assert!(!ctx.has_session_key("m"));
        assert_eq!(
            ctx.send_chat("m", "hi again").unwrap_err(),
            ProtocolError::MalformedKey
        );
    }

    #[test]
    fn test_garbled_exchange_reported_not_fatal() {
        let mut bob = SessionContext::new("bob").unwrap();
        let event = bob.handle_envelope(Envelope::KeyExchange {
            from: "a".into(),
            to: bob.local_id().to_string(),
            content: "AAAA".into(),
        });
        assert_eq!(event, RouterEvent::ExchangeFailed { from: "a".into() });
        assert!(!bob.has_session_key("a"));
    }

    #[test]
    fn test_register_frame_ignored_client_side() {
        let mut ctx = SessionContext::new("alice").unwrap();
        let event = ctx.handle_envelope(Envelope::Register {
            from: "x".into(),
            content: "eve".into(),
            public_key: "PEM".into(),
        });
        assert_eq!(event, RouterEvent::Ignored);
    }
}
