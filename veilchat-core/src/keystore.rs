//! Per-peer session keys and their store.
//!
//! A session key is a 32-byte AES-256 key bound to exactly one peer id.
//! Keys are created lazily (initiator path) or on receipt of a key-exchange
//! envelope (responder path), live only in memory, and are never rotated
//! automatically. The store holds at most one key per peer; the last
//! successful installation wins.

use std::collections::HashMap;

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ProtocolError;
use crate::exchange;

/// Size of a session key in bytes (AES-256).
pub const SESSION_KEY_LEN: usize = 32;

/// A symmetric session key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("SessionKey(..)")
    }
}

impl SessionKey {
    /// Generate a fresh random key from OS randomness.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Import raw key material.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnwrapFailed`] if the material is not
    /// exactly 32 bytes.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ProtocolError> {
        let bytes: [u8; SESSION_KEY_LEN] =
            raw.try_into().map_err(|_| ProtocolError::UnwrapFailed)?;
        Ok(Self(bytes))
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

/// Outcome of [`SessionKeyStore::ensure`].
#[derive(Debug)]
pub enum EnsureOutcome {
    /// A key for this peer already existed.
    Existing(SessionKey),
    /// A fresh key was generated and installed; the wrapped copy must be
    /// transmitted to the peer.
    Initiated {
        /// The newly installed session key.
        key: SessionKey,
        /// Base64 of the key wrapped under the peer's public key.
        wrapped: String,
    },
}

impl EnsureOutcome {
    /// The session key, however it was obtained.
    pub fn key(&self) -> &SessionKey {
        match self {
            Self::Existing(key) => key,
            Self::Initiated { key, .. } => key,
        }
    }
}

/// Mapping from peer id to established session key.
///
/// Mutated only by the key-exchange paths; read by the message cipher.
#[derive(Debug, Default)]
pub struct SessionKeyStore {
    keys: HashMap<String, SessionKey>,
}

impl SessionKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the key for a peer. No side effects.
    pub fn get(&self, peer_id: &str) -> Option<&SessionKey> {
        self.keys.get(peer_id)
    }

    /// Install a key for a peer. Idempotent upsert; last write wins.
    pub fn install(&mut self, peer_id: impl Into<String>, key: SessionKey) {
        self.keys.insert(peer_id.into(), key);
    }

    /// Return the existing key for a peer, or run the initiator leg of the
    /// key exchange: generate a fresh key, wrap it under the peer's public
    /// key, install it locally, and hand back the wrapped copy for
    /// transmission.
    ///
    /// Establishment is optimistic and one-directional: the returned key is
    /// authoritative immediately, without waiting for the peer. A message
    /// encrypted before the peer installs the wrapped copy will arrive
    /// undecryptable there; the protocol has no acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedKey`] if the peer's public key
    /// cannot be imported; the store is left unchanged.
    pub fn ensure(
        &mut self,
        peer_id: &str,
        peer_public_pem: &str,
    ) -> Result<EnsureOutcome, ProtocolError> {
        if let Some(key) = self.keys.get(peer_id) {
            return Ok(EnsureOutcome::Existing(key.clone()));
        }
        let (key, wrapped) = exchange::initiate(peer_public_pem)?;
        self.keys.insert(peer_id.to_string(), key.clone());
        Ok(EnsureOutcome::Initiated { key, wrapped })
    }

    /// Number of peers with an established key.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if no keys are established.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKeyPair;

    #[test]
    fn test_generated_keys_are_unique() {
        let a = SessionKey::generate();
        let b = SessionKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        assert!(SessionKey::from_bytes(&[0u8; 16]).is_err());
        assert!(SessionKey::from_bytes(&[0u8; 33]).is_err());
        assert!(SessionKey::from_bytes(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_install_last_write_wins() {
        let mut store = SessionKeyStore::new();
        let first = SessionKey::generate();
        let second = SessionKey::generate();

        store.install("peer", first);
        store.install("peer", second.clone());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("peer"), Some(&second));
    }

    #[test]
    fn test_ensure_initiates_once_then_reuses() {
        let peer = IdentityKeyPair::generate().unwrap();
        let pem = peer.export_public_key().unwrap();

        let mut store = SessionKeyStore::new();
        let first = match store.ensure("peer", &pem).unwrap() {
            EnsureOutcome::Initiated { key, wrapped } => {
                assert!(!wrapped.is_empty());
                key
            }
            EnsureOutcome::Existing(_) => panic!("expected fresh initiation"),
        };

        match store.ensure("peer", &pem).unwrap() {
            EnsureOutcome::Existing(key) => assert_eq!(key, first),
            EnsureOutcome::Initiated { .. } => panic!("expected existing key"),
        }
    }

    #[test]
    fn test_ensure_malformed_peer_key_leaves_store_unchanged() {
        let mut store = SessionKeyStore::new();
        assert_eq!(
            store.ensure("peer", "garbage").unwrap_err(),
            ProtocolError::MalformedKey
        );
        assert!(store.is_empty());
    }
}
