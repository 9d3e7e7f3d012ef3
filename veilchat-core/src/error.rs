//! Protocol errors.
//!
//! The severity split matters more than the variant count:
//! [`ProtocolError::CryptoUnavailable`] is fatal to the whole session, key
//! errors disable one peer, and decrypt errors are per-message. Nothing here
//! is retried automatically; the protocol has no acknowledgment layer.

use std::fmt;

/// All possible protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The cryptographic provider could not produce an identity key pair.
    /// Fatal: the session cannot be established.
    CryptoUnavailable,

    /// A peer's public key material is structurally invalid.
    /// Messaging to that peer is disabled; nothing else is affected.
    MalformedKey,

    /// A wrapped session key could not be decrypted with our private key.
    UnwrapFailed,

    /// Authenticated decryption failed (wrong key or tampered ciphertext;
    /// the primitive does not distinguish them).
    DecryptionFailed,

    /// Symmetric encryption failed.
    EncryptionFailed,

    /// Decrypted plaintext is not valid UTF-8.
    InvalidUtf8,

    /// Inbound frame could not be parsed as a known envelope.
    MalformedEnvelope,

    /// An envelope could not be serialized for transmission.
    EncodeFailed,

    /// The addressed peer is not in the current presence list.
    UnknownPeer,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Deliberately terse. Do not leak key or payload details.
        match self {
            Self::CryptoUnavailable => write!(f, "crypto provider unavailable"),
            Self::MalformedKey => write!(f, "malformed public key"),
            Self::UnwrapFailed => write!(f, "session key unwrap failed"),
            Self::DecryptionFailed => write!(f, "decryption failed"),
            Self::EncryptionFailed => write!(f, "encryption failed"),
            Self::InvalidUtf8 => write!(f, "invalid utf-8"),
            Self::MalformedEnvelope => write!(f, "malformed envelope"),
            Self::EncodeFailed => write!(f, "envelope encoding failed"),
            Self::UnknownPeer => write!(f, "unknown peer"),
        }
    }
}

impl std::error::Error for ProtocolError {}
