//! Key exchange legs.
//!
//! Establishment is optimistic and one-directional. The initiator generates
//! a fresh session key, wraps it under the peer's public key, and starts
//! using it immediately; the responder unwraps and installs it on receipt,
//! unconditionally overwriting any prior key for that sender. Re-exchange is
//! always accepted, which allows recovery when a peer restarts and
//! regenerates identity keys, at the cost of no replay protection on the
//! exchange itself.
//!
//! If both sides initiate simultaneously, each holds whichever key was
//! installed last for the peer and the two directions of the conversation
//! may run under different keys. Each direction is independently
//! authenticated and confidential; no single shared key is negotiated.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::ProtocolError;
use crate::identity::{IdentityKeyPair, PeerPublicKey};
use crate::keystore::SessionKey;

/// Initiator leg: generate a fresh session key and wrap it for the peer.
///
/// Returns the key (to install and use locally at once) and the base64 of
/// the wrapped copy (to ship through the relay).
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedKey`] if the peer's public key cannot
/// be imported, or [`ProtocolError::EncryptionFailed`] if wrapping fails.
pub fn initiate(peer_public_pem: &str) -> Result<(SessionKey, String), ProtocolError> {
    let peer_key = PeerPublicKey::import(peer_public_pem)?;
    let session = SessionKey::generate();
    let wrapped = peer_key.wrap_session_key(&session)?;
    Ok((session, STANDARD.encode(wrapped)))
}

/// Responder leg: unwrap a received session key with our private key.
///
/// # Errors
///
/// Returns [`ProtocolError::UnwrapFailed`] if the payload is not valid
/// base64 or OAEP decryption fails.
pub fn accept(
    identity: &IdentityKeyPair,
    wrapped_b64: &str,
) -> Result<SessionKey, ProtocolError> {
    let wrapped = STANDARD
        .decode(wrapped_b64)
        .map_err(|_| ProtocolError::UnwrapFailed)?;
    identity.unwrap_session_key(&wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_accept_roundtrip() {
        let responder = IdentityKeyPair::generate().unwrap();
        let pem = responder.export_public_key().unwrap();

        let (initiator_key, wrapped) = initiate(&pem).unwrap();
        let responder_key = accept(&responder, &wrapped).unwrap();

        assert_eq!(initiator_key.as_bytes(), responder_key.as_bytes());
    }

    #[test]
    fn test_accept_rejects_bad_base64() {
        let identity = IdentityKeyPair::generate().unwrap();
        assert_eq!(
            accept(&identity, "not base64!!!"),
            Err(ProtocolError::UnwrapFailed)
        );
    }

    #[test]
    fn test_accept_with_wrong_identity_fails() {
        let intended = IdentityKeyPair::generate().unwrap();
        let other = IdentityKeyPair::generate().unwrap();

        let (_, wrapped) = initiate(&intended.export_public_key().unwrap()).unwrap();
        assert_eq!(accept(&other, &wrapped), Err(ProtocolError::UnwrapFailed));
    }
}
