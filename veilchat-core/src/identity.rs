//! Identity key management.
//!
//! Every participant generates one RSA-2048 key pair at connect time and
//! holds it for the lifetime of the process session. The pair is used only
//! to wrap and unwrap 32-byte session keys (OAEP/SHA-256), never bulk data.
//!
//! # Security Properties
//!
//! - The private key is owned by [`IdentityKeyPair`] and is never exported
//! - Imported peer keys are wrap-only by construction ([`PeerPublicKey`]
//!   exposes no decryption capability)
//! - Key material is session-scoped: nothing is persisted

use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::ProtocolError;
use crate::keystore::SessionKey;

/// RSA modulus size in bits.
///
/// 2048 is the floor the protocol requires for wrapping session keys.
const RSA_BITS: usize = 2048;

const PEM_HEADER: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_FOOTER: &str = "-----END PUBLIC KEY-----";

/// A participant's asymmetric identity key pair.
///
/// Does not implement `Clone`: exactly one instance exists per session, and
/// the private half must not be duplicated.
pub struct IdentityKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl IdentityKeyPair {
    /// Generate a fresh RSA-2048 key pair from OS randomness.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CryptoUnavailable`] if key generation fails.
    /// This is fatal to the session.
    pub fn generate() -> Result<Self, ProtocolError> {
        let mut rng = rand::rngs::OsRng;
        let private =
            RsaPrivateKey::new(&mut rng, RSA_BITS).map_err(|_| ProtocolError::CryptoUnavailable)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Serialize the public half as PEM (SPKI DER, base64 wrapped at 64
    /// characters between BEGIN/END PUBLIC KEY markers).
    ///
    /// The output round-trips losslessly through [`PeerPublicKey::import`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CryptoUnavailable`] if DER encoding of our
    /// own key fails.
    pub fn export_public_key(&self) -> Result<String, ProtocolError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|_| ProtocolError::CryptoUnavailable)
    }

    /// Decrypt a wrapped session key with our private key and import it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnwrapFailed`] if OAEP decryption fails
    /// (wrong key or corrupted ciphertext) or if the recovered material is
    /// not a valid session key. OAEP fails authenticated; a garbage result
    /// is never returned as success.
    pub fn unwrap_session_key(&self, wrapped: &[u8]) -> Result<SessionKey, ProtocolError> {
        let raw = self
            .private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| ProtocolError::UnwrapFailed)?;
        SessionKey::from_bytes(&raw).map_err(|_| ProtocolError::UnwrapFailed)
    }

    /// Short fingerprint of our public key for display.
    ///
    /// First 8 bytes of SHA-256 over the SPKI DER, hex encoded.
    pub fn fingerprint(&self) -> Option<String> {
        fingerprint_of(&self.public)
    }
}

/// A peer's imported public key, restricted to session-key wrapping.
#[derive(Debug, Clone)]
pub struct PeerPublicKey(RsaPublicKey);

impl PeerPublicKey {
    /// Parse PEM text into a wrap-only public key.
    ///
    /// Strips the BEGIN/END markers and all whitespace, decodes the base64
    /// body, and parses the SPKI DER. Tolerant of line-wrapping differences
    /// between producers.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedKey`] on structurally invalid
    /// input.
    pub fn import(material: &str) -> Result<Self, ProtocolError> {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        use rsa::pkcs8::DecodePublicKey;

        let trimmed = material.trim();
        let body = trimmed
            .strip_prefix(PEM_HEADER)
            .and_then(|rest| rest.strip_suffix(PEM_FOOTER))
            .ok_or(ProtocolError::MalformedKey)?;
        let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        let der = STANDARD
            .decode(compact)
            .map_err(|_| ProtocolError::MalformedKey)?;
        let key =
            RsaPublicKey::from_public_key_der(&der).map_err(|_| ProtocolError::MalformedKey)?;
        Ok(Self(key))
    }

    /// Encrypt a session key's raw bytes under this public key (OAEP/SHA-256).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EncryptionFailed`] if the RSA operation
    /// fails.
    pub fn wrap_session_key(&self, key: &SessionKey) -> Result<Vec<u8>, ProtocolError> {
        let mut rng = rand::rngs::OsRng;
        self.0
            .encrypt(&mut rng, Oaep::new::<Sha256>(), key.as_bytes())
            .map_err(|_| ProtocolError::EncryptionFailed)
    }

    /// Short fingerprint of this key for display.
    pub fn fingerprint(&self) -> Option<String> {
        fingerprint_of(&self.0)
    }
}

fn fingerprint_of(key: &RsaPublicKey) -> Option<String> {
    let der = key.to_public_key_der().ok()?;
    let digest = Sha256::digest(der.as_bytes());
    Some(hex::encode(&digest[..8]))
}
