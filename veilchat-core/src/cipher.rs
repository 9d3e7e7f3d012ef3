//! Authenticated message encryption.
//!
//! AES-256-GCM under an established session key. Every call to [`encrypt`]
//! draws a fresh random 96-bit nonce; nonce reuse under the same key is a
//! confidentiality and integrity violation and must never occur. The wire
//! form is base64(nonce ‖ ciphertext‖tag) with no further framing.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;

use crate::error::ProtocolError;
use crate::keystore::SessionKey;

/// GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypt a plaintext message under a session key.
///
/// # Errors
///
/// Returns [`ProtocolError::EncryptionFailed`] if the AEAD operation fails.
pub fn encrypt(plaintext: &str, key: &SessionKey) -> Result<String, ProtocolError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| ProtocolError::EncryptionFailed)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

/// Decrypt a base64 nonce‖ciphertext‖tag blob under a session key.
///
/// # Errors
///
/// Returns [`ProtocolError::DecryptionFailed`] if the blob is malformed or
/// the authentication tag does not verify (wrong key and tampering are
/// indistinguishable), and [`ProtocolError::InvalidUtf8`] if the verified
/// plaintext is not UTF-8. Partially decrypted output is never returned.
pub fn decrypt(blob_b64: &str, key: &SessionKey) -> Result<String, ProtocolError> {
    let blob = STANDARD
        .decode(blob_b64)
        .map_err(|_| ProtocolError::DecryptionFailed)?;

    // Leading nonce, then at least one tag's worth of ciphertext.
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(ProtocolError::DecryptionFailed);
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| ProtocolError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| ProtocolError::InvalidUtf8)
}
