//! VeilChat Protocol Core
//!
//! Pairwise end-to-end encrypted messaging over an untrusted relay.
//!
//! This crate provides:
//! - Identity key management (RSA-2048, wrap-only)
//! - Per-peer session-key establishment via asymmetric wrapping
//! - Authenticated message encryption (AES-256-GCM)
//! - The JSON envelope model and the per-participant envelope router
//!
//! # Security Invariants
//!
//! - The identity private key never leaves [`identity::IdentityKeyPair`]
//! - A fresh random 96-bit nonce is drawn for every encryption
//! - Decryption failures are authenticated failures, never silent corruption
//! - Session keys are zeroized on drop; nothing is persisted
//! - Direct use of `unsafe` is forbidden (#![forbid(unsafe_code)])
//! - Malformed inbound envelopes are dropped, never processed partially

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod cipher;
pub mod context;
pub mod envelope;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod keystore;

pub use context::{RouterEvent, SessionContext};
pub use envelope::{Envelope, PeerIdentity};
pub use error::ProtocolError;
pub use identity::{IdentityKeyPair, PeerPublicKey};
pub use keystore::{SessionKey, SessionKeyStore};
