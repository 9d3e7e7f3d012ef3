//! VeilChat Client
//!
//! High-level async client for the VeilChat relay protocol.
//!
//! This crate wraps `veilchat-core` and provides a simple API: connect and
//! register, then alternate between [`Client::next_event`] and
//! [`Client::send_to`]. All protocol state lives in one
//! [`veilchat_core::SessionContext`] driven by a single logical event loop,
//! so no locking is needed.
//!
//! # Invariants
//!
//! - Strict 1:1 WebSocket text message to envelope mapping. No buffering.
//! - Connection loss is terminal: the context and every session key are
//!   discarded with the `Client`; reconnecting means registering again
//!   from scratch.
//! - Cryptographic failures never pass silently: they are logged and
//!   surfaced as distinct [`ClientEvent`] variants.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod client;
pub mod config;
pub mod error;
mod relay;

pub use client::{Client, ClientEvent};
pub use config::ClientConfig;
pub use error::ClientError;
