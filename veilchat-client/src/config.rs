//! Client configuration.

/// Configuration for connecting to a relay.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay URL (e.g., "wss://relay:8080" or "ws://localhost:8080").
    pub relay_url: String,
    /// Display name announced at registration. Trusted as presented;
    /// the protocol performs no identity verification.
    pub username: String,
    /// Allow insecure ws:// connections (for localhost development only).
    pub insecure_dev: bool,
}

impl ClientConfig {
    /// Create a configuration with the default (secure) transport policy.
    pub fn new(relay_url: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            username: username.into(),
            insecure_dev: false,
        }
    }

    /// Allow insecure ws:// connections (for localhost development only).
    ///
    /// # Security Warning
    ///
    /// This disables transport encryption between client and relay. The
    /// chat payloads stay end-to-end encrypted either way, but presence
    /// metadata becomes visible on the wire. Only use for local testing.
    pub fn with_insecure_dev(mut self) -> Self {
        self.insecure_dev = true;
        self
    }
}
