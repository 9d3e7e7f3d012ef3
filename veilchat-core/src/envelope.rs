//! The wire envelope.
//!
//! JSON text frames exchanged through the relay, tagged by `type`:
//!
//! | type          | fields                                          |
//! |---------------|-------------------------------------------------|
//! | `register`    | `from`, `content` (username), `publicKey` (PEM) |
//! | `welcome`     | —                                               |
//! | `userList`    | `users`: [{id, username, publicKey}]            |
//! | `keyExchange` | `from`, `to`, `content` (base64 wrapped key)    |
//! | `chat`        | `from`, `to`, `content`, `timestamp`            |
//!
//! Envelopes are immutable once constructed; the relay forwards directed
//! envelopes verbatim and never inspects `content`.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A participant as announced by the relay's presence broadcast.
///
/// Immutable once received; the whole peer set is replaced wholesale on
/// every `userList` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Opaque unique identity id.
    pub id: String,
    /// Display name, trusted as presented by the relay.
    pub username: String,
    /// Exported public key in PEM form.
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// The wire unit exchanged through the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Identity announcement, first frame a client sends.
    #[serde(rename = "register")]
    Register {
        /// Sender identity id.
        from: String,
        /// Username.
        content: String,
        /// Sender public key, PEM.
        #[serde(rename = "publicKey")]
        public_key: String,
    },

    /// Registration accepted.
    #[serde(rename = "welcome")]
    Welcome,

    /// Full presence snapshot; replaces any prior peer set.
    #[serde(rename = "userList")]
    UserList {
        /// All currently registered participants, including the recipient.
        users: Vec<PeerIdentity>,
    },

    /// Directed wrapped session key.
    #[serde(rename = "keyExchange")]
    KeyExchange {
        /// Sender identity id.
        from: String,
        /// Recipient identity id.
        to: String,
        /// Base64 of the wrapped symmetric key.
        content: String,
    },

    /// Directed encrypted chat message.
    #[serde(rename = "chat")]
    Chat {
        /// Sender identity id.
        from: String,
        /// Recipient identity id.
        to: String,
        /// Base64 nonce‖ciphertext‖tag.
        content: String,
        /// Sender-supplied RFC 3339 timestamp.
        timestamp: String,
    },
}

impl Envelope {
    /// Parse a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedEnvelope`] for unknown types or
    /// structurally invalid JSON. Callers drop such frames; they are never
    /// processed partially.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|_| ProtocolError::MalformedEnvelope)
    }

    /// Serialize to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EncodeFailed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|_| ProtocolError::EncodeFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names_match_wire_contract() {
        let env = Envelope::Register {
            from: "abc".into(),
            content: "alice".into(),
            public_key: "PEM".into(),
        };
        let json = env.to_json().unwrap();
        assert!(json.contains(r#""type":"register""#));
        assert!(json.contains(r#""publicKey":"PEM""#));

        let env = Envelope::KeyExchange {
            from: "a".into(),
            to: "b".into(),
            content: "AAAA".into(),
        };
        assert!(env.to_json().unwrap().contains(r#""type":"keyExchange""#));

        assert_eq!(Envelope::Welcome.to_json().unwrap(), r#"{"type":"welcome"}"#);
    }

    #[test]
    fn test_parse_roundtrip() {
        let env = Envelope::Chat {
            from: "a".into(),
            to: "b".into(),
            content: "blob".into(),
            timestamp: "2026-08-06T12:00:00.000Z".into(),
        };
        let parsed = Envelope::parse(&env.to_json().unwrap()).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn test_parse_user_list() {
        let json = r#"{"type":"userList","users":[
            {"id":"1","username":"alice","publicKey":"PEM-A"},
            {"id":"2","username":"bob","publicKey":"PEM-B"}
        ]}"#;
        match Envelope::parse(json).unwrap() {
            Envelope::UserList { users } => {
                assert_eq!(users.len(), 2);
                assert_eq!(users[0].username, "alice");
                assert_eq!(users[1].public_key, "PEM-B");
            }
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn test_welcome_tolerates_extra_fields() {
        let json = r#"{"type":"welcome","content":"Connected to server"}"#;
        assert_eq!(Envelope::parse(json).unwrap(), Envelope::Welcome);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert_eq!(
            Envelope::parse(r#"{"type":"broadcast","from":"x"}"#),
            Err(ProtocolError::MalformedEnvelope)
        );
        assert_eq!(
            Envelope::parse("not json"),
            Err(ProtocolError::MalformedEnvelope)
        );
        assert_eq!(
            Envelope::parse(r#"{"from":"x"}"#),
            Err(ProtocolError::MalformedEnvelope)
        );
    }

    #[test]
    fn test_missing_field_rejected() {
        // chat without timestamp
        assert_eq!(
            Envelope::parse(r#"{"type":"chat","from":"a","to":"b","content":"x"}"#),
            Err(ProtocolError::MalformedEnvelope)
        );
    }
}
