//! Bridge envelope framing.
//!
//! The bridge only routes [`SocketMessage`]s by topic. It sees the topic and
//! the message type, never the plaintext: a publish carries a JSON-serialized
//! [`EncryptionPayload`] as its `payload` string.
//!
//! ```text
//! {"topic":"<topic>","type":"pub","payload":"{\"data\":..,\"hmac\":..,\"iv\":..}"}
//! {"topic":"<topic>","type":"sub","payload":""}
//! ```

use serde::{Deserialize, Serialize};

use crate::crypto::{self, EncryptionPayload, SessionKey};
use crate::error::{Result, TunnelError};

/// Envelope type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Publish to a topic.
    Pub,
    /// Subscribe to a topic.
    Sub,
}

/// Outer envelope exchanged with the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketMessage {
    /// Routing topic.
    pub topic: String,
    /// Publish or subscribe.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Serialized [`EncryptionPayload`], or empty.
    #[serde(default)]
    pub payload: String,
}

impl SocketMessage {
    /// Serializes the envelope for the transport.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| TunnelError::Format(format!("marshal socketMessage error: {e}")))
    }

    /// Parses an envelope received from the transport.
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).map_err(|e| {
            TunnelError::Format(format!(
                "unmarshal socketMessage error: {e}: {}",
                String::from_utf8_lossy(raw)
            ))
        })
    }

    /// Parses the encrypted payload this envelope carries.
    pub fn encryption_payload(&self) -> Result<EncryptionPayload> {
        serde_json::from_str(&self.payload).map_err(|e| {
            TunnelError::Format(format!(
                "unmarshal encryptionPayload error: {e}: {}",
                self.payload
            ))
        })
    }
}

/// Builds a publish envelope, encrypting `payload` unless it is empty.
pub fn frame_publish(topic: &str, payload: &[u8], key: &SessionKey) -> Result<SocketMessage> {
    let payload = if payload.is_empty() {
        String::new()
    } else {
        let sealed = crypto::encrypt(payload, key)?;
        serde_json::to_string(&sealed)
            .map_err(|e| TunnelError::Format(format!("marshal encryptionPayload error: {e}")))?
    };

    Ok(SocketMessage {
        topic: topic.to_string(),
        message_type: MessageType::Pub,
        payload,
    })
}

/// Builds a subscribe envelope.
pub fn frame_subscribe(topic: &str) -> SocketMessage {
    SocketMessage {
        topic: topic.to_string(),
        message_type: MessageType::Sub,
        payload: String::new(),
    }
}

/// Parses a raw bridge frame and returns the authenticated plaintext.
pub fn unwrap(raw: &[u8], key: &SessionKey) -> Result<Vec<u8>> {
    let message = SocketMessage::from_slice(raw)?;
    let sealed = message.encryption_payload()?;
    crypto::decrypt(&sealed, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::{json, Value};

    fn key() -> SessionKey {
        SessionKey::from_slice(&[9u8; crypto::KEY_SIZE]).unwrap()
    }

    #[test]
    fn test_subscribe_wire_format() {
        let raw = frame_subscribe("topic1").to_vec().unwrap();
        let value: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value, json!({"topic": "topic1", "type": "sub", "payload": ""}));
    }

    #[test]
    fn test_publish_then_unwrap() {
        let key = key();
        let message = frame_publish("peer", b"{\"id\":1}", &key).unwrap();
        assert_eq!(message.message_type, MessageType::Pub);
        assert!(!message.payload.contains("\"id\""));

        let raw = message.to_vec().unwrap();
        assert_eq!(unwrap(&raw, &key).unwrap(), b"{\"id\":1}");
    }

    #[test]
    fn test_empty_publish_has_empty_payload() {
        let message = frame_publish("peer", b"", &key()).unwrap();
        assert_eq!(message.message_type, MessageType::Pub);
        assert!(message.payload.is_empty());
    }

    #[test]
    fn test_unwrap_rejects_non_envelope() {
        let err = unwrap(b"hello", &key()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("hello"));
    }

    #[test]
    fn test_unwrap_rejects_empty_payload() {
        let raw = frame_subscribe("topic1").to_vec().unwrap();
        let err = unwrap(&raw, &key()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_unwrap_with_wrong_key_is_authentication_error() {
        let raw = frame_publish("peer", b"x", &key()).unwrap().to_vec().unwrap();
        let other = SessionKey::generate();
        assert_eq!(unwrap(&raw, &other).unwrap_err().kind(), ErrorKind::Authentication);
    }
}
