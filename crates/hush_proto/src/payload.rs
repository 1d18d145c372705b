//! Payload types carried inside signed envelopes, plus the unsigned
//! directory messages exchanged with the relay.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use hush_crypto::aead::NONCE_LEN;
use hush_crypto::SealedMessage;

use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Hello(HelloPayload),
    Chat(ChatPayload),
    PublicChat(PublicChatPayload),
}

impl Payload {
    /// Peer that claims to have produced this payload.
    pub fn sender(&self) -> &str {
        match self {
            Payload::Hello(h) => &h.username,
            Payload::Chat(c) => &c.sender,
            Payload::PublicChat(p) => &p.sender,
        }
    }
}

/// Announces a peer and both of its public keys (PEM text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    pub username: String,
    /// RSA-OAEP encryption key.
    pub public_key: String,
    /// RSA-PSS verification key.
    pub signing_key: String,
}

/// End-to-end encrypted chat. Binary fields are standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub sender: String,
    pub recipients: Vec<String>,
    /// Home servers of the recipients, for relay routing.
    #[serde(default)]
    pub destination_servers: Vec<String>,
    pub iv: String,
    /// Wrapped message keys, positionally aligned with `recipients`.
    pub symm_keys: Vec<String>,
    /// AES-GCM ciphertext || tag.
    pub chat: String,
}

impl ChatPayload {
    pub fn from_sealed(sender: &str, sealed: &SealedMessage, destination_servers: Vec<String>) -> Self {
        Self {
            sender: sender.to_string(),
            recipients: sealed.recipients.clone(),
            destination_servers,
            iv: STANDARD.encode(sealed.iv),
            symm_keys: sealed.wrapped_keys.iter().map(|k| STANDARD.encode(k)).collect(),
            chat: STANDARD.encode(&sealed.ciphertext),
        }
    }

    /// Decode and structurally validate the wire fields.
    pub fn to_sealed(&self) -> Result<SealedMessage, ProtoError> {
        if self.recipients.is_empty() {
            return Err(ProtoError::EnvelopeFormat("chat has no recipients".into()));
        }
        if self.recipients.len() != self.symm_keys.len() {
            return Err(ProtoError::EnvelopeFormat(format!(
                "{} recipients but {} wrapped keys",
                self.recipients.len(),
                self.symm_keys.len()
            )));
        }
        let iv: [u8; NONCE_LEN] = decode_b64("iv", &self.iv)?
            .try_into()
            .map_err(|v: Vec<u8>| {
                ProtoError::EnvelopeFormat(format!("iv must be {NONCE_LEN} bytes, got {}", v.len()))
            })?;
        let wrapped_keys = self
            .symm_keys
            .iter()
            .map(|k| decode_b64("symm_keys", k))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SealedMessage {
            recipients: self.recipients.clone(),
            iv,
            wrapped_keys,
            ciphertext: decode_b64("chat", &self.chat)?,
        })
    }
}

/// Plaintext broadcast; signed and counter-stamped but not encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicChatPayload {
    pub sender: String,
    pub message: String,
}

/// The JSON body that is sealed inside `ChatPayload::chat`.
/// `participants[0]` is always the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatContent {
    pub participants: Vec<String>,
    pub message: String,
}

impl ChatContent {
    pub fn new(sender: &str, recipients: &[String], message: &str) -> Self {
        let mut participants = Vec::with_capacity(recipients.len() + 1);
        participants.push(sender.to_string());
        participants.extend(recipients.iter().cloned());
        Self {
            participants,
            message: message.to_string(),
        }
    }

    pub fn sender(&self) -> Option<&str> {
        self.participants.first().map(String::as_str)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtoError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ProtoError::EnvelopeFormat(format!("chat body: {e}")))
    }
}

// ── Directory (relay) messages ───────────────────────────────────────────────

/// Snapshot of every client the relay neighbourhood knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientList {
    pub servers: Vec<ServerEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub clients: Vec<ClientEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    pub username: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "signingKey", default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>, ProtoError> {
    STANDARD
        .decode(value)
        .map_err(|e| ProtoError::EnvelopeFormat(format!("{field} is not base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sealed() -> SealedMessage {
        SealedMessage {
            recipients: vec!["bob".into(), "carol".into()],
            iv: [9u8; NONCE_LEN],
            wrapped_keys: vec![vec![1, 2, 3], vec![4, 5, 6]],
            ciphertext: vec![7, 8, 9, 10],
        }
    }

    #[test]
    fn chat_payload_wire_shape() {
        let chat = ChatPayload::from_sealed("alice", &sealed(), vec!["ws://relay".into()]);
        let value = serde_json::to_value(Payload::Chat(chat)).unwrap();
        assert_eq!(value["type"], "chat");
        assert_eq!(value["sender"], "alice");
        assert_eq!(value["recipients"], json!(["bob", "carol"]));
        assert_eq!(value["destination_servers"], json!(["ws://relay"]));
        assert_eq!(value["iv"], STANDARD.encode([9u8; NONCE_LEN]));
        assert_eq!(value["symm_keys"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn sealed_survives_the_wire_encoding() {
        let chat = ChatPayload::from_sealed("alice", &sealed(), vec![]);
        assert_eq!(chat.to_sealed().unwrap(), sealed());
    }

    #[test]
    fn structural_chat_errors() {
        let good = ChatPayload::from_sealed("alice", &sealed(), vec![]);

        let mut missing_key = good.clone();
        missing_key.symm_keys.pop();
        assert!(matches!(missing_key.to_sealed(), Err(ProtoError::EnvelopeFormat(_))));

        let mut short_iv = good.clone();
        short_iv.iv = STANDARD.encode([0u8; 16]);
        assert!(matches!(short_iv.to_sealed(), Err(ProtoError::EnvelopeFormat(_))));

        let mut bad_b64 = good.clone();
        bad_b64.chat = "%%%".into();
        assert!(matches!(bad_b64.to_sealed(), Err(ProtoError::EnvelopeFormat(_))));

        let mut nobody = good;
        nobody.recipients.clear();
        nobody.symm_keys.clear();
        assert!(matches!(nobody.to_sealed(), Err(ProtoError::EnvelopeFormat(_))));
    }

    #[test]
    fn hello_parses_from_wire() {
        let payload: Payload = serde_json::from_value(json!({
            "type": "hello",
            "username": "alice",
            "public_key": "PEM-E",
            "signing_key": "PEM-S",
        }))
        .unwrap();
        assert_eq!(payload.sender(), "alice");
        assert!(matches!(payload, Payload::Hello(_)));
    }

    #[test]
    fn unknown_payload_type_is_rejected() {
        let res = serde_json::from_value::<Payload>(json!({"type": "file_transfer"}));
        assert!(res.is_err());
    }

    #[test]
    fn client_list_uses_camel_case_key_fields() {
        let list: ClientList = serde_json::from_value(json!({
            "servers": [{
                "address": "ws://127.0.0.1:8000",
                "clients": [
                    {"username": "bob", "publicKey": "PEM-B", "signingKey": "PEM-BS"},
                    {"username": "carol", "publicKey": "PEM-C"}
                ]
            }]
        }))
        .unwrap();
        let clients = &list.servers[0].clients;
        assert_eq!(clients[0].signing_key.as_deref(), Some("PEM-BS"));
        assert_eq!(clients[1].signing_key, None);
        assert_eq!(clients[1].public_key, "PEM-C");
    }

    #[test]
    fn chat_content_puts_sender_first() {
        let content = ChatContent::new("alice", &["bob".into(), "carol".into()], "hi");
        assert_eq!(content.sender(), Some("alice"));
        let back = ChatContent::from_bytes(&content.to_bytes().unwrap()).unwrap();
        assert_eq!(back, content);
        assert!(ChatContent::from_bytes(b"\xff\xfe").is_err());
    }
}
