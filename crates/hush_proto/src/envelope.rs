//! Signed, counter-stamped envelope - the outer wrapper of every peer payload.
//!
//! The relay is untrusted: it can drop, reorder, replay, or forge frames.
//! Every envelope therefore carries
//!   - `counter`   - strictly increasing per sender (see `counter`)
//!   - `signature` - RSA-PSS over `canonical_bytes(data, counter)`
//!
//! Canonical form (signer and verifier MUST agree byte for byte):
//!   compact JSON of `data`, object keys sorted, no whitespace,
//!   immediately followed by the ASCII decimal `counter`.
//! JSON objects always end in `}`, so the boundary is unambiguous.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use hush_crypto::{Identity, VerificationKey};

use crate::error::ProtoError;
use crate::payload::Payload;

/// On-wire `signed_data` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: Payload,
    pub counter: u64,
    /// Base64 RSA-PSS signature.
    pub signature: String,
}

impl Envelope {
    /// Sign `data` at `counter` with the identity's signing key.
    pub fn sign(data: Payload, counter: u64, identity: &Identity) -> Result<Self, ProtoError> {
        let message = canonical_bytes(&data, counter)?;
        let signature = identity.sign(&message)?;
        Ok(Self {
            data,
            counter,
            signature: STANDARD.encode(signature),
        })
    }

    /// `Ok(false)` for a well-formed envelope whose signature does not match;
    /// `Err(EnvelopeFormat)` when the signature field itself is malformed.
    pub fn verify(&self, key: &VerificationKey) -> Result<bool, ProtoError> {
        if self.signature.is_empty() {
            return Err(ProtoError::EnvelopeFormat("signature is empty".into()));
        }
        let signature = STANDARD
            .decode(&self.signature)
            .map_err(|e| ProtoError::EnvelopeFormat(format!("signature is not base64: {e}")))?;
        if signature.len() != key.signature_len() {
            return Ok(false);
        }
        let message = canonical_bytes(&self.data, self.counter)?;
        Ok(key.verify(&message, &signature))
    }

    pub fn sender(&self) -> &str {
        self.data.sender()
    }
}

/// Bytes that are signed for `(data, counter)`.
pub fn canonical_bytes(data: &Payload, counter: u64) -> Result<Vec<u8>, ProtoError> {
    let value = sort_keys(serde_json::to_value(data)?);
    let mut out = serde_json::to_vec(&value)?;
    out.extend_from_slice(counter.to_string().as_bytes());
    Ok(out)
}

// Rebuilt explicitly so the order does not depend on serde_json's map backend.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{HelloPayload, PublicChatPayload};
    use crate::test_support::identity;

    fn public(sender: &str, message: &str) -> Payload {
        Payload::PublicChat(PublicChatPayload {
            sender: sender.into(),
            message: message.into(),
        })
    }

    #[test]
    fn canonical_bytes_are_sorted_compact_json_plus_counter() {
        let data = Payload::Hello(HelloPayload {
            username: "alice".into(),
            public_key: "E".into(),
            signing_key: "S".into(),
        });
        let bytes = canonical_bytes(&data, 42).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"public_key":"E","signing_key":"S","type":"hello","username":"alice"}42"#
        );
    }

    #[test]
    fn canonical_bytes_are_stable() {
        let data = public("alice", "hi there");
        assert_eq!(canonical_bytes(&data, 7).unwrap(), canonical_bytes(&data.clone(), 7).unwrap());
        assert_ne!(canonical_bytes(&data, 7).unwrap(), canonical_bytes(&data, 8).unwrap());
    }

    #[test]
    fn sign_then_verify() {
        let alice = identity("alice");
        let env = Envelope::sign(public("alice", "hello"), 5, alice).unwrap();
        assert!(env.verify(alice.verification_key()).unwrap());
    }

    #[test]
    fn verify_fails_for_other_key() {
        let alice = identity("alice");
        let bob = identity("bob");
        let env = Envelope::sign(public("alice", "hello"), 5, alice).unwrap();
        assert!(!env.verify(bob.verification_key()).unwrap());
        // the encryption key of the same identity is not a signing key
        let enc_as_verifier =
            VerificationKey::from_pem(&alice.encryption_key().to_pem().unwrap()).unwrap();
        assert!(!env.verify(&enc_as_verifier).unwrap());
    }

    #[test]
    fn verify_fails_after_mutation() {
        let alice = identity("alice");
        let env = Envelope::sign(public("alice", "hello"), 5, alice).unwrap();

        let mut bumped = env.clone();
        bumped.counter = 6;
        assert!(!bumped.verify(alice.verification_key()).unwrap());

        let mut edited = env.clone();
        edited.data = public("alice", "hellO");
        assert!(!edited.verify(alice.verification_key()).unwrap());

        let mut truncated = env;
        let mut sig = STANDARD.decode(&truncated.signature).unwrap();
        sig.pop();
        truncated.signature = STANDARD.encode(sig);
        assert!(!truncated.verify(alice.verification_key()).unwrap());
    }

    #[test]
    fn malformed_signature_is_a_format_error() {
        let alice = identity("alice");
        let mut env = Envelope::sign(public("alice", "hello"), 1, alice).unwrap();
        env.signature = "not base64!".into();
        assert!(matches!(
            env.verify(alice.verification_key()),
            Err(ProtoError::EnvelopeFormat(_))
        ));
        env.signature.clear();
        assert!(matches!(
            env.verify(alice.verification_key()),
            Err(ProtoError::EnvelopeFormat(_))
        ));
    }
}
