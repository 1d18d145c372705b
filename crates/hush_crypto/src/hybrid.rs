//! Hybrid multi-recipient encryption
//!
//! A message is encrypted once under a fresh AES-256-GCM key; only that
//! 32-byte key is RSA-OAEP-wrapped per recipient. Adding recipients costs one
//! key wrap each, never a second pass over the body.
//!
//! `recipients[i]` and `wrapped_keys[i]` always refer to the same peer.

use zeroize::Zeroizing;

use crate::aead::{self, NONCE_LEN};
use crate::error::CryptoError;
use crate::identity::{EncryptionPublicKey, Identity};

/// A recipient as resolved by the caller. `key: None` means the caller could
/// not find a public key on file.
#[derive(Debug, Clone, Copy)]
pub struct Recipient<'a> {
    pub peer_id: &'a str,
    pub key: Option<&'a EncryptionPublicKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    pub recipients: Vec<String>,
    pub iv: [u8; NONCE_LEN],
    pub wrapped_keys: Vec<Vec<u8>>,
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext` for every recipient, in the order given.
pub fn seal(plaintext: &[u8], recipients: &[Recipient<'_>]) -> Result<SealedMessage, CryptoError> {
    if recipients.is_empty() {
        return Err(CryptoError::NoRecipients);
    }
    // Resolve every key before generating anything.
    let keys = recipients
        .iter()
        .map(|r| r.key.ok_or_else(|| CryptoError::UnknownRecipient(r.peer_id.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    let message_key = aead::generate_key();
    let iv = aead::generate_nonce();
    let ciphertext = aead::encrypt(&message_key, &iv, plaintext, b"")?;

    let wrapped_keys = keys
        .iter()
        .map(|k| k.wrap_key(&message_key))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(recipients = recipients.len(), bytes = plaintext.len(), "sealed message");

    Ok(SealedMessage {
        recipients: recipients.iter().map(|r| r.peer_id.to_string()).collect(),
        iv,
        wrapped_keys,
        ciphertext,
    })
}

/// Decrypt a sealed message addressed (among others) to `self_id`.
pub fn open(
    sealed: &SealedMessage,
    self_id: &str,
    identity: &Identity,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let position = sealed
        .recipients
        .iter()
        .position(|r| r == self_id)
        .ok_or_else(|| CryptoError::NotARecipient(self_id.to_string()))?;
    let wrapped = sealed
        .wrapped_keys
        .get(position)
        .ok_or(CryptoError::KeyUnwrap)?;

    let message_key = identity.unwrap_key(wrapped)?;
    aead::decrypt(&message_key, &sealed.iv, &sealed.ciphertext, b"")
}
