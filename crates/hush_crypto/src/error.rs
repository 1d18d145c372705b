use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Malformed public key text: {0}")]
    KeyFormat(String),

    #[error("Key cannot be used for {usage}: {reason}")]
    KeyUsage { usage: &'static str, reason: String },

    #[error("No public encryption key on file for recipient {0}")]
    UnknownRecipient(String),

    #[error("Message has no recipients")]
    NoRecipients,

    #[error("{0} is not a recipient of this message")]
    NotARecipient(String),

    #[error("Message key could not be wrapped: {0}")]
    KeyWrap(String),

    #[error("Wrapped message key could not be recovered")]
    KeyUnwrap,

    #[error("Authentication failed (tag or signature mismatch, possible tampering)")]
    Authentication,

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("Signing failed: {0}")]
    Signing(String),
}
