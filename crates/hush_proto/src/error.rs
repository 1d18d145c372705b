use thiserror::Error;

use hush_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Malformed envelope: {0}")]
    EnvelopeFormat(String),

    #[error("Outbound counter space exhausted")]
    CounterExhausted,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
