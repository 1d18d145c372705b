use thiserror::Error;

use hush_crypto::CryptoError;
use hush_proto::ProtoError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No signing key on file for sender {0}")]
    UnknownSender(String),

    #[error("Counter {counter} from {peer} is not above its high-water mark")]
    ReplayRejected { peer: String, counter: u64 },

    #[error("Authentication failed for {0}")]
    Authentication(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl SessionError {
    /// Failures that point at forged, replayed, or tampered traffic rather
    /// than a malformed or misaddressed frame.
    pub fn is_tampering(&self) -> bool {
        match self {
            SessionError::ReplayRejected { .. } | SessionError::Authentication(_) => true,
            SessionError::Crypto(e) | SessionError::Proto(ProtoError::Crypto(e)) => {
                matches!(e, CryptoError::Authentication | CryptoError::KeyUnwrap)
            }
            _ => false,
        }
    }

    /// The frame was well-formed but addressed to someone else.
    pub fn is_not_for_us(&self) -> bool {
        matches!(self, SessionError::Crypto(CryptoError::NotARecipient(_)))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tampering_classification() {
        assert!(SessionError::Authentication("bob".into()).is_tampering());
        assert!(SessionError::ReplayRejected { peer: "bob".into(), counter: 1 }.is_tampering());
        assert!(SessionError::Crypto(CryptoError::Authentication).is_tampering());
        assert!(SessionError::Proto(ProtoError::Crypto(CryptoError::KeyUnwrap)).is_tampering());

        assert!(!SessionError::UnknownSender("bob".into()).is_tampering());
        assert!(!SessionError::Proto(ProtoError::EnvelopeFormat("x".into())).is_tampering());
        assert!(!SessionError::Crypto(CryptoError::NotARecipient("dave".into())).is_tampering());
        assert!(SessionError::Crypto(CryptoError::NotARecipient("dave".into())).is_not_for_us());
    }
}
