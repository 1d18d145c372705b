//! hush_crypto - identity keys and hybrid message encryption for hush
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited RustCrypto crates.
//! - Separate key pairs for encryption and for signing.
//! - One fresh symmetric key per message, zeroized after use.
//!
//! # Module layout
//! - `identity` - RSA encryption + signing key pairs, PEM import/export, fingerprints
//! - `aead`     - AES-256-GCM helpers
//! - `hybrid`   - seal/open for a list of recipients (RSA-OAEP key wrap + AEAD body)
//! - `error`    - unified error type

pub mod aead;
pub mod error;
pub mod hybrid;
pub mod identity;

pub use error::CryptoError;
pub use hybrid::{open, seal, Recipient, SealedMessage};
pub use identity::{
    export_public_key, fingerprint, import_public_key, EncryptionPublicKey, Identity, KeyUsage, PublicKey,
    VerificationKey,
};
