//! Identity key management
//!
//! Each participant owns one `Identity` holding two independent RSA key pairs:
//!
//! - an *encryption* pair, whose public half wraps per-message AES keys
//!   (RSA-OAEP / SHA-256);
//! - a *signing* pair, whose private half signs envelopes
//!   (RSA-PSS / SHA-256, 32-byte salt).
//!
//! The two pairs are never interchangeable: compromising one capability does
//! not grant the other. Private halves never leave this module.
//!
//! Public halves travel as SPKI PEM text (`-----BEGIN PUBLIC KEY-----`,
//! 64-column base64), which embeds cleanly in JSON payloads.

use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::der::{pem, Decode};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding, ObjectIdentifier, SubjectPublicKeyInfoRef};
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier as _};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::aead::KEY_LEN;
use crate::error::CryptoError;

/// Smallest modulus accepted for either capability, local or imported.
pub const MIN_RSA_BITS: usize = 2048;

pub const DEFAULT_RSA_BITS: usize = 2048;

/// `rsaEncryption` (PKCS #1).
const RSA_ENCRYPTION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

// ── Key usage ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    Encryption,
    Verification,
}

impl KeyUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyUsage::Encryption => "encryption",
            KeyUsage::Verification => "signature verification",
        }
    }
}

// ── Public keys ──────────────────────────────────────────────────────────────

/// Recipient-side key: wraps message keys with RSA-OAEP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionPublicKey(RsaPublicKey);

impl EncryptionPublicKey {
    pub fn from_pem(text: &str) -> Result<Self, CryptoError> {
        decode_rsa_public(text, KeyUsage::Encryption).map(Self)
    }

    pub fn to_pem(&self) -> Result<String, CryptoError> {
        export_pem(&self.0)
    }

    pub fn fingerprint(&self) -> Result<String, CryptoError> {
        Ok(fingerprint(&self.to_pem()?))
    }

    /// Wrap a 32-byte message key for the holder of the matching private key.
    pub fn wrap_key(&self, key: &[u8; KEY_LEN]) -> Result<Vec<u8>, CryptoError> {
        self.0
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key)
            .map_err(|e| CryptoError::KeyWrap(e.to_string()))
    }
}

/// Sender-side key: checks RSA-PSS envelope signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey(RsaPublicKey);

impl VerificationKey {
    pub fn from_pem(text: &str) -> Result<Self, CryptoError> {
        decode_rsa_public(text, KeyUsage::Verification).map(Self)
    }

    pub fn to_pem(&self) -> Result<String, CryptoError> {
        export_pem(&self.0)
    }

    pub fn fingerprint(&self) -> Result<String, CryptoError> {
        Ok(fingerprint(&self.to_pem()?))
    }

    /// Length in bytes of every signature this key can produce.
    pub fn signature_len(&self) -> usize {
        self.0.size()
    }

    /// `true` only for a valid signature over exactly `msg`.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        let Ok(sig) = Signature::try_from(signature) else {
            return false;
        };
        VerifyingKey::<Sha256>::new(self.0.clone())
            .verify(msg, &sig)
            .is_ok()
    }
}

/// Result of [`import_public_key`], typed by the capability it was checked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Encryption(EncryptionPublicKey),
    Verification(VerificationKey),
}

/// Parse PEM public-key text for the requested capability.
///
/// `KeyFormat` means the text is not a well-formed PEM public key;
/// `KeyUsage` means it decoded but cannot serve `usage`.
pub fn import_public_key(text: &str, usage: KeyUsage) -> Result<PublicKey, CryptoError> {
    let key = decode_rsa_public(text, usage)?;
    Ok(match usage {
        KeyUsage::Encryption => PublicKey::Encryption(EncryptionPublicKey(key)),
        KeyUsage::Verification => PublicKey::Verification(VerificationKey(key)),
    })
}

/// SPKI PEM text for either kind of public key, LF line endings.
pub fn export_public_key(key: &PublicKey) -> Result<String, CryptoError> {
    match key {
        PublicKey::Encryption(k) => k.to_pem(),
        PublicKey::Verification(k) => k.to_pem(),
    }
}

/// Lowercase hex SHA-256 of the exported PEM text.
pub fn fingerprint(pem_text: &str) -> String {
    hex::encode(Sha256::digest(pem_text.as_bytes()))
}

fn export_pem(key: &RsaPublicKey) -> Result<String, CryptoError> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyFormat(e.to_string()))
}

fn decode_rsa_public(text: &str, usage: KeyUsage) -> Result<RsaPublicKey, CryptoError> {
    let (label, der) = pem::decode_vec(text.trim().as_bytes())
        .map_err(|e| CryptoError::KeyFormat(e.to_string()))?;

    let key = match label {
        "PUBLIC KEY" => {
            let spki = SubjectPublicKeyInfoRef::from_der(&der)
                .map_err(|e| CryptoError::KeyFormat(e.to_string()))?;
            if spki.algorithm.oid != RSA_ENCRYPTION_OID {
                return Err(CryptoError::KeyUsage {
                    usage: usage.as_str(),
                    reason: format!("algorithm {} is not RSA", spki.algorithm.oid),
                });
            }
            RsaPublicKey::from_public_key_der(&der)
                .map_err(|e| CryptoError::KeyFormat(e.to_string()))?
        }
        "RSA PUBLIC KEY" => RsaPublicKey::from_pkcs1_der(&der)
            .map_err(|e| CryptoError::KeyFormat(e.to_string()))?,
        other => {
            return Err(CryptoError::KeyFormat(format!(
                "unexpected PEM label {other:?}"
            )))
        }
    };

    let bits = key.n().bits();
    if bits < MIN_RSA_BITS {
        return Err(CryptoError::KeyUsage {
            usage: usage.as_str(),
            reason: format!("{bits}-bit modulus is below the {MIN_RSA_BITS}-bit minimum"),
        });
    }
    Ok(key)
}

// ── Local identity ───────────────────────────────────────────────────────────

/// Long-term identity of the local participant.
///
/// Lives for the whole process; nothing here is ever persisted.
/// `RsaPrivateKey` zeroizes itself on drop.
pub struct Identity {
    display_name: String,
    decryption: RsaPrivateKey,
    signer: BlindedSigningKey<Sha256>,
    encryption_key: EncryptionPublicKey,
    verification_key: VerificationKey,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

impl Identity {
    pub fn generate(display_name: &str) -> Result<Self, CryptoError> {
        Self::generate_with_bits(display_name, DEFAULT_RSA_BITS)
    }

    pub fn generate_with_bits(display_name: &str, bits: usize) -> Result<Self, CryptoError> {
        if bits < MIN_RSA_BITS {
            return Err(CryptoError::KeyGeneration(format!(
                "{bits}-bit keys are below the {MIN_RSA_BITS}-bit minimum"
            )));
        }
        let decryption = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let signing = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

        let encryption_key = EncryptionPublicKey(decryption.to_public_key());
        let verification_key = VerificationKey(signing.to_public_key());
        tracing::debug!(name = display_name, bits, "generated identity key pairs");

        Ok(Self {
            display_name: display_name.to_string(),
            decryption,
            signer: BlindedSigningKey::<Sha256>::new(signing),
            encryption_key,
            verification_key,
        })
    }

    /// Generate on the blocking pool. Dropping or aborting the future
    /// abandons the result without touching the caller's runtime thread.
    pub async fn generate_async(display_name: String, bits: usize) -> Result<Self, CryptoError> {
        tokio::task::spawn_blocking(move || Self::generate_with_bits(&display_name, bits))
            .await
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn encryption_key(&self) -> &EncryptionPublicKey {
        &self.encryption_key
    }

    pub fn verification_key(&self) -> &VerificationKey {
        &self.verification_key
    }

    /// Fingerprint of the public encryption key, as other peers see it.
    pub fn fingerprint(&self) -> Result<String, CryptoError> {
        self.encryption_key.fingerprint()
    }

    /// RSA-PSS signature over `msg` with the signing key (never the encryption key).
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.signer
            .try_sign_with_rng(&mut OsRng, msg)
            .map(|sig| sig.to_vec())
            .map_err(|e| CryptoError::Signing(e.to_string()))
    }

    /// Recover a message key wrapped for this identity.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
        let plain = Zeroizing::new(
            self.decryption
                .decrypt(Oaep::new::<Sha256>(), wrapped)
                .map_err(|_| CryptoError::KeyUnwrap)?,
        );
        if plain.len() != KEY_LEN {
            return Err(CryptoError::KeyUnwrap);
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&plain);
        Ok(key)
    }
}
