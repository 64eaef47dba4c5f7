//! Public keys accepted when verifying signatures.
//!
//! Everything this crate signs is signed with Ed25519. Certificates and
//! published identities issued elsewhere commonly carry RSA keys, so
//! verification accepts both. RSA signatures are PKCS#1 v1.5 over the
//! SHA-256 digest of the message.

use crate::error::{Error, Result};
use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::{Signature, VerifyingKey};
use pkcs8::LineEnding;
use pkcs8::spki::SubjectPublicKeyInfoRef;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use x509_cert::der::Decode;
use x509_cert::der::asn1::ObjectIdentifier;

/// `id-Ed25519`, used both as key and signature algorithm.
pub const ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");
/// `rsaEncryption` key algorithm.
pub const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// `sha256WithRSAEncryption` signature algorithm.
pub const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// A public key of one of the supported algorithms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// Ed25519 key
    Ed25519(VerifyingKey),
    /// RSA key, verified as PKCS#1 v1.5 with SHA-256
    Rsa(RsaPublicKey),
}

impl PublicKey {
    /// Decodes a DER SubjectPublicKeyInfo.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedAlgorithm`] when the key is neither Ed25519 nor
    /// RSA, or a decode error for malformed input.
    pub fn from_public_key_der(der: &[u8]) -> Result<Self> {
        let algorithm = SubjectPublicKeyInfoRef::from_der(der)?.algorithm.oid;
        if algorithm == ED25519 {
            Ok(Self::Ed25519(VerifyingKey::from_public_key_der(der)?))
        } else if algorithm == RSA_ENCRYPTION {
            Ok(Self::Rsa(RsaPublicKey::from_public_key_der(der)?))
        } else {
            Err(Error::UnsupportedAlgorithm {
                algorithm: algorithm.to_string(),
            })
        }
    }

    /// Decodes a `PUBLIC KEY` PEM block.
    pub fn from_public_key_pem(text: &str) -> Result<Self> {
        let block = pem::parse(text)?;
        if block.tag() != PUBLIC_KEY_LABEL {
            crate::bail!("expected a {PUBLIC_KEY_LABEL} PEM block, found {}", block.tag());
        }
        Self::from_public_key_der(block.contents())
    }

    /// DER SubjectPublicKeyInfo encoding.
    pub fn to_public_key_der(&self) -> Result<Vec<u8>> {
        let document = match self {
            Self::Ed25519(key) => key.to_public_key_der()?,
            Self::Rsa(key) => key.to_public_key_der()?,
        };
        Ok(document.into_vec())
    }

    /// `PUBLIC KEY` PEM encoding.
    pub fn to_public_key_pem(&self) -> Result<String> {
        Ok(match self {
            Self::Ed25519(key) => key.to_public_key_pem(LineEnding::LF)?,
            Self::Rsa(key) => key.to_public_key_pem(LineEnding::LF)?,
        })
    }

    /// X.509 signature algorithm of certificates signed by this key.
    pub fn signature_algorithm(&self) -> ObjectIdentifier {
        match self {
            Self::Ed25519(_) => ED25519,
            Self::Rsa(_) => SHA256_WITH_RSA,
        }
    }

    /// Whether `signature` over `message` verifies under this key.
    ///
    /// Ed25519 signatures are checked strictly. Malformed signatures are
    /// `false`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            Self::Ed25519(key) => Signature::from_slice(signature)
                .is_ok_and(|signature| key.verify_strict(message, &signature).is_ok()),
            Self::Rsa(key) => key
                .verify(
                    Pkcs1v15Sign::new::<Sha256>(),
                    &Sha256::digest(message),
                    signature,
                )
                .is_ok(),
        }
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self::Ed25519(key)
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(key: RsaPublicKey) -> Self {
        Self::Rsa(key)
    }
}

/// Whether certificates signed with `algorithm` can be checked at all.
pub fn is_supported_signature_algorithm(algorithm: &ObjectIdentifier) -> bool {
    *algorithm == ED25519 || *algorithm == SHA256_WITH_RSA
}
