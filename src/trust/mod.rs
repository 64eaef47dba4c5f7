//! Trust stores and signed bundle verification.
//!
//! A [`TrustStore`] is a set of X.509 certificates the installer is willing
//! to trust, loaded from any of the common certificate container formats.
//! [`verify_directory`] checks a signed bundle directory against it and
//! answers with one of four [`VerificationResult`]s.

pub mod bundle;
mod jks;
mod loader;

pub use bundle::{
    FileKeyProvider, KeyProvider, KeyStoreKeyProvider, VerificationResult, sign_directory,
    verify_directory,
};
pub use loader::TrustStoreFormat;

use crate::error::{Error, Result};
use crate::keys::{self, PublicKey};
use chrono::{DateTime, Utc};
use x509_cert::Certificate;
use x509_cert::der::asn1::{ObjectIdentifier, PrintableStringRef, Utf8StringRef};
use x509_cert::der::{Decode, Encode};
use x509_cert::name::Name;

const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// A certificate registered in a [`TrustStore`].
#[derive(Debug, Clone)]
pub struct TrustedCertificate {
    alias: String,
    der: Vec<u8>,
    certificate: Certificate,
}

impl TrustedCertificate {
    /// Alias the certificate is registered under.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// DER encoding as loaded.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Parsed certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

/// Immutable set of trusted certificates keyed by alias.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    certificates: Vec<TrustedCertificate>,
}

impl TrustStore {
    /// Loads a trust store from inline PEM text or a certificate file.
    ///
    /// `source` is treated as inline PEM when it starts with
    /// `-----BEGIN CERTIFICATE-----`; otherwise it must name an existing
    /// `.pem`, `.der`/`.cer`/`.crt`, `.p7b`/`.p7c`, `.p12`/`.pfx` or `.jks`
    /// file.
    ///
    /// # Errors
    ///
    /// [`Error::UnrecognizedTrustStore`](crate::Error::UnrecognizedTrustStore)
    /// for any other source, or a decode error for a malformed file.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use jdeploy_trust::trust::{TrustStore, VerificationResult, verify_directory};
    ///
    /// # fn example() -> jdeploy_trust::Result<()> {
    /// let store = TrustStore::load("trusted.pem")?;
    /// let result = verify_directory("1.0.0", "jdeploy-bundle".as_ref(), &store)?;
    /// assert_eq!(result, VerificationResult::SignedCorrectly);
    /// # Ok(())
    /// # }
    /// ```
    pub fn load(source: &str) -> Result<Self> {
        loader::load(source, None)
    }

    /// Like [`load`](Self::load), with the password for PKCS#12 and JKS
    /// containers. When given, container integrity is checked with it.
    pub fn load_with_password(source: &str, password: Option<&str>) -> Result<Self> {
        loader::load(source, password)
    }

    /// Builds a store from DER certificates.
    pub fn from_der_certificates<I>(certificates: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut store = Self::default();
        for der in certificates {
            store.add_der(der)?;
        }
        Ok(store)
    }

    /// Registers a DER certificate under its subject common name.
    ///
    /// Certificates without a CN become `cert-<n>`. An alias already taken
    /// by a different certificate gets a numeric suffix; the same
    /// certificate added twice is kept once.
    pub(crate) fn add_der(&mut self, der: Vec<u8>) -> Result<()> {
        if self.contains_der(&der) {
            return Ok(());
        }
        let certificate = Certificate::from_der(&der)?;
        let base = common_name(&certificate.tbs_certificate.subject)
            .unwrap_or_else(|| format!("cert-{}", self.certificates.len() + 1));

        let mut alias = base.clone();
        let mut n = 2;
        while self.get(&alias).is_some() {
            alias = format!("{base}-{n}");
            n += 1;
        }
        log::debug!("trust store: added {alias}");
        self.certificates.push(TrustedCertificate {
            alias,
            der,
            certificate,
        });
        Ok(())
    }

    /// Number of certificates.
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Whether the store holds no certificates.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Aliases in load order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.certificates.iter().map(|c| c.alias.as_str())
    }

    /// Looks up a certificate by alias.
    pub fn get(&self, alias: &str) -> Option<&TrustedCertificate> {
        self.certificates.iter().find(|c| c.alias == alias)
    }

    /// Whether a certificate with exactly these DER bytes is trusted.
    pub fn contains_der(&self, der: &[u8]) -> bool {
        self.certificates.iter().any(|c| c.der == der)
    }

    /// Whether `chain` (leaf first) leads to a trusted certificate.
    ///
    /// Walking from the leaf, each certificate must either be pinned in the
    /// store, be issued by a trusted certificate, or be issued by the next
    /// certificate in the chain. A chain that runs out before reaching the
    /// store is untrusted.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedAlgorithm`] when no trusted path was found and
    /// some issuer along the way uses a key or signature algorithm that
    /// cannot be checked.
    pub fn verify_chain(&self, chain: &[Certificate]) -> Result<bool> {
        let mut unsupported = None;
        let mut note = |result: Result<bool>| match result {
            Ok(issued) => issued,
            Err(e) => {
                unsupported = Some(e);
                false
            }
        };

        for (index, cert) in chain.iter().enumerate() {
            let Ok(der) = cert.to_der() else {
                return Ok(false);
            };
            if self.contains_der(&der) {
                return Ok(true);
            }
            for trusted in &self.certificates {
                if note(issued_by(cert, &trusted.certificate)) {
                    return Ok(true);
                }
            }
            let Some(next) = chain.get(index + 1) else {
                break;
            };
            if !note(issued_by(cert, next)) {
                break;
            }
        }
        match unsupported {
            Some(e) => Err(e),
            None => Ok(false),
        }
    }

    /// Like [`verify_chain`](Self::verify_chain), with unsupported
    /// algorithms counted as untrusted.
    pub fn is_chain_trusted(&self, chain: &[Certificate]) -> bool {
        matches!(self.verify_chain(chain), Ok(true))
    }
}

/// Subject common name of a certificate name, if any.
///
/// When several CN attributes are present the most specific (last) wins.
pub fn common_name(name: &Name) -> Option<String> {
    let mut found = None;
    for rdn in name.0.iter() {
        for atv in rdn.0.iter() {
            if atv.oid != COMMON_NAME {
                continue;
            }
            if let Ok(s) = atv.value.decode_as::<Utf8StringRef<'_>>() {
                found = Some(s.as_str().to_string());
            } else if let Ok(s) = atv.value.decode_as::<PrintableStringRef<'_>>() {
                found = Some(s.as_str().to_string());
            }
        }
    }
    found
}

/// Public key of a certificate.
///
/// Fails with [`Error::UnsupportedAlgorithm`] for keys other than Ed25519
/// and RSA.
pub(crate) fn certificate_key(cert: &Certificate) -> Result<PublicKey> {
    let spki = cert.tbs_certificate.subject_public_key_info.to_der()?;
    PublicKey::from_public_key_der(&spki)
}

/// Whether `at` lies within the certificate's validity period.
pub(crate) fn is_valid_at(cert: &Certificate, at: DateTime<Utc>) -> bool {
    let validity = &cert.tbs_certificate.validity;
    let Ok(at) = u64::try_from(at.timestamp()) else {
        return false;
    };
    validity.not_before.to_unix_duration().as_secs() <= at
        && at <= validity.not_after.to_unix_duration().as_secs()
}

/// Whether `issuer` signed `cert`.
///
/// `Err` only when the names match but the issuer key or the certificate
/// signature algorithm is unsupported, so the answer is unknown.
fn issued_by(cert: &Certificate, issuer: &Certificate) -> Result<bool> {
    if cert.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        return Ok(false);
    }
    let algorithm = &cert.signature_algorithm.oid;
    if !keys::is_supported_signature_algorithm(algorithm) {
        return Err(Error::UnsupportedAlgorithm {
            algorithm: algorithm.to_string(),
        });
    }
    let key = match certificate_key(issuer) {
        Ok(key) => key,
        Err(e @ Error::UnsupportedAlgorithm { .. }) => return Err(e),
        Err(_) => return Ok(false),
    };
    if key.signature_algorithm() != *algorithm {
        return Ok(false);
    }
    let Ok(tbs) = cert.tbs_certificate.to_der() else {
        return Ok(false);
    };
    let Some(signature) = cert.signature.as_bytes() else {
        return Ok(false);
    };
    Ok(key.verify(&tbs, signature))
}
