//! Trust-store source detection and decoding.

use super::{TrustStore, jks};
use crate::error::{Error, ErrorExt, Result};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use std::path::Path;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::{Decode, Encode};

const PEM_CERTIFICATE_HEADER: &str = "-----BEGIN CERTIFICATE-----";
const SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// Certificate container formats a trust store can be loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStoreFormat {
    /// PEM text given directly instead of a path
    InlinePem,
    /// `.pem` file with one or more certificates
    PemFile,
    /// `.der`, `.cer` or `.crt` file with a single certificate
    Der,
    /// `.p7b` or `.p7c` PKCS#7 certificate bundle
    Pkcs7,
    /// `.p12` or `.pfx` PKCS#12 container
    Pkcs12,
    /// `.jks` Java KeyStore
    Jks,
}

impl TrustStoreFormat {
    /// Classifies `source` by content prefix or file extension.
    ///
    /// Returns `None` for anything unrecognized, including a path with a
    /// known extension that does not exist.
    pub fn detect(source: &str) -> Option<Self> {
        if source.trim_start().starts_with(PEM_CERTIFICATE_HEADER) {
            return Some(Self::InlinePem);
        }
        let path = Path::new(source);
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let format = match ext.as_str() {
            "pem" => Self::PemFile,
            "der" | "cer" | "crt" => Self::Der,
            "p7b" | "p7c" => Self::Pkcs7,
            "p12" | "pfx" => Self::Pkcs12,
            "jks" => Self::Jks,
            _ => return None,
        };
        path.is_file().then_some(format)
    }
}

pub(super) fn load(source: &str, password: Option<&str>) -> Result<TrustStore> {
    let format = TrustStoreFormat::detect(source).ok_or_else(|| Error::UnrecognizedTrustStore {
        source_desc: describe(source),
    })?;

    let certificates = match format {
        TrustStoreFormat::InlinePem => pem_certificates(source.as_bytes())?,
        _ => {
            let path = Path::new(source);
            let bytes = std::fs::read(path).fs_context("reading trust store", path)?;
            decode_file(format, &bytes, password).map_err(|e| Error::TrustStore {
                path: source.to_string(),
                reason: e.to_string(),
            })?
        }
    };

    if certificates.is_empty() {
        return Err(Error::TrustStore {
            path: describe(source),
            reason: "no certificates found".into(),
        });
    }

    let store = TrustStore::from_der_certificates(certificates)?;
    log::info!(
        "Loaded {} trusted certificates ({format:?})",
        store.len()
    );
    Ok(store)
}

fn decode_file(format: TrustStoreFormat, bytes: &[u8], password: Option<&str>) -> Result<Vec<Vec<u8>>> {
    match format {
        TrustStoreFormat::InlinePem | TrustStoreFormat::PemFile => pem_certificates(bytes),
        TrustStoreFormat::Der => {
            if is_pem(bytes) {
                pem_certificates(bytes)
            } else {
                Ok(vec![bytes.to_vec()])
            }
        }
        TrustStoreFormat::Pkcs7 => pkcs7_certificates(bytes),
        TrustStoreFormat::Pkcs12 => pkcs12_certificates(bytes, password),
        TrustStoreFormat::Jks => jks::trusted_certificates(bytes, password),
    }
}

/// Keeps inline PEM out of error messages.
fn describe(source: &str) -> String {
    if source.trim_start().starts_with("-----BEGIN") {
        "<inline PEM>".to_string()
    } else {
        source.to_string()
    }
}

fn is_pem(bytes: &[u8]) -> bool {
    bytes.trim_ascii_start().starts_with(b"-----BEGIN")
}

pub(super) fn pem_certificates(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    Ok(pem::parse_many(bytes)?
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .map(pem::Pem::into_contents)
        .collect())
}

fn pkcs7_certificates(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let der = if is_pem(bytes) {
        pem::parse(bytes)?.into_contents()
    } else {
        bytes.to_vec()
    };
    let info = ContentInfo::from_der(&der)?;
    if info.content_type != SIGNED_DATA {
        crate::bail!("PKCS#7 content is not signed-data: {}", info.content_type);
    }
    let signed = SignedData::from_der(&info.content.to_der()?)?;

    let mut out = Vec::new();
    if let Some(set) = signed.certificates {
        for choice in set.0.iter() {
            if let CertificateChoices::Certificate(cert) = choice {
                out.push(cert.to_der()?);
            }
        }
    }
    Ok(out)
}

fn pkcs12_certificates(bytes: &[u8], password: Option<&str>) -> Result<Vec<Vec<u8>>> {
    let pfx = p12::PFX::parse(bytes).map_err(|e| Error::GenericError(format!("PKCS#12: {e:?}")))?;
    let password = password.unwrap_or("");
    if !password.is_empty() && !pfx.verify_mac(password) {
        crate::bail!("PKCS#12 integrity check failed: wrong password");
    }
    pfx.cert_x509_bags(password)
        .map_err(|e| Error::GenericError(format!("PKCS#12: {e:?}")))
}
