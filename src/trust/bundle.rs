//! Signed bundle directories.
//!
//! Signing a directory writes three files into it:
//!
//! - `jdeploy.mf`: JSON object with a `timestamp` and, per file, the hex
//!   SHA-256 `hash` and a hex `signature` over that hash
//! - `jdeploy.mf.sig`: raw signature over the manifest bytes followed by the
//!   release version string
//! - `jdeploy.cer`: the signer's certificate chain, DER certificates
//!   concatenated leaf first
//!
//! Binding the version into the manifest signature stops a signed bundle
//! from being replayed as a different release.

use super::{TrustStore, certificate_key, is_valid_at, loader};
use crate::error::{Context, Error, ErrorExt, Result};
use crate::keys::PublicKey;
use crate::manifest::checksum;
use crate::signing::KeyStore;
use crate::utils::{fs, json};
use chrono::{NaiveDateTime, Utc};
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::{Signer, SigningKey};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};
use x509_cert::Certificate;
use x509_cert::der::{Decode, Reader, SliceReader};

/// Bundle manifest file name.
pub const MANIFEST_FILENAME: &str = "jdeploy.mf";
/// Manifest signature file name.
pub const MANIFEST_SIGNATURE_FILENAME: &str = "jdeploy.mf.sig";
/// Certificate chain file name.
pub const CERTIFICATE_FILENAME: &str = "jdeploy.cer";

const TIMESTAMP_KEY: &str = "timestamp";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Outcome of verifying a bundle directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    /// No certificate chain, manifest or manifest signature present
    NotSignedAtAll,
    /// The signer's chain does not lead to the trust store, or the leaf was
    /// not valid when the bundle was signed
    UntrustedCertificate,
    /// Every listed file matches its hash and signature
    SignedCorrectly,
    /// Manifest signature, a file hash or a file signature does not match
    SignatureMismatch,
}

impl VerificationResult {
    /// Whether the bundle can be installed.
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationResult::SignedCorrectly)
    }

    /// Human readable description.
    pub fn message(&self) -> &'static str {
        match self {
            VerificationResult::NotSignedAtAll => "The package is not signed",
            VerificationResult::UntrustedCertificate => {
                "The package is signed with an untrusted certificate"
            }
            VerificationResult::SignedCorrectly => "The package is signed correctly",
            VerificationResult::SignatureMismatch => {
                "The package signature does not match the contents"
            }
        }
    }
}

impl std::fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Source of the key and certificate chain used by [`sign_directory`].
pub trait KeyProvider {
    /// Private signing key.
    fn signing_key(&self) -> Result<SigningKey>;

    /// DER certificate chain, leaf first. The leaf must certify the
    /// signing key.
    fn certificate_chain(&self) -> Result<Vec<Vec<u8>>>;
}

/// Reads the key and chain from PEM files.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    key_path: PathBuf,
    certificate_path: PathBuf,
}

impl FileKeyProvider {
    /// `key_path` holds a PKCS#8 PEM private key, `certificate_path` one or
    /// more PEM certificates, leaf first.
    pub fn new(key_path: impl Into<PathBuf>, certificate_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
            certificate_path: certificate_path.into(),
        }
    }
}

impl KeyProvider for FileKeyProvider {
    fn signing_key(&self) -> Result<SigningKey> {
        let pem = std::fs::read_to_string(&self.key_path)
            .fs_context("reading private key", &self.key_path)?;
        Ok(SigningKey::from_pkcs8_pem(pem.trim())?)
    }

    fn certificate_chain(&self) -> Result<Vec<Vec<u8>>> {
        let bytes = std::fs::read(&self.certificate_path)
            .fs_context("reading certificate chain", &self.certificate_path)?;
        loader::pem_certificates(&bytes)
    }
}

/// Reads the key and chain stored under one keystore alias.
#[derive(Debug)]
pub struct KeyStoreKeyProvider<'a> {
    keystore: &'a KeyStore,
    alias: String,
}

impl<'a> KeyStoreKeyProvider<'a> {
    /// Provider for `alias`.
    pub fn new(keystore: &'a KeyStore, alias: impl Into<String>) -> Self {
        Self {
            keystore,
            alias: alias.into(),
        }
    }

    /// Provider for the keystore's configured default alias.
    pub fn for_default_alias(keystore: &'a KeyStore) -> Result<Self> {
        let alias = keystore
            .config()
            .alias_str()
            .context("keystore configuration has no alias")?
            .to_string();
        Ok(Self { keystore, alias })
    }
}

impl KeyProvider for KeyStoreKeyProvider<'_> {
    fn signing_key(&self) -> Result<SigningKey> {
        self.keystore
            .signing_key(&self.alias)?
            .ok_or_else(|| Error::MissingSigningKey {
                alias: self.alias.clone(),
            })
    }

    fn certificate_chain(&self) -> Result<Vec<Vec<u8>>> {
        self.keystore.certificate_chain(&self.alias)
    }
}

fn is_signature_file(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|n| n.to_str()),
        Some(MANIFEST_FILENAME | MANIFEST_SIGNATURE_FILENAME | CERTIFICATE_FILENAME)
    )
}

/// Signs every file in `dir` for release `version`.
///
/// Existing signature files are replaced.
///
/// # Errors
///
/// Fails if the provider has no certificates or if the leaf certificate
/// does not certify the provider's key.
pub fn sign_directory(version: &str, dir: &Path, provider: &dyn KeyProvider) -> Result<()> {
    let key = provider.signing_key()?;
    let chain = provider.certificate_chain()?;
    let leaf = chain
        .first()
        .context("key provider returned an empty certificate chain")?;
    if certificate_key(&Certificate::from_der(leaf)?)? != PublicKey::from(key.verifying_key()) {
        return Err(Error::Keystore(
            "signing key does not match the leaf certificate".into(),
        ));
    }

    let mut manifest = Map::new();
    manifest.insert(
        TIMESTAMP_KEY.into(),
        Value::String(Utc::now().format(TIMESTAMP_FORMAT).to_string()),
    );
    for file in fs::walk_files(dir, is_signature_file)? {
        let relative_path = fs::relative_slash_path(dir, &file)?;
        let hash = checksum::sha256(&file)?;
        let signature = key.sign(&hash);
        let mut entry = Map::new();
        entry.insert("hash".into(), Value::String(hex::encode(hash)));
        entry.insert("signature".into(), Value::String(hex::encode(signature.to_bytes())));
        manifest.insert(relative_path, Value::Object(entry));
    }
    let file_count = manifest.len() - 1;

    let manifest_bytes = json::to_pretty_vec(&manifest)?;
    let manifest_path = dir.join(MANIFEST_FILENAME);
    std::fs::write(&manifest_path, &manifest_bytes).fs_context("writing bundle manifest", &manifest_path)?;

    let signature = key.sign(&versioned(&manifest_bytes, version));
    let signature_path = dir.join(MANIFEST_SIGNATURE_FILENAME);
    std::fs::write(&signature_path, signature.to_bytes())
        .fs_context("writing manifest signature", &signature_path)?;

    let certificate_path = dir.join(CERTIFICATE_FILENAME);
    std::fs::write(&certificate_path, chain.concat())
        .fs_context("writing certificate chain", &certificate_path)?;

    log::info!("✓ Signed {} ({file_count} files, version {version})", dir.display());
    Ok(())
}

/// Verifies a directory signed by [`sign_directory`].
///
/// Checks run in order: certificate chain present, chain trusted, manifest
/// and signature present, manifest signature, leaf valid at the signing
/// timestamp, then each listed file. The first failure decides the result.
/// Files added after signing are not detected.
///
/// Certificates may carry Ed25519 or RSA keys; RSA signatures are PKCS#1
/// v1.5 with SHA-256.
///
/// # Errors
///
/// I/O errors while reading a listed file, and
/// [`Error::UnsupportedAlgorithm`] when the chain or the leaf key uses an
/// algorithm that cannot be checked.
pub fn verify_directory(version: &str, dir: &Path, trust_store: &TrustStore) -> Result<VerificationResult> {
    let certificate_path = dir.join(CERTIFICATE_FILENAME);
    if !certificate_path.is_file() {
        return Ok(VerificationResult::NotSignedAtAll);
    }
    let chain_bytes = std::fs::read(&certificate_path).fs_context("reading certificate chain", &certificate_path)?;
    let Some(chain) = parse_chain(&chain_bytes) else {
        log::warn!("unreadable certificate chain in {}", dir.display());
        return Ok(VerificationResult::UntrustedCertificate);
    };
    if !trust_store.verify_chain(&chain)? {
        return Ok(VerificationResult::UntrustedCertificate);
    }
    let leaf = &chain[0];
    let public_key = match certificate_key(leaf) {
        Ok(key) => key,
        Err(e @ Error::UnsupportedAlgorithm { .. }) => return Err(e),
        Err(e) => {
            log::warn!("unreadable leaf certificate key: {e}");
            return Ok(VerificationResult::UntrustedCertificate);
        }
    };

    let manifest_path = dir.join(MANIFEST_FILENAME);
    let signature_path = dir.join(MANIFEST_SIGNATURE_FILENAME);
    if !manifest_path.is_file() || !signature_path.is_file() {
        return Ok(VerificationResult::NotSignedAtAll);
    }
    let manifest_bytes = std::fs::read(&manifest_path).fs_context("reading bundle manifest", &manifest_path)?;
    let signature_bytes = std::fs::read(&signature_path).fs_context("reading manifest signature", &signature_path)?;

    if !public_key.verify(&versioned(&manifest_bytes, version), &signature_bytes) {
        log::warn!("manifest signature mismatch in {}", dir.display());
        return Ok(VerificationResult::SignatureMismatch);
    }

    let Ok(Value::Object(manifest)) = serde_json::from_slice::<Value>(&manifest_bytes) else {
        return Ok(VerificationResult::SignatureMismatch);
    };
    let signed_at = manifest
        .get(TIMESTAMP_KEY)
        .and_then(Value::as_str)
        .and_then(|ts| NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok());
    let Some(signed_at) = signed_at else {
        return Ok(VerificationResult::SignatureMismatch);
    };
    if !is_valid_at(leaf, signed_at.and_utc()) {
        log::warn!("signing certificate was not valid at {signed_at}");
        return Ok(VerificationResult::UntrustedCertificate);
    }

    for (relative_path, entry) in &manifest {
        if relative_path == TIMESTAMP_KEY {
            continue;
        }
        let Some(path) = resolve_inside(dir, relative_path) else {
            log::warn!("manifest entry escapes bundle: {relative_path}");
            return Ok(VerificationResult::SignatureMismatch);
        };
        if !path.is_file() {
            log::warn!("file not found: {relative_path}");
            return Ok(VerificationResult::SignatureMismatch);
        }
        let expected_hash = entry.get("hash").and_then(Value::as_str).and_then(|h| hex::decode(h).ok());
        let actual_hash = checksum::sha256(&path)?;
        if expected_hash.as_deref() != Some(actual_hash.as_slice()) {
            log::warn!("file hash mismatch for: {relative_path}");
            return Ok(VerificationResult::SignatureMismatch);
        }
        let file_ok = entry
            .get("signature")
            .and_then(Value::as_str)
            .and_then(|h| hex::decode(h).ok())
            .is_some_and(|raw| public_key.verify(&actual_hash, &raw));
        if !file_ok {
            log::warn!("file signature mismatch for: {relative_path}");
            return Ok(VerificationResult::SignatureMismatch);
        }
    }

    log::info!("✓ Verified {}", dir.display());
    Ok(VerificationResult::SignedCorrectly)
}

fn versioned(manifest: &[u8], version: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(manifest.len() + version.len());
    data.extend_from_slice(manifest);
    data.extend_from_slice(version.as_bytes());
    data
}

fn parse_chain(bytes: &[u8]) -> Option<Vec<Certificate>> {
    let mut reader = SliceReader::new(bytes).ok()?;
    let mut chain = Vec::new();
    while !reader.is_finished() {
        chain.push(Certificate::decode(&mut reader).ok()?);
    }
    (!chain.is_empty()).then_some(chain)
}

fn resolve_inside(dir: &Path, relative_path: &str) -> Option<PathBuf> {
    let rel = Path::new(relative_path);
    rel.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| dir.join(rel))
}
