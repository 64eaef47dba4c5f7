//! Package signature chain.
//!
//! A published package version is described by a [`PackageDescriptor`]. Each
//! developer identity attached to the package signs the descriptor's
//! canonical payload with its own key, so installers can check every
//! co-signer independently:
//!
//! ```text
//! identity (self-signed) ──> package signature ──> descriptor
//!     ^ fetched from its https URL
//! ```

mod keystore;

pub use keystore::KeyStore;

use crate::error::{Context, Error, Result};
use crate::identity::DeveloperIdentity;
use crate::keys::PublicKey;
use crate::utils::text;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Version of the canonical payload layout produced by
/// [`PackageDescriptor::canonical_payload`].
pub const PAYLOAD_VERSION: u32 = 1;

/// The published coordinates of one package version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Registry base URL, e.g. `https://registry.npmjs.org/`
    pub registry_url: String,
    /// Package name as published
    pub package_name: String,
    /// Package version as published
    pub package_version: String,
}

impl PackageDescriptor {
    /// Creates a descriptor.
    pub fn new(
        registry_url: impl Into<String>,
        package_name: impl Into<String>,
        package_version: impl Into<String>,
    ) -> Self {
        Self {
            registry_url: registry_url.into(),
            package_name: package_name.into(),
            package_version: package_version.into(),
        }
    }

    /// Reads name and version from a `package.json` value.
    pub fn from_package_json(registry_url: impl Into<String>, package_json: &Value) -> Result<Self> {
        let name = package_json
            .get("name")
            .and_then(Value::as_str)
            .context("package.json has no name")?;
        let version = package_json
            .get("version")
            .and_then(Value::as_str)
            .context("package.json has no version")?;
        Ok(Self::new(registry_url, name, version))
    }

    /// Bytes every identity signs.
    ///
    /// # Errors
    ///
    /// [`Error::LineBreakInField`] when a field contains a line break.
    pub fn canonical_payload(&self) -> Result<String> {
        text::single_line("registryUrl", &self.registry_url)?;
        text::single_line("packageName", &self.package_name)?;
        text::single_line("version", &self.package_version)?;
        Ok(format!(
            "registryUrl={}\npackageName={}\nversion={}\n",
            self.registry_url, self.package_name, self.package_version
        ))
    }
}

/// Signatures produced by one signing pass, keyed by identity URL.
///
/// The timestamp records when the pass ran; it is not covered by any
/// signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSignatures {
    /// Canonical payload layout the signatures were made over
    pub payload_version: u32,
    /// When the signing pass ran
    pub timestamp: DateTime<Utc>,
    /// Base64 signatures keyed by identity URL
    pub signatures: BTreeMap<String, String>,
}

impl PackageSignatures {
    /// Decoded signature bytes for `identity_url`, if present and valid
    /// base64.
    pub fn signature_for(&self, identity_url: &str) -> Option<Vec<u8>> {
        let encoded = self.signatures.get(identity_url)?;
        BASE64.decode(encoded).ok()
    }

    /// Stores the signatures in `package_json` under `jdeploy.signatures`
    /// and `jdeploy.timestamp`, creating the `jdeploy` object if needed.
    pub fn embed_into(&self, package_json: &mut Value) -> Result<()> {
        let root = package_json
            .as_object_mut()
            .context("package.json is not an object")?;
        let jdeploy = root
            .entry("jdeploy")
            .or_insert_with(|| Value::Object(Default::default()))
            .as_object_mut()
            .context("package.json jdeploy property is not an object")?;
        jdeploy.insert("signatures".into(), serde_json::to_value(&self.signatures)?);
        jdeploy.insert("timestamp".into(), Value::String(self.timestamp.to_rfc3339()));
        jdeploy.insert("signaturePayloadVersion".into(), Value::from(self.payload_version));
        Ok(())
    }

    /// Reads signatures previously stored by [`embed_into`](Self::embed_into).
    ///
    /// Returns `Ok(None)` when the package carries no signatures.
    pub fn from_package_json(package_json: &Value) -> Result<Option<Self>> {
        let Some(jdeploy) = package_json.get("jdeploy") else {
            return Ok(None);
        };
        let Some(signatures) = jdeploy.get("signatures") else {
            return Ok(None);
        };
        let signatures: BTreeMap<String, String> = serde_json::from_value(signatures.clone())?;
        let timestamp = jdeploy
            .get("timestamp")
            .and_then(Value::as_str)
            .context("jdeploy.timestamp missing")?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .context("jdeploy.timestamp is not RFC 3339")?
            .with_timezone(&Utc);
        let payload_version = jdeploy
            .get("signaturePayloadVersion")
            .and_then(Value::as_u64)
            .map_or(Ok(PAYLOAD_VERSION), u32::try_from)
            .context("jdeploy.signaturePayloadVersion out of range")?;
        Ok(Some(Self {
            payload_version,
            timestamp,
            signatures,
        }))
    }
}

/// Signs package descriptors on behalf of developer identities.
///
/// # Examples
///
/// ```no_run
/// use jdeploy_trust::identity::DeveloperIdentity;
/// use jdeploy_trust::settings::KeystoreConfig;
/// use jdeploy_trust::signing::{KeyStore, PackageDescriptor, PackageSigner};
///
/// # fn example(identity: DeveloperIdentity) -> jdeploy_trust::Result<()> {
/// let keystore = KeyStore::open(KeystoreConfig::new("jdeploy.keystore.toml").password("changeit"))?;
/// let signer = PackageSigner::new(&keystore);
/// let descriptor = PackageDescriptor::new("https://registry.npmjs.org/", "my-app", "1.0.0");
/// let signatures = signer.sign(&descriptor, &[identity])?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PackageSigner<'a> {
    keystore: &'a KeyStore,
}

impl<'a> PackageSigner<'a> {
    /// Creates a signer drawing keys from `keystore`.
    pub fn new(keystore: &'a KeyStore) -> Self {
        Self { keystore }
    }

    /// Signs `descriptor` once per identity.
    ///
    /// # Errors
    ///
    /// Fails without producing any signature if, for some identity:
    /// - no key is stored under its URL or any alias URL
    ///   ([`Error::MissingSigningKey`])
    /// - its declared public key differs from the stored key
    ///   ([`Error::KeyMismatch`])
    /// - it has no valid self-signature ([`Error::MissingSelfSignature`])
    ///
    /// A descriptor field containing a line break fails with
    /// [`Error::LineBreakInField`].
    pub fn sign(
        &self,
        descriptor: &PackageDescriptor,
        identities: &[DeveloperIdentity],
    ) -> Result<PackageSignatures> {
        let payload = descriptor.canonical_payload()?;
        let mut signatures = BTreeMap::new();

        for identity in identities {
            let key = self.key_for(identity)?;
            if identity.public_key != Some(PublicKey::from(key.verifying_key())) {
                return Err(Error::KeyMismatch {
                    identity_url: identity.identity_url.clone(),
                });
            }
            if !identity.verify_self() {
                return Err(Error::MissingSelfSignature {
                    identity_url: identity.identity_url.clone(),
                });
            }
            let signature = key.sign(payload.as_bytes());
            signatures.insert(
                identity.identity_url.clone(),
                BASE64.encode(signature.to_bytes()),
            );
            log::debug!(
                "signed {}@{} as {}",
                descriptor.package_name,
                descriptor.package_version,
                identity.identity_url
            );
        }

        log::info!(
            "Signed {}@{} with {} identities",
            descriptor.package_name,
            descriptor.package_version,
            signatures.len()
        );
        Ok(PackageSignatures {
            payload_version: PAYLOAD_VERSION,
            timestamp: Utc::now(),
            signatures,
        })
    }

    fn key_for(&self, identity: &DeveloperIdentity) -> Result<SigningKey> {
        for url in identity.urls() {
            if let Some(key) = self.keystore.signing_key(url)? {
                return Ok(key);
            }
        }
        Err(Error::MissingSigningKey {
            alias: identity.identity_url.clone(),
        })
    }
}

/// Returns the identities whose signature over `descriptor` verifies.
///
/// An identity is dropped when its self-signature is invalid, when no
/// signature is recorded for its URL, or when that signature fails. Other
/// identities are unaffected. Signatures made over a payload layout other
/// than [`PAYLOAD_VERSION`], or for a descriptor with no canonical payload,
/// verify nothing.
pub fn verify_all<'i>(
    descriptor: &PackageDescriptor,
    signatures: &PackageSignatures,
    identities: &'i [DeveloperIdentity],
) -> Vec<&'i DeveloperIdentity> {
    if signatures.payload_version != PAYLOAD_VERSION {
        log::warn!(
            "unsupported signature payload version {}",
            signatures.payload_version
        );
        return Vec::new();
    }
    let payload = match descriptor.canonical_payload() {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!("descriptor cannot be verified: {e}");
            return Vec::new();
        }
    };

    identities
        .iter()
        .filter(|identity| {
            let trusted = identity.verify_self()
                && match (&identity.public_key, signatures.signature_for(&identity.identity_url)) {
                    (Some(key), Some(signature)) => key.verify(payload.as_bytes(), &signature),
                    _ => false,
                };
            if !trusted {
                log::warn!("signature by {} did not verify", identity.identity_url);
            }
            trusted
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    fn signed_identity(url: &str, store: &mut KeyStore) -> DeveloperIdentity {
        let key = SigningKey::generate(&mut OsRng);
        let mut identity = DeveloperIdentity::new(url, url);
        identity.self_sign(&key).unwrap();
        store.insert(url, &key).unwrap();
        identity
    }

    fn descriptor() -> PackageDescriptor {
        PackageDescriptor::new("https://registry.npmjs.org/", "demo-app", "1.2.3")
    }

    #[test]
    fn canonical_payload_layout() {
        assert_eq!(
            descriptor().canonical_payload().unwrap(),
            "registryUrl=https://registry.npmjs.org/\npackageName=demo-app\nversion=1.2.3\n"
        );
    }

    #[test]
    fn line_break_in_descriptor_is_rejected() {
        let mut store = KeyStore::in_memory();
        let a = signed_identity("https://a.example.com/id.json", &mut store);
        let identities = vec![a];
        let signatures = PackageSigner::new(&store).sign(&descriptor(), &identities).unwrap();

        let mut forged = descriptor();
        forged.package_name = "demo-app\nversion=1.2.3".into();
        forged.package_version = String::new();
        assert!(matches!(
            forged.canonical_payload().unwrap_err(),
            Error::LineBreakInField { field: "packageName" }
        ));
        let err = PackageSigner::new(&store).sign(&forged, &identities).unwrap_err();
        assert!(matches!(err, Error::LineBreakInField { .. }));
        assert!(verify_all(&forged, &signatures, &identities).is_empty());

        let mut carriage = descriptor();
        carriage.registry_url = "https://registry.npmjs.org/\r".into();
        assert!(carriage.canonical_payload().is_err());
    }

    #[test]
    fn co_signers_verify_independently() {
        let mut store = KeyStore::in_memory();
        let a = signed_identity("https://a.example.com/id.json", &mut store);
        let b = signed_identity("https://b.example.com/id.json", &mut store);
        let identities = vec![a.clone(), b.clone()];

        let mut signatures = PackageSigner::new(&store).sign(&descriptor(), &identities).unwrap();
        assert_eq!(verify_all(&descriptor(), &signatures, &identities).len(), 2);

        let b_sig = signatures.signatures[&b.identity_url].clone();
        signatures.signatures.insert(a.identity_url.clone(), b_sig);
        let trusted = verify_all(&descriptor(), &signatures, &identities);
        assert_eq!(trusted, vec![&b]);
    }

    #[test]
    fn different_version_does_not_verify() {
        let mut store = KeyStore::in_memory();
        let a = signed_identity("https://a.example.com/id.json", &mut store);
        let identities = vec![a];
        let signatures = PackageSigner::new(&store).sign(&descriptor(), &identities).unwrap();

        let mut bumped = descriptor();
        bumped.package_version = "1.2.4".into();
        assert!(verify_all(&bumped, &signatures, &identities).is_empty());
    }

    #[test]
    fn key_found_through_alias_url() {
        let mut store = KeyStore::in_memory();
        let key = SigningKey::generate(&mut OsRng);
        let mut identity = DeveloperIdentity::new("https://a.example.com/id.json", "A");
        identity.alias_urls = vec!["https://github.com/a".into()];
        identity.self_sign(&key).unwrap();
        store.insert("https://github.com/a", &key).unwrap();

        let signatures = PackageSigner::new(&store).sign(&descriptor(), &[identity.clone()]).unwrap();
        assert!(signatures.signatures.contains_key(&identity.identity_url));
    }

    #[test]
    fn provisioning_errors_are_fatal() {
        let mut store = KeyStore::in_memory();
        let key = SigningKey::generate(&mut OsRng);

        let mut unsigned = DeveloperIdentity::new("https://u.example.com/id.json", "U");
        unsigned.public_key = Some(key.verifying_key().into());
        store.insert(&unsigned.identity_url, &key).unwrap();
        let err = PackageSigner::new(&store).sign(&descriptor(), &[unsigned]).unwrap_err();
        assert!(matches!(err, Error::MissingSelfSignature { .. }));

        let mut mismatched = DeveloperIdentity::new("https://m.example.com/id.json", "M");
        mismatched.self_sign(&SigningKey::generate(&mut OsRng)).unwrap();
        store.insert(&mismatched.identity_url, &key).unwrap();
        let err = PackageSigner::new(&store).sign(&descriptor(), &[mismatched]).unwrap_err();
        assert!(matches!(err, Error::KeyMismatch { .. }));

        let mut keyless = DeveloperIdentity::new("https://k.example.com/id.json", "K");
        keyless.self_sign(&key).unwrap();
        let err = PackageSigner::new(&store).sign(&descriptor(), &[keyless]).unwrap_err();
        assert!(matches!(err, Error::MissingSigningKey { .. }));
    }

    #[test]
    fn package_json_embedding_round_trips() {
        let mut store = KeyStore::in_memory();
        let a = signed_identity("https://a.example.com/id.json", &mut store);
        let signatures = PackageSigner::new(&store).sign(&descriptor(), &[a]).unwrap();

        let mut package_json = serde_json::json!({"name": "demo-app", "version": "1.2.3"});
        signatures.embed_into(&mut package_json).unwrap();
        let read = PackageSignatures::from_package_json(&package_json).unwrap().unwrap();
        assert_eq!(read.signatures, signatures.signatures);
        assert_eq!(read.payload_version, PAYLOAD_VERSION);

        let plain = serde_json::json!({"name": "x"});
        assert!(PackageSignatures::from_package_json(&plain).unwrap().is_none());
    }
}
