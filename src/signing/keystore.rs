//! Private key storage.
//!
//! The keystore is a TOML file holding Ed25519 private keys as PKCS#8 PEM,
//! one entry per alias. Identity keys use the identity URL as their alias.
//! When the [`KeystoreConfig`] carries a password new entries are written as
//! encrypted PKCS#8 (PBES2, PBKDF2-SHA256 + AES-256-CBC) and encrypted
//! entries can be read back. An entry may also carry the PEM certificate
//! chain that goes with the key, leaf first.

use crate::error::{Error, ErrorExt, Result};
use crate::settings::KeystoreConfig;
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use pkcs8::{LineEnding, PrivateKeyInfo, pkcs5::pbes2};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const PBKDF2_ITERATIONS: u32 = 100_000;
const ENCRYPTED_LABEL: &str = "ENCRYPTED PRIVATE KEY";

#[derive(Serialize, Deserialize, Default)]
struct KeyStoreFile {
    #[serde(default, rename = "entry")]
    entries: Vec<KeyEntry>,
}

#[derive(Serialize, Deserialize, Clone)]
struct KeyEntry {
    alias: String,
    private_key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    certificates: Vec<String>,
}

/// Alias-indexed signing keys.
pub struct KeyStore {
    config: KeystoreConfig,
    entries: BTreeMap<String, KeyEntry>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("config", &self.config)
            .field("aliases", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KeyStore {
    /// Opens the keystore described by `config`.
    ///
    /// A configured path that does not exist yet yields an empty store that
    /// [`save`](Self::save) will create.
    pub fn open(config: KeystoreConfig) -> Result<Self> {
        let mut entries = BTreeMap::new();
        if let Some(path) = config.path() {
            if path.is_file() {
                let text = std::fs::read_to_string(path).fs_context("reading keystore", path)?;
                let file: KeyStoreFile = toml::from_str(&text)?;
                for entry in file.entries {
                    entries.insert(entry.alias.clone(), entry);
                }
                log::debug!("opened keystore {} ({} entries)", path.display(), entries.len());
            }
        }
        Ok(Self { config, entries })
    }

    /// Empty keystore with no backing file and no password.
    pub fn in_memory() -> Self {
        Self {
            config: KeystoreConfig::in_memory(),
            entries: BTreeMap::new(),
        }
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &KeystoreConfig {
        &self.config
    }

    /// Stored aliases in sorted order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Whether an entry exists for `alias`.
    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    /// Stores `key` under `alias`, replacing any previous entry.
    pub fn insert(&mut self, alias: impl Into<String>, key: &SigningKey) -> Result<()> {
        self.insert_with_chain(alias, key, &[])
    }

    /// Stores `key` and its DER certificate chain (leaf first) under `alias`.
    pub fn insert_with_chain(
        &mut self,
        alias: impl Into<String>,
        key: &SigningKey,
        chain: &[Vec<u8>],
    ) -> Result<()> {
        let alias = alias.into();
        let private_key = match self.config.password_str() {
            Some(password) => encrypt_key(key, password)?,
            None => key.to_pkcs8_pem(LineEnding::LF)?.to_string(),
        };
        let certificates = chain
            .iter()
            .map(|der| pem::encode(&pem::Pem::new("CERTIFICATE", der.clone())))
            .collect();
        self.entries.insert(
            alias.clone(),
            KeyEntry {
                alias,
                private_key,
                certificates,
            },
        );
        Ok(())
    }

    /// Decodes the private key stored under `alias`.
    ///
    /// Returns `Ok(None)` when there is no such entry.
    pub fn signing_key(&self, alias: &str) -> Result<Option<SigningKey>> {
        let Some(entry) = self.entries.get(alias) else {
            return Ok(None);
        };
        let pem = entry.private_key.trim();
        let key = if pem.contains(ENCRYPTED_LABEL) {
            let password = self.config.password_str().ok_or_else(|| {
                Error::Keystore(format!("entry {alias} is encrypted but no password was configured"))
            })?;
            SigningKey::from_pkcs8_encrypted_pem(pem, password)?
        } else {
            SigningKey::from_pkcs8_pem(pem)?
        };
        Ok(Some(key))
    }

    /// Decodes the key for the configured default alias.
    pub fn default_signing_key(&self) -> Result<Option<SigningKey>> {
        match self.config.alias_str() {
            Some(alias) => self.signing_key(alias),
            None => Ok(None),
        }
    }

    /// DER certificates stored with `alias`, leaf first.
    pub fn certificate_chain(&self, alias: &str) -> Result<Vec<Vec<u8>>> {
        let Some(entry) = self.entries.get(alias) else {
            return Ok(Vec::new());
        };
        entry
            .certificates
            .iter()
            .map(|text| Ok(pem::parse(text)?.into_contents()))
            .collect()
    }

    /// Writes the store back to its configured path.
    pub fn save(&self) -> Result<()> {
        let path = self
            .config
            .path()
            .ok_or_else(|| Error::Keystore("in-memory keystore has no path to save to".into()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).fs_context("creating keystore directory", parent)?;
        }
        let file = KeyStoreFile {
            entries: self.entries.values().cloned().collect(),
        };
        std::fs::write(path, toml::to_string_pretty(&file)?).fs_context("writing keystore", path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .fs_context("restricting keystore permissions", path)?;
        }

        log::info!("Saved keystore {}", path.display());
        Ok(())
    }
}

fn encrypt_key(key: &SigningKey, password: &str) -> Result<String> {
    let der = key.to_pkcs8_der()?;
    let info = PrivateKeyInfo::try_from(der.as_bytes())?;

    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(PBKDF2_ITERATIONS, &salt, &iv)
        .map_err(pkcs8::Error::from)?;
    let encrypted = info.encrypt_with_params(params, password)?;
    Ok(encrypted.to_pem(ENCRYPTED_LABEL, LineEnding::LF)?.to_string())
}
