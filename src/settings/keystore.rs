//! Keystore location and credentials.

use std::path::{Path, PathBuf};

/// Where signing keys live and how to unlock them.
///
/// Passed explicitly to [`KeyStore::open`](crate::signing::KeyStore::open);
/// nothing is read from the environment.
///
/// # Examples
///
/// ```no_run
/// use jdeploy_trust::settings::KeystoreConfig;
///
/// let config = KeystoreConfig::new("keys/jdeploy.keystore.toml")
///     .password("changeit")
///     .alias("https://example.com/dev.json");
/// ```
#[derive(Clone, Default)]
pub struct KeystoreConfig {
    path: Option<PathBuf>,
    password: Option<String>,
    alias: Option<String>,
}

impl std::fmt::Debug for KeystoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreConfig")
            .field("path", &self.path)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("alias", &self.alias)
            .finish()
    }
}

impl KeystoreConfig {
    /// Keystore backed by the file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Keystore with no backing file.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Sets the password protecting private key entries.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the alias used when no identity selects a key.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Entry password, if any.
    pub fn password_str(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Default alias, if any.
    pub fn alias_str(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}
