//! Content manifests.
//!
//! A [`Manifest`] fingerprints every file below a bundle root so that a
//! later [`validate`](Manifest::validate) can tell whether the tree was
//! modified after it was built. Signing covers a canonical rendering of the
//! entries, which is what makes the fingerprint tamper-evident.

pub mod checksum;
mod validator;

pub use validator::{ManifestStatus, ValidationPolicy};

use crate::error::{Context, Error, ErrorExt, Result};
use crate::utils::{fs, json};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};

/// Default file name of a manifest written into the bundle it describes.
pub const MANIFEST_FILE_NAME: &str = "app.manifest.json";

/// One file recorded in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// `/`-separated path relative to the manifest root
    pub relative_path: String,
    /// Lower-case hex MD5 of the file contents
    pub checksum: String,
}

impl FileEntry {
    /// Rejects entries whose canonical line could be read more than one way.
    ///
    /// The checksum must be 32 lower-case hex digits. The path must be a
    /// non-empty relative path below the root with no control characters.
    pub fn check(&self) -> Result<()> {
        let invalid = |reason| Error::InvalidManifestEntry {
            path: self.relative_path.clone(),
            reason,
        };
        if self.checksum.len() != 32
            || !self
                .checksum
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(invalid("checksum is not a lower-case hex MD5"));
        }
        if self.relative_path.chars().any(char::is_control) {
            return Err(invalid("path contains control characters"));
        }
        let path = Path::new(&self.relative_path);
        if self.relative_path.is_empty()
            || !path.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid("path is not relative to the manifest root"));
        }
        Ok(())
    }
}

/// Fingerprint of a directory tree.
#[derive(Debug, Clone)]
pub struct Manifest {
    root: PathBuf,
    manifest_path: Option<PathBuf>,
    entries: Vec<FileEntry>,
    signature: Option<Signature>,
    identity: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ManifestDocument {
    files: BTreeMap<String, FileDigest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct FileDigest {
    md5: String,
}

impl Manifest {
    /// Creates an empty manifest rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest_path: None,
            entries: Vec::new(),
            signature: None,
            identity: None,
        }
    }

    /// Fingerprints every file below `root`.
    ///
    /// `manifest_path` is where the manifest will be saved; it is never
    /// recorded as an entry, nor is anything below it. When `signing_key`
    /// is given the manifest is signed after every entry has been added.
    ///
    /// # Arguments
    ///
    /// * `root` - Bundle directory to fingerprint
    /// * `manifest_path` - Output path of the manifest itself
    /// * `identity` - Optional label naming the signer
    /// * `signing_key` - Optional key used to sign the finished manifest
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use jdeploy_trust::manifest::{Manifest, MANIFEST_FILE_NAME};
    ///
    /// # fn example() -> jdeploy_trust::Result<()> {
    /// let root = Path::new("jdeploy-bundle");
    /// let out = root.join(MANIFEST_FILE_NAME);
    /// let manifest = Manifest::generate(root, &out, None, None)?;
    /// manifest.save(&out)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn generate(
        root: &Path,
        manifest_path: &Path,
        identity: Option<&str>,
        signing_key: Option<&SigningKey>,
    ) -> Result<Self> {
        let mut manifest = Self::new(root);
        manifest.manifest_path = Some(manifest_path.to_path_buf());
        manifest.identity = identity.map(str::to_string);

        for file in fs::walk_files(root, |p| p == manifest_path)? {
            let relative_path = fs::relative_slash_path(root, &file)?;
            let checksum = checksum::md5_hex(&file)?;
            log::debug!("manifest entry {relative_path} {checksum}");
            manifest.add_entry(FileEntry {
                relative_path,
                checksum,
            })?;
        }

        if let Some(key) = signing_key {
            manifest.sign(key);
        }

        log::info!(
            "Generated manifest for {} ({} files)",
            root.display(),
            manifest.entries.len()
        );
        Ok(manifest)
    }

    /// Adds an entry, replacing any existing entry with the same path.
    ///
    /// Fails for entries rejected by [`FileEntry::check`].
    pub fn add_entry(&mut self, entry: FileEntry) -> Result<()> {
        entry.check()?;
        match self
            .entries
            .iter_mut()
            .find(|e| e.relative_path == entry.relative_path)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self.signature = None;
        Ok(())
    }

    /// Root directory the entries are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Looks up the entry for a relative path.
    pub fn entry(&self, relative_path: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.relative_path == relative_path)
    }

    /// Signer label, if any.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Sets the signer label.
    pub fn set_identity(&mut self, identity: Option<String>) {
        self.identity = identity;
    }

    /// Signature over the canonical entry text, if signed.
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Path the manifest was generated for or loaded from.
    pub fn manifest_path(&self) -> Option<&Path> {
        self.manifest_path.as_deref()
    }

    /// Canonical text covered by the signature.
    ///
    /// Entries sorted by path, one `"<checksum>  <path>\n"` line each, so
    /// the signed bytes do not depend on traversal order.
    pub fn canonical_text(&self) -> String {
        let mut sorted: Vec<&FileEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        sorted
            .into_iter()
            .map(|e| format!("{}  {}\n", e.checksum, e.relative_path))
            .collect()
    }

    /// Signs the canonical text and stores the signature.
    pub fn sign(&mut self, key: &SigningKey) -> Signature {
        let signature = key.sign(self.canonical_text().as_bytes());
        self.signature = Some(signature);
        signature
    }

    /// Verifies the stored signature against `key`.
    ///
    /// Returns `false` when the manifest is unsigned.
    pub fn verify_signature(&self, key: &VerifyingKey) -> bool {
        match &self.signature {
            Some(signature) => key
                .verify_strict(self.canonical_text().as_bytes(), signature)
                .is_ok(),
            None => false,
        }
    }

    /// Re-walks the root and reports whether the tree still matches.
    ///
    /// I/O problems (an unreadable root, a file that vanishes mid-walk) are
    /// returned as errors; a tree that no longer matches is `Ok(false)`.
    pub fn validate(&self, key: Option<&VerifyingKey>, policy: &ValidationPolicy) -> Result<bool> {
        Ok(self.check(key, policy)?.is_valid())
    }

    /// Like [`validate`](Self::validate) but returns the reason for a failure.
    pub fn check(&self, key: Option<&VerifyingKey>, policy: &ValidationPolicy) -> Result<ManifestStatus> {
        validator::check(self, key, policy)
    }

    /// Relative paths of every recorded entry.
    pub(crate) fn entry_paths(&self) -> HashSet<&str> {
        self.entries.iter().map(|e| e.relative_path.as_str()).collect()
    }

    /// Serializes the manifest as pretty JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let doc = ManifestDocument {
            files: self
                .entries
                .iter()
                .map(|e| {
                    (
                        e.relative_path.clone(),
                        FileDigest {
                            md5: e.checksum.clone(),
                        },
                    )
                })
                .collect(),
            signature: self.signature.map(|s| BASE64.encode(s.to_bytes())),
            identity: self.identity.clone(),
        };
        json::to_pretty_vec(&doc)
    }

    /// Parses a manifest document whose entries are relative to `root`.
    ///
    /// Every entry must pass [`FileEntry::check`].
    pub fn from_json(bytes: &[u8], root: impl Into<PathBuf>) -> Result<Self> {
        let doc: ManifestDocument = serde_json::from_slice(bytes)?;
        let signature = match doc.signature {
            Some(encoded) => {
                let raw = BASE64.decode(encoded)?;
                Some(Signature::from_slice(&raw)?)
            }
            None => None,
        };
        let entries = doc
            .files
            .into_iter()
            .map(|(relative_path, digest)| {
                let entry = FileEntry {
                    relative_path,
                    checksum: digest.md5,
                };
                entry.check().map(|()| entry)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            root: root.into(),
            manifest_path: None,
            entries,
            signature,
            identity: doc.identity,
        })
    }

    /// Writes the manifest to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?).fs_context("writing manifest", path)
    }

    /// Loads a manifest whose root is the directory containing `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let root = path
            .parent()
            .context("manifest path has no parent directory")?;
        let bytes = std::fs::read(path).fs_context("reading manifest", path)?;
        let mut manifest = Self::from_json(&bytes, root)?;
        manifest.manifest_path = Some(path.to_path_buf());
        Ok(manifest)
    }
}
