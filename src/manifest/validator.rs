//! Manifest validation against the live file tree.

use super::{Manifest, checksum};
use crate::error::Result;
use crate::utils::fs;
use ed25519_dalek::VerifyingKey;

/// Which kinds of drift make a manifest invalid.
///
/// Defaults: added files are tolerated, removed and changed files are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Reject files present on disk but absent from the manifest
    pub fail_if_added: bool,
    /// Reject manifest entries whose file is gone
    pub fail_if_removed: bool,
    /// Reject files whose checksum differs from the manifest
    pub fail_if_changed: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            fail_if_added: false,
            fail_if_removed: true,
            fail_if_changed: true,
        }
    }
}

impl ValidationPolicy {
    /// Policy rejecting any difference at all.
    pub fn strict() -> Self {
        Self {
            fail_if_added: true,
            fail_if_removed: true,
            fail_if_changed: true,
        }
    }

    /// Sets whether added files fail validation.
    pub fn fail_if_added(mut self, value: bool) -> Self {
        self.fail_if_added = value;
        self
    }

    /// Sets whether removed files fail validation.
    pub fn fail_if_removed(mut self, value: bool) -> Self {
        self.fail_if_removed = value;
        self
    }

    /// Sets whether changed files fail validation.
    pub fn fail_if_changed(mut self, value: bool) -> Self {
        self.fail_if_changed = value;
        self
    }
}

/// Outcome of checking a manifest against its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestStatus {
    /// Tree and signature match
    Valid,
    /// Files on disk that the manifest does not list
    FilesAdded(Vec<String>),
    /// Manifest entries with no file on disk
    FilesRemoved(Vec<String>),
    /// Files whose contents changed
    FilesChanged(Vec<String>),
    /// A key was supplied but the manifest carries no signature
    Unsigned,
    /// The signature does not verify under the supplied key
    SignatureMismatch,
}

impl ManifestStatus {
    /// Whether the manifest passed.
    pub fn is_valid(&self) -> bool {
        matches!(self, ManifestStatus::Valid)
    }
}

pub(super) fn check(
    manifest: &Manifest,
    key: Option<&VerifyingKey>,
    policy: &ValidationPolicy,
) -> Result<ManifestStatus> {
    let root = manifest.root();

    if policy.fail_if_removed || policy.fail_if_changed {
        let mut removed = Vec::new();
        let mut changed = Vec::new();
        for entry in manifest.entries() {
            let path = root.join(&entry.relative_path);
            if !path.is_file() {
                removed.push(entry.relative_path.clone());
                continue;
            }
            if policy.fail_if_changed && checksum::md5_hex(&path)? != entry.checksum {
                changed.push(entry.relative_path.clone());
            }
        }
        if policy.fail_if_removed && !removed.is_empty() {
            log::warn!("{} manifest entries missing under {}", removed.len(), root.display());
            return Ok(ManifestStatus::FilesRemoved(removed));
        }
        if !changed.is_empty() {
            log::warn!("{} files changed under {}", changed.len(), root.display());
            return Ok(ManifestStatus::FilesChanged(changed));
        }
    }

    if policy.fail_if_added {
        let known = manifest.entry_paths();
        let manifest_path = manifest.manifest_path();
        let mut added = Vec::new();
        for file in fs::walk_files(root, |p| Some(p) == manifest_path)? {
            let rel = fs::relative_slash_path(root, &file)?;
            if !known.contains(rel.as_str()) {
                added.push(rel);
            }
        }
        if !added.is_empty() {
            log::warn!("{} unexpected files under {}", added.len(), root.display());
            return Ok(ManifestStatus::FilesAdded(added));
        }
    }

    if let Some(key) = key {
        if manifest.signature().is_none() {
            return Ok(ManifestStatus::Unsigned);
        }
        if !manifest.verify_signature(key) {
            return Ok(ManifestStatus::SignatureMismatch);
        }
    }

    Ok(ManifestStatus::Valid)
}
