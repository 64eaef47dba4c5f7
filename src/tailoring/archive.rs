//! In-place rewriting of jar archives for one platform.
//!
//! Entries are raw-copied, so their compression and timestamps survive.
//! The manifest is regenerated and signature files are dropped, since any
//! archive-level signature is invalid once entries are removed.

use super::Platform;
use super::ignore::ResolvedRules;
use super::namespaces::NamespaceResolution;
use crate::error::{ErrorExt, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";
const MANIFEST_MAX_LINE: usize = 72;
const NATIVE_EXTENSIONS: [&str; 4] = [".dll", ".so", ".dylib", ".jnilib"];

static PLATFORM_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.(win|mac|linux|darwin|windows)\.(x64|arm64|i386|amd64)(\.|$)")
        .expect("platform segment pattern is a valid literal")
});

/// Decides which archive entries survive a rewrite.
pub trait EntryFilter {
    /// Whether `entry` is copied to the rewritten archive.
    fn should_include(&self, entry: &str) -> bool;

    /// Whether the filter keeps every entry, so rewriting can be skipped.
    fn is_noop(&self) -> bool {
        false
    }
}

impl EntryFilter for ResolvedRules {
    fn should_include(&self, entry: &str) -> bool {
        ResolvedRules::should_include(self, entry)
    }

    fn is_noop(&self) -> bool {
        self.is_empty()
    }
}

impl EntryFilter for NamespaceResolution {
    fn should_include(&self, entry: &str) -> bool {
        NamespaceResolution::should_include(self, entry)
    }

    fn is_noop(&self) -> bool {
        NamespaceResolution::is_noop(self)
    }
}

/// Outcome of rewriting one archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Entries written, manifest included
    pub kept: usize,
    /// Entries excluded by the filter
    pub stripped: usize,
    /// Signature files and repeated names dropped
    pub dropped: usize,
}

/// Outcome of rewriting every archive under a directory.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Rewritten archives
    pub processed: Vec<(PathBuf, ArchiveStats)>,
    /// Archives that could not be rewritten, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

/// Rewrites `path` in place, keeping only entries `filter` includes.
///
/// The new archive is written to a temporary file next to the original
/// and renamed over it.
pub fn process_archive(path: &Path, filter: &dyn EntryFilter) -> Result<ArchiveStats> {
    if filter.is_noop() {
        log::debug!("no rules apply to {}, leaving it untouched", path.display());
        return Ok(ArchiveStats::default());
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).fs_context("creating temporary archive", dir)?;
    let stats = rewrite(path, tmp.as_file_mut(), filter)?;
    tmp.persist(path)?;

    log::info!(
        "✓ {}: kept {}, stripped {}, dropped {}",
        path.display(),
        stats.kept,
        stats.stripped,
        stats.dropped
    );
    Ok(stats)
}

/// Rewrites every `*.jar` under `dir`, logging and skipping failures.
pub fn process_archives_in(dir: &Path, filter: &dyn EntryFilter) -> Result<BatchReport> {
    let mut report = BatchReport::default();
    if !dir.is_dir() {
        return Ok(report);
    }
    for archive in crate::utils::fs::walk_files(dir, |_| false)? {
        if !is_jar(&archive) {
            continue;
        }
        match process_archive(&archive, filter) {
            Ok(stats) => report.processed.push((archive, stats)),
            Err(e) => {
                log::warn!("skipping {}: {e}", archive.display());
                report.failed.push((archive, e.to_string()));
            }
        }
    }
    Ok(report)
}

/// Writes a filtered copy of `original` as `<base>-<platform>.jar` beside it.
pub fn create_platform_specific_archive(
    original: &Path,
    platform: Platform,
    filter: &dyn EntryFilter,
) -> Result<PathBuf> {
    let stem = original
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("archive");
    let target = original.with_file_name(format!("{stem}-{}.jar", platform.identifier()));

    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).fs_context("creating temporary archive", dir)?;
    let stats = rewrite(original, tmp.as_file_mut(), filter)?;
    tmp.persist(&target)?;

    log::info!(
        "✓ created {} ({} entries, {} stripped)",
        target.display(),
        stats.kept,
        stats.stripped
    );
    Ok(target)
}

/// Guesses native namespaces in an archive.
///
/// Returns dotted namespaces for native code inside package-like
/// directories, and `/`-prefixed literal paths for native libraries at the
/// root or in shallow custom directories.
pub fn scan_native_namespaces(path: &Path) -> Result<BTreeSet<String>> {
    let file = File::open(path).fs_context("opening archive", path)?;
    let archive = ZipArchive::new(BufReader::new(file))?;

    let mut found = BTreeSet::new();
    for name in archive.file_names() {
        if name.ends_with('/') || !is_native_path(name) {
            continue;
        }
        if let Some(namespace) = parent_namespace(name)
            && is_native_namespace(&namespace)
        {
            found.insert(namespace);
        }
        if is_shallow_native_file(name) {
            found.insert(format!("/{name}"));
        }
    }
    Ok(found)
}

fn rewrite(source: &Path, target: &mut File, filter: &dyn EntryFilter) -> Result<ArchiveStats> {
    let file = File::open(source).fs_context("opening archive", source)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let mut writer = ZipWriter::new(BufWriter::new(target));

    let manifest = regenerated_manifest(&mut archive)?;
    writer.start_file(
        MANIFEST_ENTRY,
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
    )?;
    writer.write_all(&manifest)?;

    let mut stats = ArchiveStats {
        kept: 1,
        ..ArchiveStats::default()
    };
    let mut seen = HashSet::from([MANIFEST_ENTRY.to_string()]);

    for index in 0..archive.len() {
        let entry = match archive.by_index_raw(index) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("skipping unreadable entry #{index} in {}: {e}", source.display());
                stats.dropped += 1;
                continue;
            }
        };
        let name = entry.name().to_string();
        if name == MANIFEST_ENTRY {
            continue;
        }

        if seen.contains(&name) || is_signature_file(&name) {
            stats.dropped += 1;
            continue;
        }
        if !filter.should_include(&name) {
            log::debug!("stripping {name}");
            stats.stripped += 1;
            continue;
        }
        if let Err(e) = writer.raw_copy_file(entry) {
            log::warn!("skipping entry {name} in {}: {e}", source.display());
            stats.dropped += 1;
            continue;
        }
        seen.insert(name);
        stats.kept += 1;
    }

    writer
        .finish()?
        .flush()
        .fs_context("writing archive", source)?;
    Ok(stats)
}

/// Main section of the existing manifest, or a minimal one, with CRLF endings.
fn regenerated_manifest<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<u8>> {
    let mut text = String::new();
    if archive.index_for_name(MANIFEST_ENTRY).is_some() {
        archive.by_name(MANIFEST_ENTRY)?.read_to_string(&mut text)?;
    }
    Ok(main_section(&text))
}

fn main_section(manifest: &str) -> Vec<u8> {
    let lines: Vec<&str> = manifest
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .take_while(|l| !l.is_empty())
        .collect();

    let mut out = Vec::new();
    if !lines.iter().any(|l| l.starts_with("Manifest-Version:")) {
        write_manifest_line(&mut out, "Manifest-Version: 1.0");
    }
    for line in lines {
        if line.starts_with(' ') {
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(b"\r\n");
        } else {
            write_manifest_line(&mut out, line);
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

fn write_manifest_line(out: &mut Vec<u8>, line: &str) {
    let bytes = line.as_bytes();
    let mut cursor = 0;
    while cursor < bytes.len() {
        let limit = if cursor == 0 { MANIFEST_MAX_LINE } else { MANIFEST_MAX_LINE - 1 };
        let end = std::cmp::min(bytes.len(), cursor + limit);
        if cursor > 0 {
            out.push(b' ');
        }
        out.extend_from_slice(&bytes[cursor..end]);
        out.extend_from_slice(b"\r\n");
        cursor = end;
    }
}

fn is_signature_file(name: &str) -> bool {
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if file.contains('/') {
        return false;
    }
    let upper = file.to_ascii_uppercase();
    upper.starts_with("SIG-")
        || [".SF", ".RSA", ".DSA", ".EC"]
            .iter()
            .any(|ext| upper.ends_with(ext))
}

fn is_jar(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jar"))
}

fn has_native_extension(lower: &str) -> bool {
    NATIVE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn is_native_path(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    has_native_extension(&lower)
        || lower.contains("/native/")
        || lower.contains("/jni/")
        || lower.contains("/lib/")
        || (lower.contains(".native.") && lower.ends_with(".class"))
}

fn parent_namespace(name: &str) -> Option<String> {
    let (dir, _) = name.rsplit_once('/')?;
    Some(dir.replace('/', "."))
}

fn is_native_namespace(namespace: &str) -> bool {
    let lower = format!("{}.", namespace.to_ascii_lowercase());
    lower.contains(".native.")
        || lower.contains(".jni.")
        || lower.contains(".lib.")
        || PLATFORM_SEGMENT.is_match(&lower)
}

fn is_shallow_native_file(name: &str) -> bool {
    if !has_native_extension(&name.to_ascii_lowercase()) {
        return false;
    }
    let Some((dir, _)) = name.rsplit_once('/') else {
        return true;
    };
    let parts: Vec<&str> = dir.split('/').collect();
    if parts.len() <= 2 {
        return true;
    }
    let package_like = parts
        .iter()
        .filter(|p| {
            let mut chars = p.chars();
            chars.next().is_some_and(|c| c.is_ascii_lowercase())
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
        .count();
    package_like < parts.len() / 2
}
