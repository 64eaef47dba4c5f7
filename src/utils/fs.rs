//! File system utilities.
//!
//! Provides deterministic directory traversal with an explicit exclusion
//! predicate, idempotent directory helpers and recursive copies that keep
//! symlinks intact.

use crate::error::{Error, ErrorExt, Result};
use std::{
    io,
    path::{Path, PathBuf},
};

/// Lists every regular file below `root` in traversal order.
///
/// Directories are visited in file-name order so two walks over the same
/// tree yield the same sequence. Any path for which `exclude` returns `true`
/// is skipped; an excluded directory is not descended into.
///
/// # Arguments
///
/// * `root` - Directory to walk
/// * `exclude` - Predicate receiving the absolute path of each candidate
///
/// # Returns
///
/// * `Ok(Vec<PathBuf>)` - Absolute paths of the included files
/// * `Err` - If `root` is not a directory or cannot be traversed
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use jdeploy_trust::utils::fs::walk_files;
///
/// # fn example() -> jdeploy_trust::Result<()> {
/// let output = Path::new("bundle/app.manifest.json");
/// let files = walk_files(Path::new("bundle"), |p| p == output)?;
/// # Ok(())
/// # }
/// ```
pub fn walk_files<F>(root: &Path, exclude: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    if !root.is_dir() {
        return Err(Error::GenericError(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !exclude(e.path()));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Converts `path` to a `/`-separated string relative to `root`.
pub fn relative_slash_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root)?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Creates all of the directories of the specified path, erasing it first if specified.
pub fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        remove_dir_all(path)?;
    }
    std::fs::create_dir_all(path).fs_context("creating directory", path)
}

/// Removes the directory and its contents if it exists.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Fs {
            context: "removing directory",
            path: path.to_path_buf(),
            error: e,
        }),
    }
}

/// Makes a symbolic link to a directory.
#[cfg(unix)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a directory.
#[cfg(windows)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

/// Makes a symbolic link to a file.
#[cfg(unix)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a file.
#[cfg(windows)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

/// Recursively copies a directory from one path to another, creating any
/// parent directories of the destination path as necessary.
///
/// Preserves symlinks on platforms that support them.
/// Fails if the source path is not a directory or doesn't exist.
pub fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Err(Error::GenericError(format!("{from:?} does not exist")));
    }
    if !from.is_dir() {
        return Err(Error::GenericError(format!("{from:?} is not a Directory")));
    }

    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
    }

    for entry in walkdir::WalkDir::new(from) {
        let entry = entry?;
        let rel_path = entry.path().strip_prefix(from)?;
        let dest_path = to.join(rel_path);

        if entry.file_type().is_symlink() {
            let target = std::fs::read_link(entry.path()).fs_context("reading link", entry.path())?;
            if entry.path().is_dir() {
                symlink_dir(&target, &dest_path).fs_context("creating link", &dest_path)?;
            } else {
                symlink_file(&target, &dest_path).fs_context("creating link", &dest_path)?;
            }
        } else if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest_path).fs_context("creating directory", &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path).fs_context("copying file", entry.path())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, rel.as_bytes()).unwrap();
    }

    #[test]
    fn walk_is_sorted_and_honors_exclusion() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b.txt");
        touch(tmp.path(), "a/z.txt");
        touch(tmp.path(), "a/y.txt");
        touch(tmp.path(), "skip/inner.txt");

        let skip = tmp.path().join("skip");
        let files = walk_files(tmp.path(), |p| p == skip).unwrap();
        let rel: Vec<String> = files
            .iter()
            .map(|f| relative_slash_path(tmp.path(), f).unwrap())
            .collect();

        assert_eq!(rel, vec!["a/y.txt", "a/z.txt", "b.txt"]);
    }

    #[test]
    fn walk_rejects_missing_root() {
        let tmp = TempDir::new().unwrap();
        assert!(walk_files(&tmp.path().join("nope"), |_| false).is_err());
    }

    #[test]
    fn copy_dir_copies_nested_files() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        touch(&src, "lib/app.jar");
        touch(&src, "package.json");

        let dst = tmp.path().join("out/copy");
        copy_dir(&src, &dst).unwrap();

        assert_eq!(std::fs::read(dst.join("lib/app.jar")).unwrap(), b"lib/app.jar");
        assert!(dst.join("package.json").is_file());
    }

    #[test]
    fn remove_dir_all_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("gone");
        remove_dir_all(&dir).unwrap();
        create_dir_all(&dir, true).unwrap();
        assert!(dir.is_dir());
    }
}
