//! File checksum calculation.
//!
//! Content manifests record an MD5 digest per file. The digest only detects
//! change; integrity comes from the signature over the whole manifest.
//! Signed bundle directories use SHA-256 per file.

use crate::error::{ErrorExt, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Calculates the MD5 checksum of a file.
///
/// Reads the file in 8KB chunks like [`sha256`].
///
/// # Returns
///
/// * `Ok(String)` - Lower-case hex digest (32 characters)
/// * `Err` - If the file cannot be read
pub fn md5_hex(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).fs_context("opening file for checksum", path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .fs_context("reading file for checksum", path)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }

    Ok(format!("{:x}", context.finalize()))
}

/// Calculates the SHA-256 digest of a file.
///
/// Reads the file in 8KB chunks to handle large files efficiently.
pub fn sha256(path: &Path) -> Result<[u8; 32]> {
    let mut file = std::fs::File::open(path).fs_context("opening file for hashing", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .fs_context("reading file for hash calculation", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}

/// Calculates the SHA-256 digest of a file as lower-case hex.
pub fn sha256_hex(path: &Path) -> Result<String> {
    Ok(hex::encode(sha256(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn known_digests() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("hello.txt");
        std::fs::write(&file, b"hello").unwrap();

        assert_eq!(md5_hex(&file).unwrap(), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(
            sha256_hex(&file).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn md5_spans_multiple_chunks() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("large.bin");
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&file, &data).unwrap();

        assert_eq!(md5_hex(&file).unwrap(), format!("{:x}", md5::compute(&data)));
    }

    #[test]
    fn missing_file_reports_path() {
        let tmp = TempDir::new().unwrap();
        let err = md5_hex(&tmp.path().join("missing")).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
