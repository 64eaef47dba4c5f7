//! Java KeyStore (JKS) certificate reader.
//!
//! Only the parts needed for a trust store are decoded: trusted certificate
//! entries and the certificate chains attached to private key entries. Key
//! material itself is skipped unread.
//!
//! Layout (big endian):
//!
//! ```text
//! u32 magic 0xFEEDFEED | u32 version (1|2) | u32 count
//! entry*: u32 tag | utf alias | u64 millis
//!   tag 1: u32 len + key bytes | u32 chain len | cert*
//!   tag 2: cert
//! cert: [v2: utf type] | u32 len + bytes
//! 20-byte SHA-1 over utf16be(password) + "Mighty Aphrodite" + everything above
//! ```

use crate::error::Result;
use sha1::{Digest, Sha1};

const MAGIC: u32 = 0xFEED_FEED;
const PRIVATE_KEY_ENTRY: u32 = 1;
const TRUSTED_CERT_ENTRY: u32 = 2;
const DIGEST_LEN: usize = 20;
const WHITENER: &[u8] = b"Mighty Aphrodite";

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| crate::Error::GenericError("truncated JKS data".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip_u64(&mut self) -> Result<()> {
        self.take(8).map(|_| ())
    }

    fn utf(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    fn blob(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn certificate(&mut self, version: u32) -> Result<Option<Vec<u8>>> {
        let cert_type = if version == 2 { self.utf()? } else { "X.509".to_string() };
        let bytes = self.blob()?;
        if cert_type == "X.509" {
            Ok(Some(bytes.to_vec()))
        } else {
            log::warn!("skipping {cert_type} certificate in JKS");
            Ok(None)
        }
    }
}

/// Extracts DER certificates from a JKS file.
///
/// When `password` is given the trailing integrity digest must match.
pub(super) fn trusted_certificates(data: &[u8], password: Option<&str>) -> Result<Vec<Vec<u8>>> {
    if data.len() < 12 + DIGEST_LEN {
        crate::bail!("file too short to be a JKS keystore");
    }
    let (body, digest) = data.split_at(data.len() - DIGEST_LEN);
    if let Some(password) = password {
        if integrity_digest(password, body).as_slice() != digest {
            crate::bail!("JKS integrity check failed: wrong password or corrupted file");
        }
    }

    let mut reader = Reader { data: body, pos: 0 };
    if reader.u32()? != MAGIC {
        crate::bail!("not a JKS keystore");
    }
    let version = reader.u32()?;
    if version != 1 && version != 2 {
        crate::bail!("unsupported JKS version {version}");
    }
    let count = reader.u32()?;

    let mut certificates = Vec::new();
    for _ in 0..count {
        let tag = reader.u32()?;
        let alias = reader.utf()?;
        reader.skip_u64()?;
        match tag {
            PRIVATE_KEY_ENTRY => {
                reader.blob()?;
                let chain_len = reader.u32()?;
                for _ in 0..chain_len {
                    certificates.extend(reader.certificate(version)?);
                }
            }
            TRUSTED_CERT_ENTRY => {
                certificates.extend(reader.certificate(version)?);
            }
            other => crate::bail!("unsupported JKS entry type {other} for {alias}"),
        }
    }
    Ok(certificates)
}

fn integrity_digest(password: &str, body: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha1::new();
    for unit in password.encode_utf16() {
        hasher.update(unit.to_be_bytes());
    }
    hasher.update(WHITENER);
    hasher.update(body);
    hasher.finalize().into()
}

/// Builds a JKS file of trusted certificate entries.
#[cfg(test)]
fn encode_trusted(entries: &[(&str, &[u8])], password: &str) -> Vec<u8> {
    fn utf(out: &mut Vec<u8>, s: &str) {
        out.extend((s.len() as u16).to_be_bytes());
        out.extend(s.as_bytes());
    }
    let mut out = Vec::new();
    out.extend(MAGIC.to_be_bytes());
    out.extend(2u32.to_be_bytes());
    out.extend((entries.len() as u32).to_be_bytes());
    for (alias, der) in entries {
        out.extend(TRUSTED_CERT_ENTRY.to_be_bytes());
        utf(&mut out, alias);
        out.extend(0u64.to_be_bytes());
        utf(&mut out, "X.509");
        out.extend((der.len() as u32).to_be_bytes());
        out.extend(*der);
    }
    let digest = integrity_digest(password, &out);
    out.extend(digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_trusted_entries_and_checks_password() {
        let data = encode_trusted(&[("a", b"cert-a".as_slice()), ("b", b"cert-b".as_slice())], "changeit");

        let certs = trusted_certificates(&data, Some("changeit")).unwrap();
        assert_eq!(certs, vec![b"cert-a".to_vec(), b"cert-b".to_vec()]);

        assert_eq!(trusted_certificates(&data, None).unwrap().len(), 2);
        assert!(trusted_certificates(&data, Some("wrong")).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(trusted_certificates(&[0u8; 40], None).is_err());
        let mut data = encode_trusted(&[("a", b"cert-a".as_slice())], "pw");
        data.truncate(data.len() - 30);
        assert!(trusted_certificates(&data, None).is_err());
    }
}
