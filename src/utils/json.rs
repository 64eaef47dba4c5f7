//! JSON output helpers.

use crate::error::Result;
use serde::Serialize;

/// Serializes `value` as pretty JSON indented with four spaces.
///
/// Every document this crate writes (manifests, identities, `package.json`
/// rewrites, bundle manifests) goes through here so the on-disk layout stays
/// stable between runs.
pub fn to_pretty_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}
