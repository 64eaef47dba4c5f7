//! Checks for text that ends up in line-oriented signed payloads.

use crate::error::{Error, Result};

/// Fails when `value` contains a carriage return or line feed.
pub fn single_line(field: &'static str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(Error::LineBreakInField { field });
    }
    Ok(())
}
