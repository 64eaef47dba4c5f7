//! Shared helpers.

pub mod fs;
pub mod json;
pub mod text;
