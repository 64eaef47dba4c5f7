//! Explicit configuration objects.
//!
//! Nothing in the crate reads environment variables or global properties;
//! every run is configured through these types.

mod builder;
mod keystore;
mod project;

pub use builder::{GeneratorSettings, GeneratorSettingsBuilder};
pub use keystore::KeystoreConfig;
pub use project::ProjectSettings;
