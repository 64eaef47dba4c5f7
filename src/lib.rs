//! Trust and packaging core for jDeploy application bundles.
//!
//! This library provides:
//! - content manifests with per-file checksums and an optional signature ([`manifest`])
//! - developer identities published over HTTPS and self-signed ([`identity`])
//! - package signatures over a canonical descriptor, one per identity ([`signing`])
//! - Ed25519 and RSA public keys for verification ([`keys`])
//! - trust stores in PEM, DER, PKCS#7, PKCS#12 and JKS form, and signed bundle
//!   verification against them ([`trust`])
//! - per-platform bundle tailoring driven by ignore rules and native namespaces
//!   ([`tailoring`])
//!
//! Integrity problems are reported as result values such as
//! [`manifest::ManifestStatus`] and [`trust::VerificationResult`]; [`Error`]
//! is reserved for I/O and configuration failures.

pub mod error;
pub mod identity;
pub mod keys;
pub mod manifest;
pub mod settings;
pub mod signing;
pub mod tailoring;
pub mod trust;
pub mod utils;

pub use error::{Error, Result};
