//! Error types for manifest, identity, signing, trust and tailoring operations.
//!
//! Integrity failures (tampered files, bad signatures, untrusted certificates)
//! are never reported through this type. They come back as closed result
//! values from the verification entry points. `Error` covers I/O, malformed
//! input and provisioning mistakes that a caller has to fix.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for all crate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for all crate operations
#[derive(Error, Debug)]
pub enum Error {
    /// Free-form error, usually produced by [`bail!`](crate::bail)
    #[error("{0}")]
    GenericError(String),

    /// File system error with the operation and path that failed
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// What was being done
        context: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        error: std::io::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Keystore file parse errors
    #[error("TOML error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// Keystore file write errors
    #[error("TOML error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Archive errors
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Directory traversal errors
    #[error("Directory walk error: {0}")]
    Walkdir(#[from] walkdir::Error),

    /// Path outside of the expected root
    #[error("Path error: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// Temp file persist errors
    #[error("Failed to replace file: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// Base64 decoding errors
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Hex decoding errors
    #[error("Hex error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Invalid wildcard rule
    #[error("Pattern error: {0}")]
    Regex(#[from] regex::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// HTTP errors while fetching identity documents
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed signature or key material
    #[error("Signature error: {0}")]
    Signature(#[from] ed25519_dalek::SignatureError),

    /// PKCS#8 private key errors
    #[error("Private key error: {0}")]
    Pkcs8(#[from] pkcs8::Error),

    /// SubjectPublicKeyInfo errors
    #[error("Public key error: {0}")]
    Spki(#[from] pkcs8::spki::Error),

    /// ASN.1 DER errors
    #[error("DER error: {0}")]
    Der(#[from] x509_cert::der::Error),

    /// PEM armor errors
    #[error("PEM error: {0}")]
    Pem(#[from] pem::PemError),

    /// Identity URL does not use https
    #[error("Identity URL must use https: {url}")]
    InsecureIdentityUrl {
        /// Rejected URL
        url: String,
    },

    /// Fetched identity does not claim the URL it was fetched from
    #[error("Identity fetched from {url} declares identity URL {identity_url}")]
    IdentityUrlMismatch {
        /// URL the identity was fetched from
        url: String,
        /// Identity URL declared in the document
        identity_url: String,
    },

    /// Identity self-signature missing or invalid
    #[error("Identity {identity_url} has no valid self-signature")]
    MissingSelfSignature {
        /// Offending identity
        identity_url: String,
    },

    /// No private key in the keystore for an identity or alias
    #[error("No signing key found in keystore for {alias}")]
    MissingSigningKey {
        /// Alias or identity URL that was looked up
        alias: String,
    },

    /// Identity's declared public key differs from the keystore key
    #[error("Public key of identity {identity_url} does not match the keystore key")]
    KeyMismatch {
        /// Offending identity
        identity_url: String,
    },

    /// Trust-store source that is neither inline PEM nor a known file type
    #[error("Invalid key store format: {source_desc}")]
    UnrecognizedTrustStore {
        /// Source as given by the caller
        source_desc: String,
    },

    /// Trust-store file contents could not be decoded
    #[error("Failed to load trust store {path}: {reason}")]
    TrustStore {
        /// Trust-store path
        path: String,
        /// Reason for the error
        reason: String,
    },

    /// Keystore contents could not be used
    #[error("Keystore error: {0}")]
    Keystore(String),

    /// Manifest entry that cannot be rendered unambiguously
    #[error("Invalid manifest entry {path:?}: {reason}")]
    InvalidManifestEntry {
        /// Entry path as given
        path: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Signed text field containing a line break
    #[error("Field {field} must not contain line breaks")]
    LineBreakInField {
        /// Offending field
        field: &'static str,
    },

    /// Key or signature algorithm other than Ed25519 or RSA with SHA-256
    #[error("Unsupported key or signature algorithm {algorithm}")]
    UnsupportedAlgorithm {
        /// Algorithm OID
        algorithm: String,
    },
}

/// Convenience macro for returning a [`Error::GenericError`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::GenericError(format!($($arg)*)))
    };
}

/// Attaches file system context to I/O results.
pub trait ErrorExt<T> {
    /// Wraps the error with the operation that failed and the path involved.
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.as_ref().to_path_buf(),
            error,
        })
    }
}

/// Converts missing values into [`Error::GenericError`].
pub trait Context<T> {
    /// Returns the value or an error carrying `msg`.
    fn context<C: std::fmt::Display>(self, msg: C) -> Result<T>;
}

impl<T> Context<T> for Option<T> {
    fn context<C: std::fmt::Display>(self, msg: C) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(msg.to_string()))
    }
}

impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
    fn context<C: std::fmt::Display>(self, msg: C) -> Result<T> {
        self.map_err(|e| Error::GenericError(format!("{msg}: {e}")))
    }
}
