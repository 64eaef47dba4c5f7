//! Developer identities.
//!
//! A [`DeveloperIdentity`] is a published statement "this public key belongs
//! to the developer reachable at this https URL". The identity signs its own
//! declared fields with the key it declares, which proves possession of the
//! private key. Whether the *URL* is authentic is established by fetching the
//! document over https, see [`loader`].

pub mod loader;

pub use loader::{HttpsFetcher, IdentityFetcher, load_from_url};

use crate::error::Result;
use crate::keys::PublicKey;
use crate::utils::{json, text};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};

/// A developer's published identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeveloperIdentity {
    /// Canonical https URL the identity document is served from
    pub identity_url: String,
    /// Additional URLs that also resolve to this identity
    pub alias_urls: Vec<String>,
    /// Display name
    pub name: String,
    /// Organization, if any
    pub organization: Option<String>,
    /// ISO country code, if any
    pub country_code: Option<String>,
    /// City, if any
    pub city: Option<String>,
    /// Public key the identity vouches for, Ed25519 or RSA
    pub public_key: Option<PublicKey>,
    /// Raw self-signature over [`canonical_text`](Self::canonical_text)
    pub signature: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityDocument {
    identity_url: String,
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    city: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    alias_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

impl DeveloperIdentity {
    /// Creates an unsigned identity.
    pub fn new(identity_url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identity_url: identity_url.into(),
            alias_urls: Vec::new(),
            name: name.into(),
            organization: None,
            country_code: None,
            city: None,
            public_key: None,
            signature: None,
        }
    }

    /// Whether `url` is this identity's URL or one of its aliases.
    pub fn matches_url(&self, url: &str) -> bool {
        self.identity_url == url || self.alias_urls.iter().any(|a| a == url)
    }

    /// The identity URL followed by every alias.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.identity_url.as_str()).chain(self.alias_urls.iter().map(String::as_str))
    }

    fn text_fields(&self) -> [(&'static str, &str); 5] {
        [
            ("identityUrl", self.identity_url.as_str()),
            ("name", self.name.as_str()),
            ("organization", self.organization.as_deref().unwrap_or("")),
            ("countryCode", self.country_code.as_deref().unwrap_or("")),
            ("city", self.city.as_deref().unwrap_or("")),
        ]
    }

    /// Fails if any text field or alias URL contains a line break.
    pub fn check_fields(&self) -> Result<()> {
        for (field, value) in self.text_fields() {
            text::single_line(field, value)?;
        }
        for alias in &self.alias_urls {
            text::single_line("aliasUrl", alias)?;
        }
        Ok(())
    }

    /// Fixed-order text covered by the self-signature.
    ///
    /// One `field=value` line per field, then one `aliasUrl=` line per
    /// alias, then the base64 DER public key. Absent optional fields render
    /// as empty values so that adding one later changes the signed bytes.
    ///
    /// # Errors
    ///
    /// [`Error::LineBreakInField`](crate::Error::LineBreakInField) when a
    /// field could spill into the next line.
    pub fn canonical_text(&self) -> Result<String> {
        self.check_fields()?;
        let mut out = String::new();
        for (field, value) in self.text_fields() {
            out.push_str(&format!("{field}={value}\n"));
        }
        for alias in &self.alias_urls {
            out.push_str(&format!("aliasUrl={alias}\n"));
        }
        let key = match &self.public_key {
            Some(key) => BASE64.encode(key.to_public_key_der()?),
            None => String::new(),
        };
        out.push_str(&format!("publicKey={key}\n"));
        Ok(out)
    }

    /// Records the key's public half and signs the identity with it.
    ///
    /// On error the identity is left unsigned.
    pub fn self_sign(&mut self, key: &SigningKey) -> Result<()> {
        self.public_key = Some(key.verifying_key().into());
        self.signature = None;
        let text = self.canonical_text()?;
        self.signature = Some(key.sign(text.as_bytes()).to_bytes().to_vec());
        log::debug!("self-signed identity {}", self.identity_url);
        Ok(())
    }

    /// Checks the self-signature against the declared key.
    ///
    /// Returns `false` for a missing key or signature, or for fields that
    /// have no canonical text.
    pub fn verify_self(&self) -> bool {
        let (Some(key), Some(signature)) = (&self.public_key, &self.signature) else {
            return false;
        };
        self.canonical_text()
            .is_ok_and(|text| key.verify(text.as_bytes(), signature))
    }

    /// Serializes the identity as a JSON document.
    ///
    /// The public key is written as SubjectPublicKeyInfo PEM, the signature
    /// as base64.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let public_key = match &self.public_key {
            Some(key) => Some(key.to_public_key_pem()?),
            None => None,
        };
        let doc = IdentityDocument {
            identity_url: self.identity_url.clone(),
            name: self.name.clone(),
            organization: self.organization.clone(),
            country_code: self.country_code.clone(),
            city: self.city.clone(),
            alias_urls: self.alias_urls.clone(),
            public_key,
            signature: self.signature.as_ref().map(|s| BASE64.encode(s)),
        };
        json::to_pretty_vec(&doc)
    }

    /// Parses an identity JSON document.
    ///
    /// The public key may be Ed25519 or RSA. Fields containing line breaks
    /// are rejected.
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: IdentityDocument = serde_json::from_str(text)?;
        let public_key = match doc.public_key {
            Some(pem) => Some(PublicKey::from_public_key_pem(pem.trim())?),
            None => None,
        };
        let signature = match doc.signature {
            Some(encoded) => Some(BASE64.decode(encoded.trim())?),
            None => None,
        };
        let identity = Self {
            identity_url: doc.identity_url,
            alias_urls: doc.alias_urls,
            name: doc.name,
            organization: doc.organization,
            country_code: doc.country_code,
            city: doc.city,
            public_key,
            signature,
        };
        identity.check_fields()?;
        Ok(identity)
    }
}
