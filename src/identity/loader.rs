//! Loading identities from their published URL.

use super::DeveloperIdentity;
use crate::error::{Error, Result};
use std::time::Duration;
use url::Url;

/// Timeout applied by [`HttpsFetcher::new`] when none is given.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Retrieves the body of an identity document.
///
/// Implementations own the network policy (timeouts, proxies). The loader
/// only ever hands them https URLs.
pub trait IdentityFetcher {
    /// Fetches `url` and returns the response body.
    fn fetch(&self, url: &Url) -> Result<String>;
}

/// Blocking https fetcher with a bounded timeout and no retries.
///
/// Redirects are followed only while they stay on https.
#[derive(Debug, Clone)]
pub struct HttpsFetcher {
    client: reqwest::blocking::Client,
}

impl HttpsFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let redirect = reqwest::redirect::Policy::custom(|attempt| {
            if attempt.url().scheme() != "https" {
                attempt.error("redirect away from https")
            } else if attempt.previous().len() > 5 {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(redirect)
            .https_only(true)
            .build()?;
        Ok(Self { client })
    }

    /// Creates a fetcher using [`DEFAULT_FETCH_TIMEOUT`].
    pub fn with_default_timeout() -> Result<Self> {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl IdentityFetcher for HttpsFetcher {
    fn fetch(&self, url: &Url) -> Result<String> {
        let response = self.client.get(url.clone()).send()?.error_for_status()?;
        Ok(response.text()?)
    }
}

/// Fetches, parses and authenticates the identity published at `url`.
///
/// The URL must be https; anything else is rejected before any request is
/// made. The fetched document must declare `url` as its identity URL or one
/// of its aliases, and its self-signature must verify.
///
/// # Examples
///
/// ```no_run
/// use jdeploy_trust::identity::{HttpsFetcher, load_from_url};
///
/// # fn example() -> jdeploy_trust::Result<()> {
/// let fetcher = HttpsFetcher::with_default_timeout()?;
/// let identity = load_from_url("https://example.com/.well-known/jdeploy.json", &fetcher)?;
/// println!("{}", identity.name);
/// # Ok(())
/// # }
/// ```
pub fn load_from_url(url: &str, fetcher: &dyn IdentityFetcher) -> Result<DeveloperIdentity> {
    let parsed = Url::parse(url)?;
    if parsed.scheme() != "https" {
        return Err(Error::InsecureIdentityUrl {
            url: url.to_string(),
        });
    }

    let body = fetcher.fetch(&parsed)?;
    let identity = DeveloperIdentity::from_json(&body)?;

    if !identity.matches_url(url) {
        return Err(Error::IdentityUrlMismatch {
            url: url.to_string(),
            identity_url: identity.identity_url,
        });
    }
    if !identity.verify_self() {
        return Err(Error::MissingSelfSignature {
            identity_url: identity.identity_url,
        });
    }

    log::info!("Loaded identity {} from {url}", identity.identity_url);
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;
    use std::cell::Cell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapFetcher {
        bodies: HashMap<String, String>,
        calls: Cell<usize>,
    }

    impl IdentityFetcher for MapFetcher {
        fn fetch(&self, url: &Url) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            self.bodies
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| Error::GenericError(format!("404 {url}")))
        }
    }

    fn published(url: &str, alias: &str) -> String {
        let mut id = DeveloperIdentity::new(url, "Dev");
        id.alias_urls = vec![alias.to_string()];
        id.self_sign(&SigningKey::generate(&mut OsRng)).unwrap();
        String::from_utf8(id.to_json().unwrap()).unwrap()
    }

    #[test]
    fn http_url_rejected_before_fetch() {
        let fetcher = MapFetcher::default();
        let err = load_from_url("http://example.com/id.json", &fetcher).unwrap_err();
        assert!(matches!(err, Error::InsecureIdentityUrl { .. }));
        assert_eq!(fetcher.calls.get(), 0);
    }

    #[test]
    fn loads_by_identity_url_and_alias() {
        let url = "https://example.com/id.json";
        let alias = "https://mirror.example.com/id.json";
        let body = published(url, alias);
        let mut fetcher = MapFetcher::default();
        fetcher.bodies.insert(url.to_string(), body.clone());
        fetcher.bodies.insert(alias.to_string(), body);

        assert_eq!(load_from_url(url, &fetcher).unwrap().identity_url, url);
        assert_eq!(load_from_url(alias, &fetcher).unwrap().identity_url, url);
    }

    #[test]
    fn document_for_another_url_rejected() {
        let served_at = "https://evil.example.com/id.json";
        let mut fetcher = MapFetcher::default();
        fetcher.bodies.insert(
            served_at.to_string(),
            published("https://example.com/id.json", "https://example.com/alt"),
        );

        let err = load_from_url(served_at, &fetcher).unwrap_err();
        assert!(matches!(err, Error::IdentityUrlMismatch { .. }));
    }

    #[test]
    fn tampered_document_rejected() {
        let url = "https://example.com/id.json";
        let body = published(url, "https://example.com/alt").replace("\"Dev\"", "\"Mallory\"");
        let mut fetcher = MapFetcher::default();
        fetcher.bodies.insert(url.to_string(), body);

        let err = load_from_url(url, &fetcher).unwrap_err();
        assert!(matches!(err, Error::MissingSelfSignature { .. }));
    }
}
