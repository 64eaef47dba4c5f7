mod common;

use jdeploy_trust::Error;
use jdeploy_trust::settings::KeystoreConfig;
use jdeploy_trust::signing::KeyStore;
use jdeploy_trust::trust::bundle::{CERTIFICATE_FILENAME, MANIFEST_FILENAME, MANIFEST_SIGNATURE_FILENAME};
use jdeploy_trust::trust::{
    FileKeyProvider, KeyStoreKeyProvider, TrustStore, VerificationResult, sign_directory,
    verify_directory,
};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn bundle() -> TempDir {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("lib")).unwrap();
    std::fs::write(tmp.path().join("package.json"), r#"{"name":"demo"}"#).unwrap();
    std::fs::write(tmp.path().join("lib/app.jar"), b"jar bytes").unwrap();
    tmp
}

fn file_provider(dir: &Path, cert: &common::TestCert, chain: &[&common::TestCert]) -> FileKeyProvider {
    let key_path = dir.join("key.pem");
    let cert_path = dir.join("chain.pem");
    std::fs::write(&key_path, cert.key_pem()).unwrap();
    let pems: String = chain.iter().map(|c| c.pem()).collect();
    std::fs::write(&cert_path, pems).unwrap();
    FileKeyProvider::new(key_path, cert_path)
}

fn store_of(certs: &[&common::TestCert]) -> TrustStore {
    TrustStore::from_der_certificates(certs.iter().map(|c| c.der())).unwrap()
}

#[test]
fn unsigned_directory() {
    let dir = bundle();
    let result = verify_directory("1.0.0", dir.path(), &TrustStore::default()).unwrap();
    assert_eq!(result, VerificationResult::NotSignedAtAll);
    assert!(!result.is_verified());
}

#[test]
fn pinned_certificate_verifies() {
    common::init_logger();
    let keys = TempDir::new().unwrap();
    let dir = bundle();
    let cert = common::self_signed("Publisher");

    sign_directory("1.0.0", dir.path(), &file_provider(keys.path(), &cert, &[&cert])).unwrap();
    for name in [MANIFEST_FILENAME, MANIFEST_SIGNATURE_FILENAME, CERTIFICATE_FILENAME] {
        assert!(dir.path().join(name).is_file(), "{name}");
    }

    let manifest: Value =
        serde_json::from_slice(&std::fs::read(dir.path().join(MANIFEST_FILENAME)).unwrap()).unwrap();
    assert!(manifest.get("timestamp").is_some());
    assert!(manifest.get("lib/app.jar").is_some());
    assert!(manifest.get(MANIFEST_FILENAME).is_none());

    let result = verify_directory("1.0.0", dir.path(), &store_of(&[&cert])).unwrap();
    assert_eq!(result, VerificationResult::SignedCorrectly);
}

#[test]
fn chain_to_trusted_root_verifies() {
    let keys = TempDir::new().unwrap();
    let dir = bundle();
    let root = common::self_signed("Root CA");
    let intermediate = common::issued_by("Intermediate", &root);
    let leaf = common::issued_by("Leaf", &intermediate);

    let provider = file_provider(keys.path(), &leaf, &[&leaf, &intermediate]);
    sign_directory("2.0.0", dir.path(), &provider).unwrap();

    assert_eq!(
        verify_directory("2.0.0", dir.path(), &store_of(&[&root])).unwrap(),
        VerificationResult::SignedCorrectly
    );
}

#[test]
fn appended_trusted_certificate_does_not_vouch_for_unrelated_leaf() {
    let keys = TempDir::new().unwrap();
    let dir = bundle();
    let trusted = common::self_signed("Trusted");
    let attacker = common::self_signed("Attacker");

    let provider = file_provider(keys.path(), &attacker, &[&attacker, &trusted]);
    sign_directory("1.0.0", dir.path(), &provider).unwrap();

    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store_of(&[&trusted])).unwrap(),
        VerificationResult::UntrustedCertificate
    );
}

#[test]
fn unknown_signer_is_untrusted() {
    let keys = TempDir::new().unwrap();
    let dir = bundle();
    let signer = common::self_signed("Signer");
    let other = common::self_signed("Other");

    sign_directory("1.0.0", dir.path(), &file_provider(keys.path(), &signer, &[&signer])).unwrap();
    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store_of(&[&other])).unwrap(),
        VerificationResult::UntrustedCertificate
    );
}

#[test]
fn expired_leaf_is_untrusted() {
    let keys = TempDir::new().unwrap();
    let dir = bundle();
    let old = common::expired("Old Publisher");

    sign_directory("1.0.0", dir.path(), &file_provider(keys.path(), &old, &[&old])).unwrap();
    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store_of(&[&old])).unwrap(),
        VerificationResult::UntrustedCertificate
    );
}

#[test]
fn corrupt_certificate_file_is_untrusted() {
    let keys = TempDir::new().unwrap();
    let dir = bundle();
    let cert = common::self_signed("Publisher");
    sign_directory("1.0.0", dir.path(), &file_provider(keys.path(), &cert, &[&cert])).unwrap();
    std::fs::write(dir.path().join(CERTIFICATE_FILENAME), b"garbage").unwrap();

    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store_of(&[&cert])).unwrap(),
        VerificationResult::UntrustedCertificate
    );
}

#[test]
fn tampering_is_a_mismatch() {
    let keys = TempDir::new().unwrap();
    let cert = common::self_signed("Publisher");
    let store = store_of(&[&cert]);

    // modified file
    let dir = bundle();
    sign_directory("1.0.0", dir.path(), &file_provider(keys.path(), &cert, &[&cert])).unwrap();
    std::fs::write(dir.path().join("lib/app.jar"), b"evil bytes").unwrap();
    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store).unwrap(),
        VerificationResult::SignatureMismatch
    );

    // deleted file
    let dir = bundle();
    sign_directory("1.0.0", dir.path(), &file_provider(keys.path(), &cert, &[&cert])).unwrap();
    std::fs::remove_file(dir.path().join("package.json")).unwrap();
    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store).unwrap(),
        VerificationResult::SignatureMismatch
    );

    // edited manifest
    let dir = bundle();
    sign_directory("1.0.0", dir.path(), &file_provider(keys.path(), &cert, &[&cert])).unwrap();
    let manifest_path = dir.path().join(MANIFEST_FILENAME);
    let edited = std::fs::read_to_string(&manifest_path).unwrap().replace("lib/app.jar", "lib/other.jar");
    std::fs::write(&manifest_path, edited).unwrap();
    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store).unwrap(),
        VerificationResult::SignatureMismatch
    );
}

#[test]
fn signature_is_bound_to_version() {
    let keys = TempDir::new().unwrap();
    let dir = bundle();
    let cert = common::self_signed("Publisher");
    sign_directory("1.0.0", dir.path(), &file_provider(keys.path(), &cert, &[&cert])).unwrap();

    assert_eq!(
        verify_directory("1.0.1", dir.path(), &store_of(&[&cert])).unwrap(),
        VerificationResult::SignatureMismatch
    );
}

#[test]
fn missing_manifest_signature_counts_as_unsigned() {
    let keys = TempDir::new().unwrap();
    let dir = bundle();
    let cert = common::self_signed("Publisher");
    sign_directory("1.0.0", dir.path(), &file_provider(keys.path(), &cert, &[&cert])).unwrap();
    std::fs::remove_file(dir.path().join(MANIFEST_SIGNATURE_FILENAME)).unwrap();

    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store_of(&[&cert])).unwrap(),
        VerificationResult::NotSignedAtAll
    );
}

#[test]
fn keystore_provider_signs_and_rejects_mismatched_chain() {
    let tmp = TempDir::new().unwrap();
    let cert = common::self_signed("Keystore Publisher");
    let other = common::self_signed("Someone Else");

    let config = KeystoreConfig::new(tmp.path().join("keys.toml")).alias("release");
    let mut keystore = KeyStore::open(config).unwrap();
    keystore
        .insert_with_chain("release", &cert.signing_key(), &[cert.der()])
        .unwrap();
    keystore
        .insert_with_chain("broken", &cert.signing_key(), &[other.der()])
        .unwrap();

    let dir = bundle();
    let provider = KeyStoreKeyProvider::for_default_alias(&keystore).unwrap();
    sign_directory("3.1.4", dir.path(), &provider).unwrap();
    assert_eq!(
        verify_directory("3.1.4", dir.path(), &store_of(&[&cert])).unwrap(),
        VerificationResult::SignedCorrectly
    );

    let broken = KeyStoreKeyProvider::new(&keystore, "broken");
    assert!(sign_directory("3.1.4", bundle().path(), &broken).is_err());
    let missing = KeyStoreKeyProvider::new(&keystore, "nobody");
    assert!(sign_directory("3.1.4", bundle().path(), &missing).is_err());
}

#[test]
fn re_signing_replaces_previous_signature_files() {
    let keys = TempDir::new().unwrap();
    let dir = bundle();
    let cert = common::self_signed("Publisher");
    let provider = file_provider(keys.path(), &cert, &[&cert]);

    sign_directory("1.0.0", dir.path(), &provider).unwrap();
    std::fs::write(dir.path().join("lib/new.txt"), b"added later").unwrap();
    sign_directory("1.0.0", dir.path(), &provider).unwrap();

    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store_of(&[&cert])).unwrap(),
        VerificationResult::SignedCorrectly
    );
}

#[test]
fn rsa_pinned_certificate_verifies() {
    common::init_logger();
    let dir = bundle();
    let cert = common::rsa_self_signed("RSA Publisher");
    common::sign_directory_rsa("1.0.0", dir.path(), &[&cert]);

    let store = store_of(&[&cert]);
    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store).unwrap(),
        VerificationResult::SignedCorrectly
    );
    assert_eq!(
        verify_directory("1.0.1", dir.path(), &store).unwrap(),
        VerificationResult::SignatureMismatch
    );

    std::fs::write(dir.path().join("lib/app.jar"), b"jar byteS").unwrap();
    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store).unwrap(),
        VerificationResult::SignatureMismatch
    );
}

#[test]
fn rsa_root_vouches_for_ed25519_leaf() {
    let keys = TempDir::new().unwrap();
    let dir = bundle();
    let root = common::rsa_self_signed("RSA Root");
    let leaf = common::issued_by("Leaf", &root);

    sign_directory("2.0.0", dir.path(), &file_provider(keys.path(), &leaf, &[&leaf])).unwrap();

    assert_eq!(
        verify_directory("2.0.0", dir.path(), &store_of(&[&root])).unwrap(),
        VerificationResult::SignedCorrectly
    );
    assert_eq!(
        verify_directory("2.0.0", dir.path(), &store_of(&[&common::self_signed("RSA Root")])).unwrap(),
        VerificationResult::UntrustedCertificate
    );
}

#[test]
fn unsupported_algorithm_is_an_error_not_untrusted() {
    let dir = bundle();
    let ecdsa = common::ecdsa_self_signed("ECDSA Publisher");
    std::fs::write(dir.path().join(CERTIFICATE_FILENAME), ecdsa.der()).unwrap();

    let err = verify_directory("1.0.0", dir.path(), &store_of(&[&ecdsa])).unwrap_err();
    assert!(matches!(err, Error::UnsupportedAlgorithm { .. }), "{err}");

    // not in the store and no issuer name matches: plain untrusted
    let stranger = common::self_signed("Stranger");
    assert_eq!(
        verify_directory("1.0.0", dir.path(), &store_of(&[&stranger])).unwrap(),
        VerificationResult::UntrustedCertificate
    );
}

#[test]
fn unsupported_trusted_issuer_is_an_error() {
    let keys = TempDir::new().unwrap();
    let dir = bundle();
    let root = common::ecdsa_self_signed("ECDSA Root");
    let leaf = common::issued_by("Leaf", &root);
    sign_directory("1.0.0", dir.path(), &file_provider(keys.path(), &leaf, &[&leaf])).unwrap();

    let err = verify_directory("1.0.0", dir.path(), &store_of(&[&root])).unwrap_err();
    assert!(matches!(err, Error::UnsupportedAlgorithm { .. }), "{err}");
}
