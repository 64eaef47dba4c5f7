//! Shared fixtures for integration tests: Ed25519, RSA and ECDSA
//! certificates, certificate containers, and a bundle signer for RSA keys.

#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, PKCS_ECDSA_P256_SHA256,
    PKCS_ED25519, PKCS_RSA_SHA256,
};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::path::Path;

/// 2048-bit RSA key, PKCS#8 PEM.
pub const RSA_KEY_PEM: &str = include_str!("../fixtures/rsa_2048.pem");

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A generated certificate with its key.
pub struct TestCert {
    pub cert: rcgen::Certificate,
    pub key_pair: KeyPair,
}

impl TestCert {
    pub fn der(&self) -> Vec<u8> {
        self.cert.der().to_vec()
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    pub fn key_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_pkcs8_der(&self.key_pair.serialize_der()).unwrap()
    }
}

fn params(common_name: &str, ca: bool) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.not_before = rcgen::date_time_ymd(2020, 1, 1);
    params.not_after = rcgen::date_time_ymd(2090, 1, 1);
    if ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    }
    params
}

/// Self-signed Ed25519 certificate.
pub fn self_signed(common_name: &str) -> TestCert {
    let key_pair = KeyPair::generate_for(&PKCS_ED25519).unwrap();
    let cert = params(common_name, true).self_signed(&key_pair).unwrap();
    TestCert { cert, key_pair }
}

/// Self-signed certificate for [`RSA_KEY_PEM`], signed with SHA-256.
pub fn rsa_self_signed(common_name: &str) -> TestCert {
    let key_pair = KeyPair::from_pkcs8_pem_and_sign_algo(RSA_KEY_PEM, &PKCS_RSA_SHA256).unwrap();
    let cert = params(common_name, true).self_signed(&key_pair).unwrap();
    TestCert { cert, key_pair }
}

/// Self-signed ECDSA P-256 certificate.
pub fn ecdsa_self_signed(common_name: &str) -> TestCert {
    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
    let cert = params(common_name, true).self_signed(&key_pair).unwrap();
    TestCert { cert, key_pair }
}

pub fn rsa_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(RSA_KEY_PEM).unwrap()
}

/// Writes the three signature files the way an RSA-keyed signer would.
pub fn sign_directory_rsa(version: &str, dir: &Path, chain: &[&TestCert]) {
    let key = rsa_key();
    let sign = |data: &[u8]| {
        key.sign(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(data))
            .unwrap()
    };

    let mut manifest = serde_json::Map::new();
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    manifest.insert("timestamp".into(), timestamp.into());
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.unwrap();
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap();
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_str().unwrap())
            .collect::<Vec<_>>()
            .join("/");
        let hash = Sha256::digest(std::fs::read(entry.path()).unwrap());
        manifest.insert(
            relative,
            serde_json::json!({
                "hash": hex::encode(hash),
                "signature": hex::encode(sign(hash.as_slice())),
            }),
        );
    }

    let manifest_bytes = serde_json::to_vec_pretty(&manifest).unwrap();
    let mut signed = manifest_bytes.clone();
    signed.extend_from_slice(version.as_bytes());
    std::fs::write(dir.join("jdeploy.mf"), &manifest_bytes).unwrap();
    std::fs::write(dir.join("jdeploy.mf.sig"), sign(signed.as_slice())).unwrap();
    let chain: Vec<u8> = chain.iter().flat_map(|c| c.der()).collect();
    std::fs::write(dir.join("jdeploy.cer"), chain).unwrap();
}

/// Self-signed certificate that expired before any bundle could be signed.
pub fn expired(common_name: &str) -> TestCert {
    let key_pair = KeyPair::generate_for(&PKCS_ED25519).unwrap();
    let mut p = params(common_name, false);
    p.not_before = rcgen::date_time_ymd(2000, 1, 1);
    p.not_after = rcgen::date_time_ymd(2001, 1, 1);
    let cert = p.self_signed(&key_pair).unwrap();
    TestCert { cert, key_pair }
}

/// Ed25519 certificate issued by `issuer`.
pub fn issued_by(common_name: &str, issuer: &TestCert) -> TestCert {
    let key_pair = KeyPair::generate_for(&PKCS_ED25519).unwrap();
    let cert = params(common_name, false)
        .signed_by(&key_pair, &issuer.cert, &issuer.key_pair)
        .unwrap();
    TestCert { cert, key_pair }
}

/// JKS file holding `entries` as trusted certificates.
pub fn jks_trusted(entries: &[(&str, &[u8])], password: &str) -> Vec<u8> {
    fn utf(out: &mut Vec<u8>, s: &str) {
        out.extend((s.len() as u16).to_be_bytes());
        out.extend(s.as_bytes());
    }

    let mut out = Vec::new();
    out.extend(0xFEED_FEEDu32.to_be_bytes());
    out.extend(2u32.to_be_bytes());
    out.extend((entries.len() as u32).to_be_bytes());
    for (alias, der) in entries {
        out.extend(2u32.to_be_bytes());
        utf(&mut out, alias);
        out.extend(0u64.to_be_bytes());
        utf(&mut out, "X.509");
        out.extend((der.len() as u32).to_be_bytes());
        out.extend(*der);
    }

    let mut hasher = Sha1::new();
    for unit in password.encode_utf16() {
        hasher.update(unit.to_be_bytes());
    }
    hasher.update(b"Mighty Aphrodite");
    hasher.update(&out);
    out.extend(hasher.finalize());
    out
}

/// Degenerate PKCS#7 SignedData carrying only certificates, as in `.p7b` files.
pub fn pkcs7_bundle(certificates: &[Vec<u8>]) -> Vec<u8> {
    use cms::cert::CertificateChoices;
    use cms::content_info::{CmsVersion, ContentInfo};
    use cms::signed_data::{CertificateSet, EncapsulatedContentInfo, SignedData, SignerInfos};
    use x509_cert::Certificate;
    use x509_cert::der::asn1::{ObjectIdentifier, SetOfVec};
    use x509_cert::der::{Any, Decode, Encode};

    let choices: Vec<CertificateChoices> = certificates
        .iter()
        .map(|der| CertificateChoices::Certificate(Certificate::from_der(der).unwrap()))
        .collect();

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::new(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1"),
            econtent: None,
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(choices).unwrap())),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::new()),
    };

    ContentInfo {
        content_type: ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2"),
        content: Any::encode_from(&signed_data).unwrap(),
    }
    .to_der()
    .unwrap()
}

/// PKCS#12 container with one certificate and its key.
pub fn pkcs12(cert: &TestCert, password: &str) -> Vec<u8> {
    p12::PFX::new(&cert.der(), &cert.key_pair.serialize_der(), None, password, "test")
        .unwrap()
        .to_der()
}
