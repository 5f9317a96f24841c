//! Deterministic RSA test PKI.
//!
//! Keys come from seeded `rsa` generation; certificates are issued by `rcgen`
//! from those keys' PKCS #8 encodings, so the same seed always yields the same
//! public key.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use rsa::pkcs8::EncodePrivateKey as _;
use rsa::RsaPrivateKey;
use std::fmt;
use std::sync::OnceLock;

/// Smallest RSA size `rcgen`'s signer accepts.
const KEY_BITS: usize = 2048;

/// Generates the RSA key for `seed`. Same seed, same key.
///
/// # Panics
///
/// Panics if key generation fails.
#[must_use]
pub fn test_key(seed: u64) -> RsaPrivateKey {
    let mut rng = StdRng::seed_from_u64(seed);
    RsaPrivateKey::new(&mut rng, KEY_BITS).expect("RSA key generation")
}

/// What a test certificate may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// CA with `keyCertSign`.
    Authority,
    /// End entity with `digitalSignature` only.
    Signer,
}

/// An X.509 v3 certificate and its private key.
pub struct TestCertificate {
    /// Full certificate DER.
    pub der: Vec<u8>,
    pub key: RsaPrivateKey,
    /// Subject `Name` DER.
    pub subject: Vec<u8>,
    /// Issuer `Name` DER.
    pub issuer: Vec<u8>,
    /// Serial number INTEGER content octets.
    pub serial: Vec<u8>,
    certificate: Certificate,
    key_pair: KeyPair,
}

impl TestCertificate {
    /// A self-signed certificate.
    ///
    /// # Panics
    ///
    /// Panics if `rcgen` rejects the key or parameters.
    #[must_use]
    pub fn self_signed(common_name: &str, serial: u64, key: RsaPrivateKey, role: Role) -> Self {
        let key_pair = rcgen_key(&key);
        let certificate = params(common_name, serial, role)
            .self_signed(&key_pair)
            .expect("self-signed certificate");
        Self::assemble(certificate, key_pair, key)
    }

    /// A certificate signed by `issuer`.
    ///
    /// # Panics
    ///
    /// Panics if `rcgen` rejects the key or parameters.
    #[must_use]
    pub fn issued_by(
        common_name: &str,
        serial: u64,
        key: RsaPrivateKey,
        role: Role,
        issuer: &TestCertificate,
    ) -> Self {
        let key_pair = rcgen_key(&key);
        let certificate = params(common_name, serial, role)
            .signed_by(&key_pair, &issuer.certificate, &issuer.key_pair)
            .expect("issued certificate");
        Self::assemble(certificate, key_pair, key)
    }

    fn assemble(certificate: Certificate, key_pair: KeyPair, key: RsaPrivateKey) -> Self {
        let der = certificate.der().to_vec();
        let (subject, issuer, serial) = {
            let (_, parsed) =
                x509_parser::parse_x509_certificate(&der).expect("rcgen emits valid DER");
            let tbs = &parsed.tbs_certificate;
            (
                tbs.subject.as_raw().to_vec(),
                tbs.issuer.as_raw().to_vec(),
                tbs.raw_serial().to_vec(),
            )
        };
        Self {
            der,
            key,
            subject,
            issuer,
            serial,
            certificate,
            key_pair,
        }
    }

    #[must_use]
    pub fn to_pem(&self) -> String {
        self.certificate.pem()
    }
}

impl fmt::Debug for TestCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCertificate")
            .field("serial", &hex::encode(&self.serial))
            .field("der_len", &self.der.len())
            .finish_non_exhaustive()
    }
}

fn rcgen_key(key: &RsaPrivateKey) -> KeyPair {
    let pkcs8 = key.to_pkcs8_der().expect("PKCS #8 encoding");
    KeyPair::try_from(pkcs8.as_bytes()).expect("rcgen accepts the RSA key")
}

fn params(common_name: &str, serial: u64, role: Role) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("certificate params");
    let mut name = DistinguishedName::new();
    name.push(DnType::OrganizationName, "IAPKit Test");
    name.push(DnType::CommonName, common_name);
    params.distinguished_name = name;
    params.serial_number = Some(SerialNumber::from_slice(&serial.to_be_bytes()));
    params.not_before = rcgen::date_time_ymd(2025, 1, 1);
    params.not_after = rcgen::date_time_ymd(2035, 1, 1);
    match role {
        Role::Authority => {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        }
        Role::Signer => {
            params.is_ca = IsCa::ExplicitNoCa;
            params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        }
    }
    params
}

/// Store-style hierarchy plus a locally issued signer no root vouches for.
#[derive(Debug)]
pub struct TestPki {
    /// Trusted root.
    pub root: TestCertificate,
    /// Intermediate CA issued by the root.
    pub intermediate: TestCertificate,
    /// Receipt signer issued by the intermediate.
    pub leaf: TestCertificate,
    /// Self-signed signer, as used for locally issued test receipts.
    pub local: TestCertificate,
}

/// The shared test hierarchy, generated once per process.
pub fn pki() -> &'static TestPki {
    static PKI: OnceLock<TestPki> = OnceLock::new();
    PKI.get_or_init(|| {
        let root = TestCertificate::self_signed("Test Root CA", 1, test_key(1), Role::Authority);
        let intermediate = TestCertificate::issued_by(
            "Test Receipt Intermediate",
            2,
            test_key(2),
            Role::Authority,
            &root,
        );
        let leaf = TestCertificate::issued_by(
            "Test Receipt Signer",
            3,
            test_key(3),
            Role::Signer,
            &intermediate,
        );
        let local =
            TestCertificate::self_signed("Local Receipt Signer", 4, test_key(4), Role::Signer);
        TestPki {
            root,
            intermediate,
            leaf,
            local,
        }
    })
}
