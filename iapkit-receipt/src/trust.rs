//! Signature verification and trust policy.
//!
//! The trust store holds exactly one root certificate. Which root, and whether the
//! signer's certificate chain must lead to it, are decided by configuration:
//! locally issued test receipts are signed by a self-issued certificate that no
//! root vouches for, so [`Environment::Debug`] checks the signature alone while
//! the store environments demand a full chain.

use crate::asn1::{format_oid, tag, Cursor};
use crate::container::{oid, read_octet_string, read_oid, SignedContainer, SignerInfo};
use crate::error::{ReceiptError, ReceiptResult};
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePublicKey as _;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha384, Sha512};
use signature::Verifier as _;
use std::path::Path;
use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::ParsedExtension;

/// Longest issuer chain followed from the signer certificate to the root.
const MAX_CHAIN_DEPTH: usize = 8;

/// Build environment the receipt is expected to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development, receipts signed by the test certificate.
    Debug,
    /// Beta distribution, sandbox receipts signed by the store.
    TestFlight,
    /// Production store.
    AppStore,
}

/// File name the platform gives receipts issued by the sandbox.
pub const SANDBOX_RECEIPT_NAME: &str = "sandboxReceipt";

impl Environment {
    /// Infers the environment: debug builds are [`Environment::Debug`], a receipt
    /// stored as `sandboxReceipt` means [`Environment::TestFlight`], anything else
    /// is [`Environment::AppStore`].
    #[must_use]
    pub fn detect(receipt_path: &Path, debug_build: bool) -> Self {
        if debug_build {
            Self::Debug
        } else if receipt_path
            .file_name()
            .is_some_and(|name| name == SANDBOX_RECEIPT_NAME)
        {
            Self::TestFlight
        } else {
            Self::AppStore
        }
    }

    /// Returns true if the signer certificate must chain to the trusted root.
    #[must_use]
    pub fn requires_chain_verification(&self) -> bool {
        !matches!(self, Self::Debug)
    }

    /// Returns true for environments served by the sandbox store.
    #[must_use]
    pub fn is_sandbox(&self) -> bool {
        !matches!(self, Self::AppStore)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Debug => "debug",
            Self::TestFlight => "testflight",
            Self::AppStore => "appstore",
        })
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "testflight" => Ok(Self::TestFlight),
            "appstore" => Ok(Self::AppStore),
            other => Err(format!(
                "unknown environment {other:?} (expected debug, testflight or appstore)"
            )),
        }
    }
}

/// A trusted root certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    der: Vec<u8>,
}

impl TrustAnchor {
    /// Creates an anchor from a DER certificate.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::SignatureInvalid`] if the bytes are not a certificate.
    pub fn from_der(der: Vec<u8>) -> ReceiptResult<Self> {
        parse_certificate(&der)?;
        Ok(Self { der })
    }

    /// Creates an anchor from DER or PEM bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::SignatureInvalid`] if the bytes hold no certificate.
    pub fn from_bytes(bytes: &[u8]) -> ReceiptResult<Self> {
        if bytes.trim_ascii_start().starts_with(b"-----BEGIN") {
            let (_, pem) = x509_parser::pem::parse_x509_pem(bytes.trim_ascii_start())
                .map_err(|e| invalid(format!("unreadable PEM root certificate: {e}")))?;
            Self::from_der(pem.contents)
        } else {
            Self::from_der(bytes.to_vec())
        }
    }

    /// Reads an anchor from a `.cer` (DER) or PEM file.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::SignatureInvalid`] if the file cannot be read or
    /// does not hold a certificate.
    pub fn load(path: impl AsRef<Path>) -> ReceiptResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            invalid(format!("unreadable root certificate {}: {e}", path.display()))
        })?;
        Self::from_bytes(&bytes)
    }

    /// DER encoding of the certificate.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

/// Root certificate plus chain policy.
#[derive(Debug, Clone)]
pub struct TrustPolicy {
    root: TrustAnchor,
    chain_verification_required: bool,
}

impl TrustPolicy {
    /// Creates a policy with an explicit chain-verification flag.
    #[must_use]
    pub fn new(root: TrustAnchor, chain_verification_required: bool) -> Self {
        Self {
            root,
            chain_verification_required,
        }
    }

    /// Creates the policy an environment calls for.
    #[must_use]
    pub fn for_environment(environment: Environment, root: TrustAnchor) -> Self {
        Self::new(root, environment.requires_chain_verification())
    }

    /// The trusted root.
    #[must_use]
    pub fn root(&self) -> &TrustAnchor {
        &self.root
    }

    /// Whether signer certificates must chain to the root.
    #[must_use]
    pub fn chain_verification_required(&self) -> bool {
        self.chain_verification_required
    }

    /// Verifies every signer of `container` over its content.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::SignatureInvalid`] if any signer certificate is
    /// missing or untrusted, or any signature does not match.
    pub fn verify(&self, container: &SignedContainer<'_>) -> ReceiptResult<()> {
        let root = parse_certificate(&self.root.der)?;
        let certificates = container
            .certificates()
            .iter()
            .map(|der| parse_certificate(der))
            .collect::<ReceiptResult<Vec<_>>>()?;

        for signer in container.signers() {
            let certificate = certificates
                .iter()
                .find(|c| {
                    c.tbs_certificate.issuer.as_raw() == signer.issuer
                        && c.tbs_certificate.raw_serial() == signer.serial
                })
                .ok_or_else(|| invalid("signer certificate is not embedded in the receipt"))?;

            if self.chain_verification_required {
                verify_chain(certificate, &certificates, &root)?;
            }
            verify_signer(signer, certificate, container.content())?;
            debug!(
                signer = %certificate.tbs_certificate.subject,
                chain_verified = self.chain_verification_required,
                "Receipt signature verified"
            );
        }
        Ok(())
    }
}

/// Digest algorithms accepted in signer infos and certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    fn from_oid(oid_bytes: &[u8]) -> Option<Self> {
        match oid_bytes {
            oid::SHA1 => Some(Self::Sha1),
            oid::SHA256 => Some(Self::Sha256),
            oid::SHA384 => Some(Self::Sha384),
            oid::SHA512 => Some(Self::Sha512),
            _ => None,
        }
    }

    fn from_rsa_signature_oid(oid_bytes: &[u8]) -> Option<Self> {
        match oid_bytes {
            oid::SHA1_WITH_RSA => Some(Self::Sha1),
            oid::SHA256_WITH_RSA => Some(Self::Sha256),
            oid::SHA384_WITH_RSA => Some(Self::Sha384),
            oid::SHA512_WITH_RSA => Some(Self::Sha512),
            _ => None,
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn verify_pkcs1v15(
        self,
        spki_der: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> ReceiptResult<()> {
        let key = RsaPublicKey::from_public_key_der(spki_der)
            .map_err(|e| invalid(format!("bad RSA public key: {e}")))?;
        let signature = pkcs1v15::Signature::try_from(signature)
            .map_err(|e| invalid(format!("bad RSA signature bytes: {e}")))?;
        let outcome = match self {
            Self::Sha1 => pkcs1v15::VerifyingKey::<Sha1>::new(key).verify(message, &signature),
            Self::Sha256 => pkcs1v15::VerifyingKey::<Sha256>::new(key).verify(message, &signature),
            Self::Sha384 => pkcs1v15::VerifyingKey::<Sha384>::new(key).verify(message, &signature),
            Self::Sha512 => pkcs1v15::VerifyingKey::<Sha512>::new(key).verify(message, &signature),
        };
        outcome.map_err(|_| invalid("RSA signature mismatch"))
    }
}

fn verify_signer(
    signer: &SignerInfo<'_>,
    certificate: &X509Certificate<'_>,
    content: &[u8],
) -> ReceiptResult<()> {
    let digest = DigestAlgorithm::from_oid(signer.digest_algorithm).ok_or_else(|| {
        invalid(format!(
            "unsupported digest algorithm {}",
            format_oid(signer.digest_algorithm)
        ))
    })?;

    if signer.signature_algorithm != oid::RSA_ENCRYPTION
        && DigestAlgorithm::from_rsa_signature_oid(signer.signature_algorithm) != Some(digest)
    {
        return Err(invalid(format!(
            "unsupported signature algorithm {}",
            format_oid(signer.signature_algorithm)
        )));
    }

    let spki = certificate.tbs_certificate.subject_pki.raw;
    match signer.signed_attributes {
        Some(attributes) => {
            check_signed_attributes(attributes, &digest.digest(content))?;
            // The signature covers the attributes re-tagged as a universal SET.
            let mut message = attributes.to_vec();
            message[0] = 0x31;
            digest.verify_pkcs1v15(spki, &message, signer.signature)
        }
        None => digest.verify_pkcs1v15(spki, content, signer.signature),
    }
}

/// Requires a `messageDigest` attribute matching the content, and a `data`
/// content type when that attribute is present.
fn check_signed_attributes(encoded: &[u8], content_digest: &[u8]) -> ReceiptResult<()> {
    let mut outer = Cursor::new(encoded);
    let set = outer.read_header().map_err(as_invalid)?;
    let mut attributes = outer.enter(&set);
    let mut digest_matched = false;

    while !attributes.is_at_end() {
        let attribute = attributes.expect(tag::SEQUENCE).map_err(as_invalid)?;
        let mut fields = attributes.enter(&attribute);
        attributes.skip(&attribute).map_err(as_invalid)?;

        let attribute_type = read_oid(&mut fields).map_err(as_invalid)?;
        let values = fields.expect(tag::SET).map_err(as_invalid)?;
        let mut values = fields.enter(&values);

        match attribute_type {
            oid::MESSAGE_DIGEST => {
                let value = read_octet_string(&mut values, 0).map_err(as_invalid)?;
                if value.as_ref() != content_digest {
                    return Err(invalid("message digest does not match the receipt content"));
                }
                digest_matched = true;
            }
            oid::CONTENT_TYPE => {
                if read_oid(&mut values).map_err(as_invalid)? != oid::DATA {
                    return Err(invalid("signed content type is not data"));
                }
            }
            _ => {}
        }
    }

    if digest_matched {
        Ok(())
    } else {
        Err(invalid("signed attributes carry no message digest"))
    }
}

/// Walks issuer links from `leaf` through `pool` until a certificate issued by
/// (or identical to) `root`. Every intermediate issuer must be a CA; the root is
/// trusted as configured.
fn verify_chain(
    leaf: &X509Certificate<'_>,
    pool: &[X509Certificate<'_>],
    root: &X509Certificate<'_>,
) -> ReceiptResult<()> {
    let mut current = leaf;
    for _ in 0..MAX_CHAIN_DEPTH {
        if same_certificate(current, root) {
            return Ok(());
        }
        if current.tbs_certificate.issuer.as_raw() == root.tbs_certificate.subject.as_raw() {
            return verify_certificate_signature(current, root);
        }
        let issuer = pool
            .iter()
            .find(|candidate| {
                candidate.tbs_certificate.subject.as_raw() == current.tbs_certificate.issuer.as_raw()
                    && !same_certificate(candidate, current)
            })
            .ok_or_else(|| {
                invalid(format!(
                    "no trusted issuer for {}",
                    current.tbs_certificate.subject
                ))
            })?;
        require_ca(issuer)?;
        verify_certificate_signature(current, issuer)?;
        current = issuer;
    }
    Err(invalid("certificate chain too long"))
}

/// Requires `certificate` to be a CA allowed to sign certificates: basic
/// constraints with `cA` set and, when key usage is present, `keyCertSign`.
fn require_ca(certificate: &X509Certificate<'_>) -> ReceiptResult<()> {
    let mut is_ca = false;
    let mut may_sign_certificates = true;
    for extension in certificate.extensions() {
        match extension.parsed_extension() {
            ParsedExtension::BasicConstraints(constraints) => is_ca = constraints.ca,
            ParsedExtension::KeyUsage(usage) => may_sign_certificates = usage.key_cert_sign(),
            _ => {}
        }
    }
    if is_ca && may_sign_certificates {
        Ok(())
    } else {
        Err(invalid(format!(
            "issuer {} is not a certificate authority",
            certificate.tbs_certificate.subject
        )))
    }
}

fn verify_certificate_signature(
    certificate: &X509Certificate<'_>,
    issuer: &X509Certificate<'_>,
) -> ReceiptResult<()> {
    let algorithm = certificate.signature_algorithm.algorithm.as_bytes();
    let digest = DigestAlgorithm::from_rsa_signature_oid(algorithm).ok_or_else(|| {
        invalid(format!(
            "unsupported certificate signature algorithm {}",
            format_oid(algorithm)
        ))
    })?;
    let signature: &[u8] = certificate.signature_value.data.as_ref();
    digest
        .verify_pkcs1v15(
            issuer.tbs_certificate.subject_pki.raw,
            certificate.tbs_certificate.as_ref(),
            signature,
        )
        .map_err(|_| {
            invalid(format!(
                "certificate {} is not signed by {}",
                certificate.tbs_certificate.subject, issuer.tbs_certificate.subject
            ))
        })
}

fn same_certificate(a: &X509Certificate<'_>, b: &X509Certificate<'_>) -> bool {
    a.tbs_certificate.as_ref() == b.tbs_certificate.as_ref()
}

fn parse_certificate(der: &[u8]) -> ReceiptResult<X509Certificate<'_>> {
    x509_parser::parse_x509_certificate(der)
        .map(|(_, certificate)| certificate)
        .map_err(|e| invalid(format!("invalid certificate DER: {e}")))
}

fn as_invalid(error: ReceiptError) -> ReceiptError {
    invalid(error.to_string())
}

fn invalid(detail: impl Into<String>) -> ReceiptError {
    ReceiptError::SignatureInvalid(detail.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_environment_skips_chain() {
        assert!(!Environment::Debug.requires_chain_verification());
        assert!(Environment::TestFlight.requires_chain_verification());
        assert!(Environment::AppStore.requires_chain_verification());
    }

    #[test]
    fn environment_detection() {
        let sandbox = Path::new("/var/app/StoreKit/sandboxReceipt");
        let production = Path::new("/var/app/StoreKit/receipt");
        assert_eq!(Environment::detect(sandbox, true), Environment::Debug);
        assert_eq!(Environment::detect(sandbox, false), Environment::TestFlight);
        assert_eq!(Environment::detect(production, false), Environment::AppStore);
        assert_eq!(Environment::TestFlight.to_string(), "testflight");
    }

    #[test]
    fn environment_parses_its_display_form() {
        for env in [Environment::Debug, Environment::TestFlight, Environment::AppStore] {
            assert_eq!(env.to_string().parse::<Environment>(), Ok(env));
        }
        assert_eq!("AppStore".parse::<Environment>(), Ok(Environment::AppStore));
        assert!("production".parse::<Environment>().is_err());
    }

    #[test]
    fn digest_oids_resolve() {
        assert_eq!(DigestAlgorithm::from_oid(oid::SHA1), Some(DigestAlgorithm::Sha1));
        assert_eq!(DigestAlgorithm::from_oid(oid::SHA256), Some(DigestAlgorithm::Sha256));
        assert_eq!(
            DigestAlgorithm::from_rsa_signature_oid(oid::SHA256_WITH_RSA),
            Some(DigestAlgorithm::Sha256)
        );
        assert_eq!(DigestAlgorithm::from_oid(oid::RSA_ENCRYPTION), None);
    }

    #[test]
    fn sha1_digest_length() {
        assert_eq!(DigestAlgorithm::Sha1.digest(b"receipt").len(), 20);
        assert_eq!(DigestAlgorithm::Sha256.digest(b"receipt").len(), 32);
    }

    #[test]
    fn garbage_root_is_rejected() {
        let err = TrustAnchor::from_der(vec![0x30, 0x03, 0x02, 0x01, 0x01]).unwrap_err();
        assert!(matches!(err, ReceiptError::SignatureInvalid(_)));
    }

    #[test]
    fn missing_root_file_is_signature_failure() {
        let err = TrustAnchor::load("/nonexistent/AppleIncRootCertificate.cer").unwrap_err();
        assert!(matches!(err, ReceiptError::SignatureInvalid(_)));
    }
}
