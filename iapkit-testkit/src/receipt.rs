//! Receipt payloads and signed envelopes.

use crate::cert::{pki, TestCertificate};
use crate::der::{
    algorithm, constructed, context, ia5_string, integer, octet_string, oid, sequence, set, tag,
    tlv, utf8_string,
};
use rsa::pkcs1v15::SigningKey;
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use signature::{SignatureEncoding as _, Signer as _};

pub const TEST_BUNDLE_ID: &str = "com.example.app";
pub const TEST_BUNDLE_VERSION: &str = "1.0";
pub const TEST_DEVICE_ID: [u8; 16] = [
    0x3f, 0x2c, 0x6b, 0x1a, 0x9d, 0x04, 0x4e, 0x71, 0x8a, 0x55, 0xc2, 0x0e, 0x7b, 0x91, 0xd3, 0x48,
];
pub const TEST_OPAQUE_VALUE: [u8; 16] = [
    0xa1, 0x07, 0x5e, 0x33, 0x90, 0xcc, 0x12, 0x6d, 0x44, 0xe8, 0x0b, 0x7f, 0x25, 0xb6, 0x19, 0xfa,
];

const SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
const DATA: &str = "1.2.840.113549.1.7.1";
const CONTENT_TYPE: &str = "1.2.840.113549.1.9.3";
const MESSAGE_DIGEST: &str = "1.2.840.113549.1.9.4";
const RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";

/// SHA-1(device ++ opaque ++ DER of the bundle id UTF8String).
#[must_use]
pub fn device_hash(device_id: &[u8; 16], opaque_value: &[u8], bundle_id: &str) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(device_id);
    hasher.update(opaque_value);
    hasher.update(utf8_string(bundle_id));
    hasher.finalize().into()
}

/// Encodes one `SEQUENCE { type, version, OCTET STRING value }`.
#[must_use]
pub fn attribute_record(attribute_type: i64, version: i64, value: &[u8]) -> Vec<u8> {
    sequence(&[integer(attribute_type), integer(version), octet_string(value)])
}

/// Builder for a receipt-level attribute SET.
#[derive(Debug, Clone, Default)]
pub struct ReceiptPayload {
    records: Vec<Vec<u8>>,
}

impl ReceiptPayload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload bound to the test app, build and device.
    #[must_use]
    pub fn bound() -> Self {
        Self::bound_to(TEST_BUNDLE_ID, TEST_BUNDLE_VERSION, &TEST_DEVICE_ID)
    }

    /// Payload carrying bundle id, version, opaque value and a matching hash.
    #[must_use]
    pub fn bound_to(bundle_id: &str, bundle_version: &str, device_id: &[u8; 16]) -> Self {
        Self::new()
            .bundle_id(bundle_id)
            .bundle_version(bundle_version)
            .opaque_value(&TEST_OPAQUE_VALUE)
            .sha1_hash(&device_hash(device_id, &TEST_OPAQUE_VALUE, bundle_id))
    }

    /// Appends an arbitrary record with version 1.
    #[must_use]
    pub fn attribute(self, attribute_type: i64, value: &[u8]) -> Self {
        self.record(attribute_record(attribute_type, 1, value))
    }

    /// Appends a pre-encoded record.
    #[must_use]
    pub fn record(mut self, encoded: Vec<u8>) -> Self {
        self.records.push(encoded);
        self
    }

    #[must_use]
    pub fn bundle_id(self, bundle_id: &str) -> Self {
        self.attribute(2, &utf8_string(bundle_id))
    }

    #[must_use]
    pub fn bundle_version(self, version: &str) -> Self {
        self.attribute(3, &utf8_string(version))
    }

    #[must_use]
    pub fn opaque_value(self, opaque: &[u8]) -> Self {
        self.attribute(4, opaque)
    }

    #[must_use]
    pub fn sha1_hash(self, hash: &[u8]) -> Self {
        self.attribute(5, hash)
    }

    #[must_use]
    pub fn creation_date(self, timestamp: &str) -> Self {
        self.attribute(12, &ia5_string(timestamp))
    }

    #[must_use]
    pub fn original_app_version(self, version: &str) -> Self {
        self.attribute(19, &utf8_string(version))
    }

    #[must_use]
    pub fn expiration_date(self, timestamp: &str) -> Self {
        self.attribute(21, &ia5_string(timestamp))
    }

    #[must_use]
    pub fn in_app(self, purchase: &InAppRecord) -> Self {
        self.attribute(17, &purchase.encode())
    }

    /// The attribute SET encoding.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        set(&self.records)
    }
}

/// Builder for one nested in-app purchase SET.
#[derive(Debug, Clone, Default)]
pub struct InAppRecord {
    records: Vec<Vec<u8>>,
}

impl InAppRecord {
    /// A purchase of `product_id` with quantity 1 and a transaction id.
    #[must_use]
    pub fn product(product_id: &str) -> Self {
        Self::default()
            .attribute(1701, &integer(1))
            .attribute(1702, &utf8_string(product_id))
            .attribute(1703, &utf8_string(&format!("1000000{}", product_id.len())))
    }

    /// An in-app record with no product identifier.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn attribute(mut self, attribute_type: i64, value: &[u8]) -> Self {
        self.records.push(attribute_record(attribute_type, 1, value));
        self
    }

    #[must_use]
    pub fn purchase_date(self, timestamp: &str) -> Self {
        self.attribute(1704, &ia5_string(timestamp))
    }

    #[must_use]
    pub fn original_transaction_id(self, id: &str) -> Self {
        self.attribute(1705, &utf8_string(id))
    }

    #[must_use]
    pub fn subscription_expiration_date(self, timestamp: &str) -> Self {
        self.attribute(1708, &ia5_string(timestamp))
    }

    #[must_use]
    pub fn cancellation_date(self, timestamp: &str) -> Self {
        self.attribute(1712, &ia5_string(timestamp))
    }

    #[must_use]
    pub fn intro_offer(self, active: bool) -> Self {
        self.attribute(1719, &integer(i64::from(active)))
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        set(&self.records)
    }
}

/// Digest used for the signer info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestChoice {
    Sha1,
    Sha256,
}

impl DigestChoice {
    fn oid(self) -> &'static str {
        match self {
            Self::Sha1 => "1.3.14.3.2.26",
            Self::Sha256 => "2.16.840.1.101.3.4.2.1",
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    fn sign(self, certificate: &TestCertificate, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => SigningKey::<Sha1>::new(certificate.key.clone())
                .sign(message)
                .to_vec(),
            Self::Sha256 => SigningKey::<Sha256>::new(certificate.key.clone())
                .sign(message)
                .to_vec(),
        }
    }
}

/// Builder for a PKCS #7 signed-data receipt envelope.
#[derive(Debug, Clone)]
pub struct SignedReceiptBuilder<'a> {
    content: Vec<u8>,
    signer: &'a TestCertificate,
    certificates: Vec<&'a TestCertificate>,
    digest: DigestChoice,
    signed_attributes: bool,
    indefinite: bool,
    chunk_size: Option<usize>,
    outer_type: String,
    inner_type: String,
    tamper: bool,
    detached: bool,
}

impl<'a> SignedReceiptBuilder<'a> {
    /// Envelope around `content`, signed by `signer`, embedding only the signer.
    #[must_use]
    pub fn new(content: Vec<u8>, signer: &'a TestCertificate) -> Self {
        Self {
            content,
            signer,
            certificates: vec![signer],
            digest: DigestChoice::Sha256,
            signed_attributes: true,
            indefinite: false,
            chunk_size: None,
            outer_type: SIGNED_DATA.to_string(),
            inner_type: DATA.to_string(),
            tamper: false,
            detached: false,
        }
    }

    #[must_use]
    pub fn certificates(mut self, certificates: Vec<&'a TestCertificate>) -> Self {
        self.certificates = certificates;
        self
    }

    #[must_use]
    pub fn digest(mut self, digest: DigestChoice) -> Self {
        self.digest = digest;
        self
    }

    /// Sign the content directly instead of authenticated attributes.
    #[must_use]
    pub fn without_signed_attributes(mut self) -> Self {
        self.signed_attributes = false;
        self
    }

    /// Use BER indefinite lengths on the constructed envelope records.
    #[must_use]
    pub fn indefinite(mut self) -> Self {
        self.indefinite = true;
        self
    }

    /// Split the content into constructed OCTET STRING chunks.
    #[must_use]
    pub fn chunked(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }

    #[must_use]
    pub fn outer_content_type(mut self, dotted: &str) -> Self {
        self.outer_type = dotted.to_string();
        self
    }

    #[must_use]
    pub fn inner_content_type(mut self, dotted: &str) -> Self {
        self.inner_type = dotted.to_string();
        self
    }

    /// Flip one content bit after signing.
    #[must_use]
    pub fn tamper(mut self) -> Self {
        self.tamper = true;
        self
    }

    /// Omit the encapsulated content.
    #[must_use]
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let digest_algorithm = algorithm(self.digest.oid());

        let (signed_attributes, signature) = if self.signed_attributes {
            let attributes = [
                sequence(&[oid(CONTENT_TYPE), set(&[oid(DATA)])]),
                sequence(&[
                    oid(MESSAGE_DIGEST),
                    set(&[octet_string(&self.digest.digest(&self.content))]),
                ]),
            ]
            .concat();
            let signature = self.digest.sign(self.signer, &tlv(tag::SET, &attributes));
            (Some(context(0, &attributes)), signature)
        } else {
            (None, self.digest.sign(self.signer, &self.content))
        };

        let mut content = self.content.clone();
        if self.tamper {
            if let Some(last) = content.last_mut() {
                *last ^= 0x01;
            }
        }

        let mut encapsulated = oid(&self.inner_type);
        if !self.detached {
            let octets = match self.chunk_size {
                Some(size) => {
                    let chunks: Vec<Vec<u8>> = content.chunks(size).map(octet_string).collect();
                    constructed(0x24, &chunks.concat(), self.indefinite)
                }
                None => octet_string(&content),
            };
            encapsulated.extend(constructed(0xa0, &octets, self.indefinite));
        }

        let mut signer_info = vec![
            integer(1),
            sequence(&[
                self.signer.issuer.clone(),
                tlv(tag::INTEGER, &self.signer.serial),
            ]),
            digest_algorithm.clone(),
        ];
        signer_info.extend(signed_attributes);
        signer_info.push(algorithm(RSA_ENCRYPTION));
        signer_info.push(octet_string(&signature));

        let certificates: Vec<u8> = self
            .certificates
            .iter()
            .flat_map(|c| c.der.iter().copied())
            .collect();

        let mut signed_data = vec![
            integer(1),
            set(&[digest_algorithm]),
            constructed(tag::SEQUENCE, &encapsulated, self.indefinite),
        ];
        if !self.certificates.is_empty() {
            signed_data.push(context(0, &certificates));
        }
        signed_data.push(set(&[sequence(&signer_info)]));

        let signed_data = constructed(tag::SEQUENCE, &signed_data.concat(), self.indefinite);
        let explicit = constructed(0xa0, &signed_data, self.indefinite);
        constructed(
            tag::SEQUENCE,
            &[oid(&self.outer_type), explicit].concat(),
            self.indefinite,
        )
    }
}

/// A store-style receipt: leaf signer, intermediate embedded, indefinite
/// lengths, SHA-256 with authenticated attributes.
#[must_use]
pub fn store_receipt(payload: &ReceiptPayload) -> Vec<u8> {
    let pki = pki();
    SignedReceiptBuilder::new(payload.encode(), &pki.leaf)
        .certificates(vec![&pki.leaf, &pki.intermediate])
        .indefinite()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_hash_covers_bundle_id_der() {
        let with_der = device_hash(&TEST_DEVICE_ID, &TEST_OPAQUE_VALUE, TEST_BUNDLE_ID);
        let mut hasher = Sha1::new();
        hasher.update(TEST_DEVICE_ID);
        hasher.update(TEST_OPAQUE_VALUE);
        hasher.update(TEST_BUNDLE_ID.as_bytes());
        let text_only: [u8; 20] = hasher.finalize().into();
        assert_ne!(with_der, text_only);
    }

    #[test]
    fn payload_is_a_set() {
        let encoded = ReceiptPayload::bound().encode();
        assert_eq!(encoded[0], tag::SET);
    }
}
