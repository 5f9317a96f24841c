//! Receipt attribute decoding.
//!
//! The receipt payload is a SET of `SEQUENCE { type INTEGER, version INTEGER,
//! value OCTET STRING }` records. In-app purchase records (type 17) carry the
//! same structure inside their value, so one walker serves both levels.

use crate::asn1::{decode_date, decode_integer, decode_octets, decode_string, tag, Cursor};
use crate::error::{ReceiptError, ReceiptResult};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// A product identifier as configured in the store.
pub type ProductId = String;

/// Unique product identifiers proven by a receipt.
pub type ProductSet = BTreeSet<ProductId>;

/// Receipt-level attribute types.
pub mod attribute_type {
    pub const BUNDLE_ID: i64 = 2;
    pub const BUNDLE_VERSION: i64 = 3;
    pub const OPAQUE_VALUE: i64 = 4;
    pub const SHA1_HASH: i64 = 5;
    pub const CREATION_DATE: i64 = 12;
    pub const IN_APP_PURCHASE: i64 = 17;
    pub const ORIGINAL_APP_VERSION: i64 = 19;
    pub const EXPIRATION_DATE: i64 = 21;
}

/// In-app purchase attribute types.
pub mod in_app_type {
    pub const QUANTITY: i64 = 1701;
    pub const PRODUCT_ID: i64 = 1702;
    pub const TRANSACTION_ID: i64 = 1703;
    pub const PURCHASE_DATE: i64 = 1704;
    pub const ORIGINAL_TRANSACTION_ID: i64 = 1705;
    pub const ORIGINAL_PURCHASE_DATE: i64 = 1706;
    pub const SUBSCRIPTION_EXPIRATION_DATE: i64 = 1708;
    pub const WEB_ORDER_LINE_ITEM_ID: i64 = 1711;
    pub const CANCELLATION_DATE: i64 = 1712;
    pub const IS_IN_INTRO_OFFER_PERIOD: i64 = 1719;
}

/// One decoded attribute record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeRecord<'a> {
    pub attribute_type: i64,
    pub version: i64,
    /// Content of the value OCTET STRING.
    pub value: &'a [u8],
}

/// A receipt-level attribute, classified by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptAttribute<'a> {
    BundleId(&'a [u8]),
    BundleVersion(&'a [u8]),
    OpaqueValue(&'a [u8]),
    Sha1Hash(&'a [u8]),
    CreationDate(&'a [u8]),
    /// A nested attribute set describing one purchase.
    InAppPurchase(&'a [u8]),
    OriginalAppVersion(&'a [u8]),
    ExpirationDate(&'a [u8]),
    Unknown(i64),
}

impl<'a> From<AttributeRecord<'a>> for ReceiptAttribute<'a> {
    fn from(record: AttributeRecord<'a>) -> Self {
        let value = record.value;
        match record.attribute_type {
            attribute_type::BUNDLE_ID => Self::BundleId(value),
            attribute_type::BUNDLE_VERSION => Self::BundleVersion(value),
            attribute_type::OPAQUE_VALUE => Self::OpaqueValue(value),
            attribute_type::SHA1_HASH => Self::Sha1Hash(value),
            attribute_type::CREATION_DATE => Self::CreationDate(value),
            attribute_type::IN_APP_PURCHASE => Self::InAppPurchase(value),
            attribute_type::ORIGINAL_APP_VERSION => Self::OriginalAppVersion(value),
            attribute_type::EXPIRATION_DATE => Self::ExpirationDate(value),
            other => Self::Unknown(other),
        }
    }
}

/// Walks an attribute SET, handing each record to `visit`.
///
/// The SET must span the whole payload. The cursor moves by each record's
/// declared length and must land exactly on the end of the set.
///
/// # Errors
///
/// Returns [`ReceiptError::MalformedPayload`] if the payload is not a SET of
/// well-formed attribute sequences, or whatever `visit` returns.
pub fn walk_attributes<'a>(
    payload: &'a [u8],
    mut visit: impl FnMut(AttributeRecord<'a>) -> ReceiptResult<()>,
) -> ReceiptResult<()> {
    let mut outer = Cursor::new(payload);
    let set = outer.read_header().map_err(structural)?;
    if !set.is_universal(tag::SET) {
        return Err(ReceiptError::MalformedPayload(format!(
            "attribute payload starts with tag {}, not SET",
            set.number
        )));
    }

    let mut cursor = outer.enter(&set);
    outer.skip(&set).map_err(structural)?;
    if !outer.is_at_end() {
        return Err(ReceiptError::MalformedPayload(format!(
            "{} bytes follow the attribute SET",
            outer.remaining()
        )));
    }

    while !cursor.is_at_end() {
        let record = cursor.read_header().map_err(structural)?;
        if !record.is_universal(tag::SEQUENCE) {
            return Err(ReceiptError::MalformedPayload(format!(
                "attribute record has tag {}, not SEQUENCE",
                record.number
            )));
        }

        let mut fields = cursor.enter(&record);
        let attribute_type = decode_integer(&mut fields)?;
        let version = decode_integer(&mut fields)?;
        let value = fields.read_header().map_err(structural)?;
        if !value.is_universal(tag::OCTET_STRING) || value.constructed {
            return Err(ReceiptError::MalformedPayload(format!(
                "attribute {attribute_type} value has tag {}, not OCTET STRING",
                value.number
            )));
        }

        visit(AttributeRecord {
            attribute_type,
            version,
            value: fields.content(&value),
        })?;
        cursor.skip(&record).map_err(structural)?;
    }
    Ok(())
}

/// Fields decoded from a receipt payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiptFields {
    pub bundle_id: Option<String>,
    /// Full DER of the bundle id value, as hashed for device binding.
    #[serde(serialize_with = "hex_opt")]
    pub bundle_id_raw: Option<Vec<u8>>,
    pub bundle_version: Option<String>,
    #[serde(serialize_with = "hex_opt")]
    pub opaque_value: Option<Vec<u8>>,
    #[serde(serialize_with = "hex_opt")]
    pub sha1_hash: Option<Vec<u8>>,
    pub receipt_creation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub original_app_version: Option<String>,
    pub in_app_purchases: Vec<InAppPurchase>,
}

impl ReceiptFields {
    /// Decodes the receipt payload.
    ///
    /// Unknown attribute types are skipped. Unparsable dates are left absent;
    /// any other field that fails to decode fails the whole payload.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::MalformedPayload`] on structural damage and
    /// [`ReceiptError::MalformedField`] on an undecodable field.
    pub fn from_payload(payload: &[u8]) -> ReceiptResult<Self> {
        let mut fields = Self::default();
        walk_attributes(payload, |record| fields.apply(ReceiptAttribute::from(record)))?;
        debug!(
            bundle_id = fields.bundle_id.as_deref().unwrap_or_default(),
            in_app_purchases = fields.in_app_purchases.len(),
            "Receipt attributes decoded"
        );
        Ok(fields)
    }

    fn apply(&mut self, attribute: ReceiptAttribute<'_>) -> ReceiptResult<()> {
        match attribute {
            ReceiptAttribute::BundleId(value) => {
                self.bundle_id = Some(decode_string(value)?);
                self.bundle_id_raw = Some(decode_octets(value));
            }
            ReceiptAttribute::BundleVersion(value) => {
                self.bundle_version = Some(decode_string(value)?);
            }
            ReceiptAttribute::OpaqueValue(value) => self.opaque_value = Some(decode_octets(value)),
            ReceiptAttribute::Sha1Hash(value) => self.sha1_hash = Some(decode_octets(value)),
            ReceiptAttribute::CreationDate(value) => {
                self.receipt_creation_date = soft_date("receipt_creation_date", value);
            }
            ReceiptAttribute::InAppPurchase(value) => {
                self.in_app_purchases.push(InAppPurchase::from_payload(value)?);
            }
            ReceiptAttribute::OriginalAppVersion(value) => {
                self.original_app_version = Some(decode_string(value)?);
            }
            ReceiptAttribute::ExpirationDate(value) => {
                self.expiration_date = soft_date("expiration_date", value);
            }
            ReceiptAttribute::Unknown(attribute_type) => {
                trace!(attribute_type, "Skipping unrecognised receipt attribute");
            }
        }
        Ok(())
    }

    /// Product identifiers of every in-app purchase that names one.
    #[must_use]
    pub fn product_ids(&self) -> ProductSet {
        self.in_app_purchases
            .iter()
            .filter_map(|purchase| purchase.product_id.clone())
            .collect()
    }
}

/// One in-app purchase record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InAppPurchase {
    pub quantity: Option<i64>,
    pub product_id: Option<ProductId>,
    pub transaction_id: Option<String>,
    pub original_transaction_id: Option<String>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub original_purchase_date: Option<DateTime<Utc>>,
    pub subscription_expiration_date: Option<DateTime<Utc>>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub web_order_line_item_id: Option<i64>,
    pub is_in_intro_offer_period: Option<bool>,
}

impl InAppPurchase {
    /// Decodes a nested in-app purchase attribute set.
    ///
    /// # Errors
    ///
    /// Same as [`ReceiptFields::from_payload`].
    pub fn from_payload(payload: &[u8]) -> ReceiptResult<Self> {
        let mut purchase = Self::default();
        walk_attributes(payload, |record| {
            let value = record.value;
            match record.attribute_type {
                in_app_type::QUANTITY => purchase.quantity = Some(integer_value(value)?),
                in_app_type::PRODUCT_ID => purchase.product_id = Some(decode_string(value)?),
                in_app_type::TRANSACTION_ID => {
                    purchase.transaction_id = Some(decode_string(value)?);
                }
                in_app_type::ORIGINAL_TRANSACTION_ID => {
                    purchase.original_transaction_id = Some(decode_string(value)?);
                }
                in_app_type::PURCHASE_DATE => {
                    purchase.purchase_date = soft_date("purchase_date", value);
                }
                in_app_type::ORIGINAL_PURCHASE_DATE => {
                    purchase.original_purchase_date = soft_date("original_purchase_date", value);
                }
                in_app_type::SUBSCRIPTION_EXPIRATION_DATE => {
                    purchase.subscription_expiration_date =
                        soft_date("subscription_expiration_date", value);
                }
                in_app_type::CANCELLATION_DATE => {
                    purchase.cancellation_date = soft_date("cancellation_date", value);
                }
                in_app_type::WEB_ORDER_LINE_ITEM_ID => {
                    purchase.web_order_line_item_id = Some(integer_value(value)?);
                }
                in_app_type::IS_IN_INTRO_OFFER_PERIOD => {
                    purchase.is_in_intro_offer_period = Some(integer_value(value)? != 0);
                }
                other => trace!(attribute_type = other, "Skipping unrecognised in-app attribute"),
            }
            Ok(())
        })?;
        Ok(purchase)
    }
}

fn integer_value(value: &[u8]) -> ReceiptResult<i64> {
    decode_integer(&mut Cursor::new(value))
}

/// Decodes an optional date; an unparsable one is logged and left absent.
fn soft_date(field: &'static str, value: &[u8]) -> Option<DateTime<Utc>> {
    match decode_date(value) {
        Ok(date) => Some(date),
        Err(e) => {
            debug!(field, error = %e, "Ignoring unparsable receipt date");
            None
        }
    }
}

/// Header failures at structural positions describe the payload, not a field.
fn structural(error: ReceiptError) -> ReceiptError {
    match error {
        ReceiptError::MalformedField(detail) => ReceiptError::MalformedPayload(detail),
        other => other,
    }
}

fn hex_opt<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
        None => serializer.serialize_none(),
    }
}
