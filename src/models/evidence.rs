use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use super::dispute_case::EvidenceKind;
use super::files::UploadedFile;

/// Klarna request identifier. The counterpart sends either numbers or strings
/// and expects the same representation back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Text(s) => f.write_str(s),
        }
    }
}

/// Evidence for card and alternate-payment disputes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericEvidence {
    pub tracking_number: String,
    pub carrier_name: String,
    pub refund_id: String,
    pub note: String,
    pub files: Vec<UploadedFile>,
}

/// Afterpay's fixed evidence field set. Each file slot holds at most one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AfterpayEvidence {
    pub product_description: String,
    pub shipping_address: String,
    pub shipping_carrier: String,
    pub shipping_date: String,
    pub shipping_tracking_number: String,
    pub shipping_document: Option<UploadedFile>,
    pub refund_policy_disclosure: String,
    pub refund_refusal_explanation: String,
    pub refund_policy: Option<UploadedFile>,
}

impl AfterpayEvidence {
    /// First file in slot order, used as the uncategorized attachment.
    /// Slot order wins over upload order: the shipping document is chosen
    /// whenever present, even if the refund policy was uploaded first.
    pub fn first_uploaded_file(&self) -> Option<&UploadedFile> {
        self.shipping_document
            .as_ref()
            .or(self.refund_policy.as_ref())
    }
}

/// The five keys of a shipment field set.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShipmentKey {
    CaptureId,
    IsShippingCompanyContacted,
    ShippingCarrier,
    ShippingDate,
    TrackingId,
}

/// Values for one shipment instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipmentValues {
    pub capture_id: String,
    pub is_shipping_company_contacted: String,
    pub shipping_carrier: String,
    pub shipping_date: String,
    pub tracking_id: String,
}

impl ShipmentValues {
    pub fn get(&self, key: ShipmentKey) -> &str {
        match key {
            ShipmentKey::CaptureId => &self.capture_id,
            ShipmentKey::IsShippingCompanyContacted => &self.is_shipping_company_contacted,
            ShipmentKey::ShippingCarrier => &self.shipping_carrier,
            ShipmentKey::ShippingDate => &self.shipping_date,
            ShipmentKey::TrackingId => &self.tracking_id,
        }
    }

    pub fn set(&mut self, key: ShipmentKey, value: String) {
        let slot = match key {
            ShipmentKey::CaptureId => &mut self.capture_id,
            ShipmentKey::IsShippingCompanyContacted => &mut self.is_shipping_company_contacted,
            ShipmentKey::ShippingCarrier => &mut self.shipping_carrier,
            ShipmentKey::ShippingDate => &mut self.shipping_date,
            ShipmentKey::TrackingId => &mut self.tracking_id,
        };
        *slot = value;
    }

    /// All five keys carry a non-blank value.
    pub fn is_complete(&self) -> bool {
        ShipmentKey::iter().all(|key| !self.get(key).trim().is_empty())
    }

    /// At least one key carries a non-blank value.
    pub fn has_any_value(&self) -> bool {
        ShipmentKey::iter().any(|key| !self.get(key).trim().is_empty())
    }

    /// Key/value pairs with blank values dropped.
    pub fn non_empty_entries(&self) -> BTreeMap<String, String> {
        ShipmentKey::iter()
            .filter(|key| !self.get(*key).trim().is_empty())
            .map(|key| (key.to_string(), self.get(key).to_string()))
            .collect()
    }
}

/// Values for one Klarna request, aligned with the parsed schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlarnaRequestValues {
    pub request_id: RequestId,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// `list_of_shipments`; `None` when the request asks for no shipments.
    #[serde(default, rename = "list_of_shipments")]
    pub shipments: Option<Vec<ShipmentValues>>,
}

impl KlarnaRequestValues {
    pub fn value(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Klarna evidence: per-request values plus the case-wide attachment list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KlarnaEvidence {
    pub requests: Vec<KlarnaRequestValues>,
    pub attachments: Vec<UploadedFile>,
}

/// The in-progress evidence for the open case, in its vendor's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidencePackage {
    Generic(GenericEvidence),
    Afterpay(AfterpayEvidence),
    Klarna(KlarnaEvidence),
}

impl EvidencePackage {
    /// Empty package of the given shape. Klarna packages are seeded from the
    /// parsed schema instead; this yields one with no requests.
    pub fn empty(kind: EvidenceKind) -> Self {
        match kind {
            EvidenceKind::Generic => EvidencePackage::Generic(GenericEvidence::default()),
            EvidenceKind::Afterpay => EvidencePackage::Afterpay(AfterpayEvidence::default()),
            EvidenceKind::Klarna => EvidencePackage::Klarna(KlarnaEvidence::default()),
        }
    }

    pub fn kind(&self) -> EvidenceKind {
        match self {
            EvidencePackage::Generic(_) => EvidenceKind::Generic,
            EvidencePackage::Afterpay(_) => EvidenceKind::Afterpay,
            EvidencePackage::Klarna(_) => EvidenceKind::Klarna,
        }
    }

    /// Every uploaded file held by the package, in slot order.
    pub fn uploaded_files(&self) -> Vec<&UploadedFile> {
        match self {
            EvidencePackage::Generic(generic) => generic.files.iter().collect(),
            EvidencePackage::Afterpay(afterpay) => afterpay
                .shipping_document
                .iter()
                .chain(afterpay.refund_policy.iter())
                .collect(),
            EvidencePackage::Klarna(klarna) => klarna.attachments.iter().collect(),
        }
    }
}
