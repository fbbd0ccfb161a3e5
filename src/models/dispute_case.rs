use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Payment counterpart whose evidence schema a case follows.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Vendor {
    Card,
    Paze,
    Afterpay,
    Klarna,
}

impl Vendor {
    /// Which of the three evidence shapes this vendor uses.
    pub fn evidence_kind(&self) -> EvidenceKind {
        match self {
            Vendor::Card | Vendor::Paze => EvidenceKind::Generic,
            Vendor::Afterpay => EvidenceKind::Afterpay,
            Vendor::Klarna => EvidenceKind::Klarna,
        }
    }
}

/// The three incompatible evidence data shapes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EvidenceKind {
    Generic,
    Afterpay,
    Klarna,
}

/// Dispute case status as reported by the backend.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CaseStatus {
    RequestInfo,
    UnderReview,
    LostWaitingForRefund,
    Won,
    Lost,
    Closed,
}

/// External dispute case identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaseId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CaseId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Internal record identifier, used only by the generic upload path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Reason codes that oblige the merchant to prove shipment.
const SHIPPING_PROOF_REASONS: [&str; 2] = ["unauthorized", "merchandise or service not received"];

/// One payment dispute, fetched by the case list gateway. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeCase {
    pub case_id: CaseId,
    #[serde(default)]
    pub record_id: Option<RecordId>,
    pub vendor: Vendor,
    pub status: CaseStatus,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub reason_code: String,
    #[serde(default)]
    pub description: String,
    /// Opaque vendor requirement description, only present for Klarna cases.
    #[serde(default)]
    pub requests_raw: Option<serde_json::Value>,
}

impl DisputeCase {
    /// True when the reason code requires tracking number and carrier.
    ///
    /// Comparison ignores case and treats `_` and `-` as spaces, so
    /// `MERCHANDISE_OR_SERVICE_NOT_RECEIVED` matches as well.
    pub fn requires_shipping_proof(&self) -> bool {
        let normalized = normalize_reason_code(&self.reason_code);
        SHIPPING_PROOF_REASONS.contains(&normalized.as_str())
    }
}

fn normalize_reason_code(code: &str) -> String {
    code.trim()
        .chars()
        .map(|c| match c {
            '_' | '-' => ' ',
            other => other.to_ascii_lowercase(),
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merchant and session identifiers supplied by the session handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub merchant_id: String,
    pub session_id: String,
}

impl SessionContext {
    pub fn new(merchant_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            session_id: session_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    fn case_with_reason(reason: &str) -> DisputeCase {
        DisputeCase {
            case_id: CaseId::new("case-1"),
            record_id: None,
            vendor: Vendor::Card,
            status: CaseStatus::RequestInfo,
            amount: Decimal::new(1999, 2),
            currency: "USD".into(),
            reason_code: reason.into(),
            description: String::new(),
            requests_raw: None,
        }
    }

    #[rstest]
    #[case("unauthorized", true)]
    #[case("Unauthorized", true)]
    #[case("merchandise or service not received", true)]
    #[case("MERCHANDISE_OR_SERVICE_NOT_RECEIVED", true)]
    #[case("  merchandise-or-service  not received ", true)]
    #[case("duplicate", false)]
    #[case("", false)]
    fn test_requires_shipping_proof(#[case] reason: &str, #[case] expected: bool) {
        assert_eq!(case_with_reason(reason).requires_shipping_proof(), expected);
    }

    #[test]
    fn test_vendor_evidence_kind() {
        assert_eq!(Vendor::Card.evidence_kind(), EvidenceKind::Generic);
        assert_eq!(Vendor::Paze.evidence_kind(), EvidenceKind::Generic);
        assert_eq!(Vendor::Afterpay.evidence_kind(), EvidenceKind::Afterpay);
        assert_eq!(Vendor::Klarna.evidence_kind(), EvidenceKind::Klarna);
    }

    #[test]
    fn test_vendor_parses_case_insensitively() {
        assert_eq!(Vendor::from_str("KLARNA").unwrap(), Vendor::Klarna);
        assert_eq!(Vendor::from_str("afterpay").unwrap(), Vendor::Afterpay);
        assert!(Vendor::from_str("paypal").is_err());
    }

    #[test]
    fn test_case_status_serialization() {
        let json = serde_json::to_string(&CaseStatus::LostWaitingForRefund).unwrap();
        assert_eq!(json, "\"lost_waiting_for_refund\"");
        assert_eq!(CaseStatus::UnderReview.to_string(), "under_review");
    }

    #[test]
    fn test_dispute_case_deserialization() {
        let json = r#"{
            "caseId": "C-100",
            "recordId": "R-7",
            "vendor": "klarna",
            "status": "request_info",
            "amount": "42.50",
            "currency": "EUR",
            "reasonCode": "goods_not_received",
            "requestsRaw": [{"request_id": 1, "requested_fields": ["tracking_id"]}]
        }"#;

        let case: DisputeCase = serde_json::from_str(json).expect("deserialization should succeed");
        assert_eq!(case.case_id.as_str(), "C-100");
        assert_eq!(case.record_id, Some(RecordId::new("R-7")));
        assert_eq!(case.vendor, Vendor::Klarna);
        assert_eq!(case.amount, Decimal::new(4250, 2));
        assert!(case.requests_raw.is_some());
        assert!(case.description.is_empty());
    }
}
