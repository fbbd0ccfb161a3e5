//! Pre-submit rules, one per vendor shape. Each returns the first failing
//! rule as a single human-readable reason.

use crate::errors::ServiceError;
use crate::models::{
    AfterpayEvidence, DisputeCase, EvidencePackage, GenericEvidence, KlarnaEvidence,
    KlarnaRequestValues,
};
use crate::schema::{parse_requests, FieldType, KlarnaForm, RequestForm};

pub const DEFAULT_NOTE_MAX_CHARS: usize = 2000;

const SHIPMENTS_INCOMPLETE: &str = "Please complete all shipment details";

fn fail(message: impl Into<String>) -> Result<(), ServiceError> {
    Err(ServiceError::ValidationError(message.into()))
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Card and alternate-payment evidence.
pub fn validate_generic(
    case: &DisputeCase,
    evidence: &GenericEvidence,
    note_max_chars: usize,
) -> Result<(), ServiceError> {
    if is_blank(&evidence.refund_id) {
        return fail("Please provide Refund ID Or Reference ID");
    }
    if evidence.note.chars().count() > note_max_chars {
        return fail(format!("Note cannot exceed {} characters", note_max_chars));
    }
    if case.requires_shipping_proof() {
        if is_blank(&evidence.tracking_number) {
            return fail("Please provide Tracking Number");
        }
        if is_blank(&evidence.carrier_name) {
            return fail("Please provide Carrier Name");
        }
    }
    Ok(())
}

/// Afterpay has no pre-submit rules; its files are checked at upload time.
pub fn validate_afterpay(_evidence: &AfterpayEvidence) -> Result<(), ServiceError> {
    Ok(())
}

/// Klarna evidence against the parsed request form. An empty form passes.
pub fn validate_klarna(form: &KlarnaForm, evidence: &KlarnaEvidence) -> Result<(), ServiceError> {
    for (index, request_form) in form.requests.iter().enumerate() {
        validate_request(request_form, evidence.requests.get(index), evidence)?;
    }
    Ok(())
}

fn validate_request(
    request_form: &RequestForm,
    values: Option<&KlarnaRequestValues>,
    evidence: &KlarnaEvidence,
) -> Result<(), ServiceError> {
    for descriptor in &request_form.fields {
        if descriptor.field_type == FieldType::UploadFile {
            if evidence.attachments.is_empty() {
                return fail(format!("Please upload {}", descriptor.label));
            }
            continue;
        }

        let value = values.map(|v| v.value(&descriptor.key)).unwrap_or("");
        if is_blank(value) {
            return fail(format!("Please provide {}", descriptor.label));
        }
    }

    if request_form.shipment_block.is_some() {
        let complete = values
            .and_then(|v| v.shipments.as_ref())
            .map(|shipments| !shipments.is_empty() && shipments.iter().all(|s| s.is_complete()))
            .unwrap_or(false);
        if !complete {
            return fail(SHIPMENTS_INCOMPLETE);
        }
    }

    Ok(())
}

/// Dispatches to the rule set matching the case vendor. A package whose shape
/// does not match the vendor is a misuse, not a validation failure.
pub fn validate_package(
    case: &DisputeCase,
    package: &EvidencePackage,
    form: Option<&KlarnaForm>,
    note_max_chars: usize,
) -> Result<(), ServiceError> {
    let expected = case.vendor.evidence_kind();
    if package.kind() != expected {
        return Err(ServiceError::InvalidOperation(format!(
            "{} evidence cannot be validated for a {} case",
            package.kind(),
            case.vendor
        )));
    }

    match package {
        EvidencePackage::Generic(generic) => validate_generic(case, generic, note_max_chars),
        EvidencePackage::Afterpay(afterpay) => validate_afterpay(afterpay),
        EvidencePackage::Klarna(klarna) => match form {
            Some(form) => validate_klarna(form, klarna),
            None => validate_klarna(&KlarnaForm::default(), klarna),
        },
    }
}

/// Validates a package against a case on its own, parsing the case's Klarna
/// requirements when needed.
pub fn validate_for_case(
    case: &DisputeCase,
    package: &EvidencePackage,
    note_max_chars: usize,
) -> Result<(), ServiceError> {
    let form = match package {
        EvidencePackage::Klarna(_) => Some(parse_requests(case.requests_raw.as_ref()).seed_form()),
        _ => None,
    };
    validate_package(case, package, form.as_ref(), note_max_chars)
}
