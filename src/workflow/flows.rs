use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::errors::ServiceError;
use crate::evidence::{validate_afterpay, validate_generic, validate_klarna, EvidenceStore};
use crate::gateway::{
    AfterpayEvidenceFields, CaseStatusUpdate, DisputeGateway, GenericEvidenceFields,
    KlarnaAttachment, KlarnaEvidenceRequest, KlarnaRequestPayload,
};
use crate::models::{
    AfterpayEvidence, CaseStatus, DisputeCase, EvidenceKind, EvidencePackage, GenericEvidence,
    KlarnaEvidence, SessionContext,
};
use crate::schema::{catalog::LIST_OF_SHIPMENTS_KEY, KlarnaForm};

/// Fixed note sent when the merchant accepts the refund.
pub const ACCEPT_REFUND_NOTE: &str = "merchant accept refund";

/// What a submission needs to know about the case it belongs to.
#[derive(Debug, Clone)]
pub struct SubmissionContext {
    pub case: DisputeCase,
    pub session: SessionContext,
}

/// Steps of a multi-call submission that already went through. Survives a
/// failed attempt so a retry resumes where the last one stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmissionProgress {
    pub evidence_recorded: bool,
}

/// Validation and submission for one evidence shape.
#[async_trait]
pub trait VendorFlow: Send + Sync {
    fn kind(&self) -> EvidenceKind;

    fn validate(&self, case: &DisputeCase, store: &EvidenceStore) -> Result<(), ServiceError>;

    async fn submit(
        &self,
        gateway: &dyn DisputeGateway,
        context: &SubmissionContext,
        package: &EvidencePackage,
        progress: &mut SubmissionProgress,
    ) -> Result<(), ServiceError>;
}

/// Picks the flow for a vendor. Called once when a case is opened.
pub fn flow_for(case: &DisputeCase, note_max_chars: usize) -> Arc<dyn VendorFlow> {
    match case.vendor.evidence_kind() {
        EvidenceKind::Generic => Arc::new(GenericFlow { note_max_chars }),
        EvidenceKind::Afterpay => Arc::new(AfterpayFlow),
        EvidenceKind::Klarna => Arc::new(KlarnaFlow),
    }
}

fn shape_mismatch(expected: EvidenceKind, package: &EvidencePackage) -> ServiceError {
    ServiceError::InvalidOperation(format!(
        "expected {} evidence, found {}",
        expected,
        package.kind()
    ))
}

// ===== Generic =====

pub struct GenericFlow {
    pub note_max_chars: usize,
}

pub fn generic_evidence_fields(evidence: &GenericEvidence) -> GenericEvidenceFields {
    GenericEvidenceFields {
        carrier_name: evidence.carrier_name.clone(),
        tracking_number: evidence.tracking_number.clone(),
        refund_id: evidence.refund_id.clone(),
        note: evidence.note.clone(),
    }
}

pub fn generic_status_update(
    context: &SubmissionContext,
    evidence: &GenericEvidence,
) -> Result<CaseStatusUpdate, ServiceError> {
    Ok(CaseStatusUpdate {
        note: evidence.note.clone(),
        evidence_json: serde_json::to_string(evidence)?,
        status: CaseStatus::UnderReview.to_string(),
        merchant_id: context.session.merchant_id.clone(),
        session_id: context.session.session_id.clone(),
    })
}

#[async_trait]
impl VendorFlow for GenericFlow {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Generic
    }

    fn validate(&self, case: &DisputeCase, store: &EvidenceStore) -> Result<(), ServiceError> {
        match store.package() {
            EvidencePackage::Generic(evidence) => {
                validate_generic(case, evidence, self.note_max_chars)
            }
            other => Err(shape_mismatch(self.kind(), other)),
        }
    }

    #[instrument(skip_all, fields(case_id = %context.case.case_id))]
    async fn submit(
        &self,
        gateway: &dyn DisputeGateway,
        context: &SubmissionContext,
        package: &EvidencePackage,
        progress: &mut SubmissionProgress,
    ) -> Result<(), ServiceError> {
        let evidence = match package {
            EvidencePackage::Generic(evidence) => evidence,
            other => return Err(shape_mismatch(self.kind(), other)),
        };
        let case_id = &context.case.case_id;

        if progress.evidence_recorded {
            info!("evidence already recorded; retrying status update only");
        } else {
            gateway
                .submit_generic_evidence(case_id, &evidence.files, &generic_evidence_fields(evidence))
                .await?
                .into_result()?;
            progress.evidence_recorded = true;
        }

        let update = generic_status_update(context, evidence)?;
        gateway
            .update_case_status(case_id, &update)
            .await?
            .into_result()
    }
}

// ===== Afterpay =====

pub struct AfterpayFlow;

pub fn afterpay_evidence_fields(evidence: &AfterpayEvidence) -> AfterpayEvidenceFields {
    AfterpayEvidenceFields {
        product_description: evidence.product_description.clone(),
        shipping_address: evidence.shipping_address.clone(),
        shipping_carrier: evidence.shipping_carrier.clone(),
        shipping_date: evidence.shipping_date.clone(),
        shipping_tracking_number: evidence.shipping_tracking_number.clone(),
        shipping_documentation: evidence.shipping_document.as_ref().map(|f| f.file_id.clone()),
        refund_policy_disclosure: evidence.refund_policy_disclosure.clone(),
        refund_refusal_explanation: evidence.refund_refusal_explanation.clone(),
        refund_policy: evidence.refund_policy.as_ref().map(|f| f.file_id.clone()),
        uncategorized_file: evidence.first_uploaded_file().map(|f| f.file_id.clone()),
    }
}

#[async_trait]
impl VendorFlow for AfterpayFlow {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Afterpay
    }

    fn validate(&self, _case: &DisputeCase, store: &EvidenceStore) -> Result<(), ServiceError> {
        match store.package() {
            EvidencePackage::Afterpay(evidence) => validate_afterpay(evidence),
            other => Err(shape_mismatch(self.kind(), other)),
        }
    }

    #[instrument(skip_all, fields(case_id = %context.case.case_id))]
    async fn submit(
        &self,
        gateway: &dyn DisputeGateway,
        context: &SubmissionContext,
        package: &EvidencePackage,
        _progress: &mut SubmissionProgress,
    ) -> Result<(), ServiceError> {
        let evidence = match package {
            EvidencePackage::Afterpay(evidence) => evidence,
            other => return Err(shape_mismatch(self.kind(), other)),
        };

        gateway
            .submit_afterpay_evidence(
                &context.case.case_id,
                &afterpay_evidence_fields(evidence),
                &context.session.session_id,
            )
            .await?
            .into_result()
    }
}

// ===== Klarna =====

pub struct KlarnaFlow;

/// Rebuilds the per-request answers: blank values are dropped and shipments
/// are only sent when at least one of them carries a value. Every request
/// gets the full attachment list.
pub fn klarna_evidence_request(
    context: &SubmissionContext,
    evidence: &KlarnaEvidence,
) -> KlarnaEvidenceRequest {
    let attachments: Vec<KlarnaAttachment> =
        evidence.attachments.iter().map(KlarnaAttachment::from).collect();

    let requests = evidence
        .requests
        .iter()
        .map(|request| {
            let mut requested_fields: BTreeMap<String, Value> = request
                .fields
                .iter()
                .filter(|(_, value)| !value.trim().is_empty())
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect();

            if let Some(shipments) = &request.shipments {
                let filled: Vec<Value> = shipments
                    .iter()
                    .filter(|s| s.has_any_value())
                    .map(|s| {
                        Value::Object(
                            s.non_empty_entries()
                                .into_iter()
                                .map(|(k, v)| (k, Value::String(v)))
                                .collect(),
                        )
                    })
                    .collect();
                if !filled.is_empty() {
                    requested_fields.insert(LIST_OF_SHIPMENTS_KEY.to_string(), Value::Array(filled));
                }
            }

            KlarnaRequestPayload {
                request_id: request.request_id.clone(),
                requested_fields,
                attachments: attachments.clone(),
            }
        })
        .collect();

    KlarnaEvidenceRequest {
        requests,
        status: CaseStatus::UnderReview.to_string(),
        merchant_id: context.session.merchant_id.clone(),
        session_id: context.session.session_id.clone(),
    }
}

#[async_trait]
impl VendorFlow for KlarnaFlow {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Klarna
    }

    fn validate(&self, _case: &DisputeCase, store: &EvidenceStore) -> Result<(), ServiceError> {
        match store.package() {
            EvidencePackage::Klarna(evidence) => match store.form() {
                Some(form) => validate_klarna(form, evidence),
                None => validate_klarna(&KlarnaForm::default(), evidence),
            },
            other => Err(shape_mismatch(self.kind(), other)),
        }
    }

    #[instrument(skip_all, fields(case_id = %context.case.case_id))]
    async fn submit(
        &self,
        gateway: &dyn DisputeGateway,
        context: &SubmissionContext,
        package: &EvidencePackage,
        _progress: &mut SubmissionProgress,
    ) -> Result<(), ServiceError> {
        let evidence = match package {
            EvidencePackage::Klarna(evidence) => evidence,
            other => return Err(shape_mismatch(self.kind(), other)),
        };

        gateway
            .submit_klarna_evidence(
                &context.case.case_id,
                &klarna_evidence_request(context, evidence),
            )
            .await?
            .into_result()
    }
}

// ===== Accept refund =====

pub fn accept_refund_update(context: &SubmissionContext) -> CaseStatusUpdate {
    CaseStatusUpdate {
        note: ACCEPT_REFUND_NOTE.to_string(),
        evidence_json: "{}".to_string(),
        status: CaseStatus::LostWaitingForRefund.to_string(),
        merchant_id: context.session.merchant_id.clone(),
        session_id: context.session.session_id.clone(),
    }
}

/// Concedes the dispute. Skips evidence validation for every vendor.
#[instrument(skip_all, fields(case_id = %context.case.case_id))]
pub async fn accept_refund(
    gateway: &dyn DisputeGateway,
    context: &SubmissionContext,
) -> Result<(), ServiceError> {
    gateway
        .update_case_status(&context.case.case_id, &accept_refund_update(context))
        .await?
        .into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mocks::MockGateway;
    use crate::gateway::GatewayAck;
    use crate::models::{CaseId, ShipmentKey, ShipmentValues, UploadedFile, Vendor};
    use crate::schema::parse_requests;
    use assert_matches::assert_matches;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn context(vendor: Vendor) -> SubmissionContext {
        SubmissionContext {
            case: DisputeCase {
                case_id: CaseId::new("C-9"),
                record_id: None,
                vendor,
                status: CaseStatus::RequestInfo,
                amount: Decimal::new(2500, 2),
                currency: "USD".into(),
                reason_code: String::new(),
                description: String::new(),
                requests_raw: None,
            },
            session: SessionContext::new("M-1", "S-1"),
        }
    }

    fn generic_package() -> EvidencePackage {
        EvidencePackage::Generic(GenericEvidence {
            refund_id: "RF-1".into(),
            note: "refunded".into(),
            files: vec![UploadedFile::new("f-1", "receipt.pdf")],
            ..GenericEvidence::default()
        })
    }

    // ===== Payload builders =====

    #[test]
    fn test_generic_status_update_payload() {
        let ctx = context(Vendor::Card);
        let evidence = GenericEvidence {
            refund_id: "RF-1".into(),
            note: "refund issued".into(),
            ..GenericEvidence::default()
        };
        let update = generic_status_update(&ctx, &evidence).unwrap();
        assert_eq!(update.status, "under_review");
        assert_eq!(update.note, "refund issued");
        assert_eq!(update.merchant_id, "M-1");
        let round: GenericEvidence = serde_json::from_str(&update.evidence_json).unwrap();
        assert_eq!(round, evidence);
    }

    #[test]
    fn test_afterpay_uncategorized_file_prefers_shipping_document() {
        let mut evidence = AfterpayEvidence {
            refund_policy: Some(UploadedFile::new("rp", "policy.pdf")),
            ..AfterpayEvidence::default()
        };
        assert_eq!(
            afterpay_evidence_fields(&evidence).uncategorized_file.as_deref(),
            Some("rp")
        );

        evidence.shipping_document = Some(UploadedFile::new("sd", "label.pdf"));
        let fields = afterpay_evidence_fields(&evidence);
        assert_eq!(fields.uncategorized_file.as_deref(), Some("sd"));
        assert_eq!(fields.shipping_documentation.as_deref(), Some("sd"));
        assert_eq!(fields.refund_policy.as_deref(), Some("rp"));
    }

    #[test]
    fn test_klarna_payload_drops_blanks_and_shares_attachments() {
        let schema = parse_requests(Some(&json!([
            {"request_id": 1, "requested_fields": ["refund_date", "merchant_comment", "list_of_shipments"]},
            {"request_id": "r-2", "requested_fields": ["invoice"]}
        ])));
        let mut evidence = schema.seed_evidence();
        evidence.requests[0]
            .fields
            .insert("refund_date".into(), "2024-03-01".into());
        evidence.attachments = vec![UploadedFile::new("k-1", "invoice.pdf")];

        let request = klarna_evidence_request(&context(Vendor::Klarna), &evidence);
        assert_eq!(request.status, "under_review");
        assert_eq!(request.requests.len(), 2);

        let first = &request.requests[0];
        assert_eq!(first.requested_fields.len(), 1);
        assert_eq!(first.requested_fields["refund_date"], json!("2024-03-01"));
        assert!(!first.requested_fields.contains_key(LIST_OF_SHIPMENTS_KEY));
        assert_eq!(first.attachments, request.requests[1].attachments);
        assert_eq!(first.attachments[0].file_id, "k-1");
    }

    #[test]
    fn test_klarna_payload_keeps_shipments_with_values() {
        let schema = parse_requests(Some(&json!([
            {"request_id": 1, "requested_fields": ["list_of_shipments"]}
        ])));
        let mut evidence = schema.seed_evidence();
        let shipments = evidence.requests[0].shipments.as_mut().unwrap();
        shipments[0].set(ShipmentKey::TrackingId, "1Z".into());
        shipments.push(ShipmentValues::default());

        let request = klarna_evidence_request(&context(Vendor::Klarna), &evidence);
        assert_eq!(
            request.requests[0].requested_fields[LIST_OF_SHIPMENTS_KEY],
            json!([{"tracking_id": "1Z"}])
        );
    }

    #[test]
    fn test_accept_refund_update_is_fixed() {
        let update = accept_refund_update(&context(Vendor::Afterpay));
        assert_eq!(update.note, ACCEPT_REFUND_NOTE);
        assert_eq!(update.status, "lost_waiting_for_refund");
        assert_eq!(update.evidence_json, "{}");
        assert_eq!(update.session_id, "S-1");
    }

    // ===== Submission =====

    #[tokio::test]
    async fn test_generic_submit_runs_both_steps_in_order() {
        let mut gateway = MockGateway::new();
        let mut seq = mockall::Sequence::new();
        gateway
            .expect_submit_generic_evidence()
            .withf(|case_id, files, fields| {
                case_id.as_str() == "C-9" && files.len() == 1 && fields.refund_id == "RF-1"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(GatewayAck::ok()));
        gateway
            .expect_update_case_status()
            .withf(|_, update| update.status == "under_review")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(GatewayAck::ok()));

        let mut progress = SubmissionProgress::default();
        GenericFlow { note_max_chars: 2000 }
            .submit(&gateway, &context(Vendor::Card), &generic_package(), &mut progress)
            .await
            .unwrap();
        assert!(progress.evidence_recorded);
    }

    #[tokio::test]
    async fn test_generic_submit_stops_after_failed_evidence_call() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_submit_generic_evidence()
            .times(1)
            .returning(|_, _, _| Ok(GatewayAck::rejected(500, "Evidence store unavailable")));
        gateway.expect_update_case_status().never();

        let mut progress = SubmissionProgress::default();
        let result = GenericFlow { note_max_chars: 2000 }
            .submit(&gateway, &context(Vendor::Card), &generic_package(), &mut progress)
            .await;
        assert_matches!(result, Err(ServiceError::GatewayRejected(m)) if m == "Evidence store unavailable");
        assert!(!progress.evidence_recorded);
    }

    #[tokio::test]
    async fn test_generic_retry_skips_recorded_evidence() {
        let mut gateway = MockGateway::new();
        gateway.expect_submit_generic_evidence().never();
        gateway
            .expect_update_case_status()
            .times(1)
            .returning(|_, _| Ok(GatewayAck::ok()));

        let mut progress = SubmissionProgress {
            evidence_recorded: true,
        };
        GenericFlow { note_max_chars: 2000 }
            .submit(&gateway, &context(Vendor::Paze), &generic_package(), &mut progress)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_afterpay_submit_forwards_session() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_submit_afterpay_evidence()
            .withf(|_, fields, session_id| session_id == "S-1" && fields.uncategorized_file.is_none())
            .times(1)
            .returning(|_, _, _| Ok(GatewayAck::ok()));

        AfterpayFlow
            .submit(
                &gateway,
                &context(Vendor::Afterpay),
                &EvidencePackage::Afterpay(AfterpayEvidence::default()),
                &mut SubmissionProgress::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_submit_with_wrong_shape_is_rejected() {
        let gateway = MockGateway::new();
        let result = KlarnaFlow
            .submit(
                &gateway,
                &context(Vendor::Klarna),
                &generic_package(),
                &mut SubmissionProgress::default(),
            )
            .await;
        assert_matches!(result, Err(ServiceError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_accept_refund_surfaces_gateway_message() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_update_case_status()
            .withf(|_, update| update.note == ACCEPT_REFUND_NOTE)
            .returning(|_, _| Ok(GatewayAck::rejected(409, "Case already resolved")));

        let result = accept_refund(&gateway, &context(Vendor::Klarna)).await;
        assert_matches!(result, Err(ServiceError::GatewayRejected(m)) if m == "Case already resolved");
    }

    #[test]
    fn test_flow_for_dispatches_by_vendor() {
        assert_eq!(flow_for(&context(Vendor::Card).case, 2000).kind(), EvidenceKind::Generic);
        assert_eq!(flow_for(&context(Vendor::Paze).case, 2000).kind(), EvidenceKind::Generic);
        assert_eq!(flow_for(&context(Vendor::Afterpay).case, 2000).kind(), EvidenceKind::Afterpay);
        assert_eq!(flow_for(&context(Vendor::Klarna).case, 2000).kind(), EvidenceKind::Klarna);
    }
}
