/*!
 * # Dispute Gateway
 *
 * The backend operations the engine consumes. The engine only ever talks to
 * the [`DisputeGateway`] trait; [`http::HttpDisputeGateway`] is the shipped
 * `reqwest` adapter.
 *
 * Every submission-style call is acknowledged with a `{code, msg}` envelope
 * where `code == 200` is the only success.
 */

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{ServiceError, GENERIC_FAILURE_MESSAGE};
use crate::models::{CaseId, RecordId, RequestId, SelectedFile, UploadedFile};

pub use http::HttpDisputeGateway;

pub const SUCCESS_CODE: i64 = 200;

/// Submission acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAck {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
}

impl GatewayAck {
    pub fn ok() -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
        }
    }

    pub fn rejected(code: i64, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: Some(msg.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Turns a non-success acknowledgement into a `GatewayRejected` error
    /// carrying the gateway message or the generic fallback.
    pub fn into_result(self) -> Result<(), ServiceError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(ServiceError::gateway_rejected(
                self.msg.as_deref(),
                GENERIC_FAILURE_MESSAGE,
            ))
        }
    }
}

/// Afterpay upload response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterpayUploadedFile {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub url_expires_at: Option<DateTime<Utc>>,
}

impl From<AfterpayUploadedFile> for UploadedFile {
    fn from(file: AfterpayUploadedFile) -> Self {
        UploadedFile {
            file_id: file.id,
            file_name: file.filename,
            static_url: file.url,
        }
    }
}

/// Klarna upload response entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlarnaUploadedFile {
    pub file_id: String,
    pub file_name: String,
}

impl From<KlarnaUploadedFile> for UploadedFile {
    fn from(file: KlarnaUploadedFile) -> Self {
        UploadedFile::new(file.file_id, file.file_name)
    }
}

/// Text part of a generic evidence submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericEvidenceFields {
    pub carrier_name: String,
    pub tracking_number: String,
    pub refund_id: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStatusUpdate {
    pub note: String,
    /// Serialized evidence, `"{}"` when none applies.
    pub evidence_json: String,
    pub status: String,
    pub merchant_id: String,
    pub session_id: String,
}

/// Afterpay's evidence body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterpayEvidenceFields {
    pub product_description: String,
    pub shipping_address: String,
    pub shipping_carrier: String,
    pub shipping_date: String,
    pub shipping_tracking_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_documentation: Option<String>,
    pub refund_policy_disclosure: String,
    pub refund_refusal_explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncategorized_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlarnaAttachment {
    pub file_id: String,
    pub file_name: String,
}

impl From<&UploadedFile> for KlarnaAttachment {
    fn from(file: &UploadedFile) -> Self {
        Self {
            file_id: file.file_id.clone(),
            file_name: file.file_name.clone(),
        }
    }
}

/// One Klarna request's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlarnaRequestPayload {
    pub request_id: RequestId,
    pub requested_fields: BTreeMap<String, serde_json::Value>,
    pub attachments: Vec<KlarnaAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlarnaEvidenceRequest {
    pub requests: Vec<KlarnaRequestPayload>,
    pub status: String,
    pub merchant_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseNote {
    #[serde(default)]
    pub author: Option<String>,
    pub note: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Detail view of a case; only the notes are consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDetail {
    #[serde(default)]
    pub notes: Vec<CaseNote>,
}

/// Backend operations consumed by the engine.
#[async_trait]
pub trait DisputeGateway: Send + Sync {
    async fn upload_generic_files(
        &self,
        record_id: &RecordId,
        files: &[SelectedFile],
    ) -> Result<Vec<UploadedFile>, ServiceError>;

    async fn upload_afterpay_file(
        &self,
        case_id: &CaseId,
        file: &SelectedFile,
    ) -> Result<AfterpayUploadedFile, ServiceError>;

    async fn upload_klarna_files(
        &self,
        case_id: &CaseId,
        files: &[SelectedFile],
    ) -> Result<Vec<KlarnaUploadedFile>, ServiceError>;

    async fn submit_generic_evidence(
        &self,
        case_id: &CaseId,
        files: &[UploadedFile],
        fields: &GenericEvidenceFields,
    ) -> Result<GatewayAck, ServiceError>;

    async fn update_case_status(
        &self,
        case_id: &CaseId,
        update: &CaseStatusUpdate,
    ) -> Result<GatewayAck, ServiceError>;

    async fn submit_afterpay_evidence(
        &self,
        case_id: &CaseId,
        evidence: &AfterpayEvidenceFields,
        session_id: &str,
    ) -> Result<GatewayAck, ServiceError>;

    async fn submit_klarna_evidence(
        &self,
        case_id: &CaseId,
        request: &KlarnaEvidenceRequest,
    ) -> Result<GatewayAck, ServiceError>;

    async fn get_case_detail(&self, case_id: &CaseId) -> Result<CaseDetail, ServiceError>;
}

#[cfg(test)]
pub(crate) mod mocks {
    use super::*;
    use mockall::mock;

    mock! {
        pub Gateway {}

        #[async_trait]
        impl DisputeGateway for Gateway {
            async fn upload_generic_files(
                &self,
                record_id: &RecordId,
                files: &[SelectedFile],
            ) -> Result<Vec<UploadedFile>, ServiceError>;

            async fn upload_afterpay_file(
                &self,
                case_id: &CaseId,
                file: &SelectedFile,
            ) -> Result<AfterpayUploadedFile, ServiceError>;

            async fn upload_klarna_files(
                &self,
                case_id: &CaseId,
                files: &[SelectedFile],
            ) -> Result<Vec<KlarnaUploadedFile>, ServiceError>;

            async fn submit_generic_evidence(
                &self,
                case_id: &CaseId,
                files: &[UploadedFile],
                fields: &GenericEvidenceFields,
            ) -> Result<GatewayAck, ServiceError>;

            async fn update_case_status(
                &self,
                case_id: &CaseId,
                update: &CaseStatusUpdate,
            ) -> Result<GatewayAck, ServiceError>;

            async fn submit_afterpay_evidence(
                &self,
                case_id: &CaseId,
                evidence: &AfterpayEvidenceFields,
                session_id: &str,
            ) -> Result<GatewayAck, ServiceError>;

            async fn submit_klarna_evidence(
                &self,
                case_id: &CaseId,
                request: &KlarnaEvidenceRequest,
            ) -> Result<GatewayAck, ServiceError>;

            async fn get_case_detail(&self, case_id: &CaseId) -> Result<CaseDetail, ServiceError>;
        }
    }
}
