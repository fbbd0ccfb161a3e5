use tracing::instrument;

use super::UploadBatch;
use crate::errors::ServiceError;
use crate::gateway::DisputeGateway;
use crate::models::{DisputeCase, UploadTarget, UploadedFile};

/// Sends one drained batch through the gateway operation that serves its
/// target and maps the response to [`UploadedFile`]s.
#[instrument(skip(gateway, case, batch), fields(case_id = %case.case_id, target = %batch.target, ticket = %batch.ticket))]
pub async fn execute_batch(
    gateway: &dyn DisputeGateway,
    case: &DisputeCase,
    batch: &UploadBatch,
) -> Result<Vec<UploadedFile>, ServiceError> {
    match batch.target {
        UploadTarget::GenericFiles => {
            let record_id = case.record_id.as_ref().ok_or_else(|| {
                ServiceError::InvalidOperation(format!(
                    "Case {} has no record id for file uploads",
                    case.case_id
                ))
            })?;
            gateway.upload_generic_files(record_id, &batch.files).await
        }
        UploadTarget::AfterpayShippingDocument | UploadTarget::AfterpayRefundPolicy => {
            let file = batch.files.last().ok_or_else(|| {
                ServiceError::InternalError("empty upload batch".to_string())
            })?;
            let uploaded = gateway.upload_afterpay_file(&case.case_id, file).await?;
            Ok(vec![uploaded.into()])
        }
        UploadTarget::KlarnaFiles => {
            let uploaded = gateway.upload_klarna_files(&case.case_id, &batch.files).await?;
            Ok(uploaded.into_iter().map(UploadedFile::from).collect())
        }
    }
}
