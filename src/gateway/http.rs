use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{
    AfterpayEvidenceFields, AfterpayUploadedFile, CaseDetail, CaseStatusUpdate, DisputeGateway,
    GatewayAck, GenericEvidenceFields, KlarnaEvidenceRequest, KlarnaUploadedFile, SUCCESS_CODE,
};
use crate::config::EngineConfig;
use crate::errors::{ServiceError, GENERIC_FAILURE_MESSAGE};
use crate::models::{CaseId, RecordId, SelectedFile, UploadedFile};

const FILE_FIELD: &str = "file";

/// `{code, msg, data}` wrapper around every backend response.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default = "Option::default")]
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, ServiceError> {
        if self.code != SUCCESS_CODE {
            return Err(ServiceError::gateway_rejected(
                self.msg.as_deref(),
                GENERIC_FAILURE_MESSAGE,
            ));
        }
        self.data.ok_or_else(|| {
            ServiceError::SerializationError("response envelope carried no data".to_string())
        })
    }
}

#[derive(Serialize)]
struct GenericEvidenceBody<'a> {
    files: &'a [UploadedFile],
    #[serde(flatten)]
    fields: &'a GenericEvidenceFields,
}

#[derive(Serialize)]
struct AfterpayEvidenceBody<'a> {
    evidence: &'a AfterpayEvidenceFields,
    session_id: &'a str,
}

/// `reqwest`-backed gateway talking to the dispute backend.
#[derive(Debug, Clone)]
pub struct HttpDisputeGateway {
    client: Client,
    base_url: Url,
}

impl HttpDisputeGateway {
    pub fn new(config: &EngineConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ServiceError::InternalError(format!("Failed to build HTTP client: {}", e)))?;
        Self::with_client(client, &config.gateway_base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, ServiceError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ServiceError::InvalidOperation(format!("Invalid gateway base URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::InvalidOperation(format!(
                "Gateway base URL '{}' cannot carry a path",
                base_url
            )));
        }
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::InternalError("gateway base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn file_form(files: &[SelectedFile]) -> Result<Form, ServiceError> {
        files.iter().try_fold(Form::new(), |form, file| {
            let part = Part::bytes(file.bytes.to_vec())
                .file_name(file.file_name.clone())
                .mime_str(&file.effective_content_type())?;
            Ok(form.part(FILE_FIELD, part))
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            warn!(%status, url = %response.url(), "dispute backend returned an HTTP error");
            return Err(ServiceError::ExternalServiceError(format!(
                "Dispute backend responded with HTTP {}",
                status
            )));
        }
        Ok(response.json::<Envelope<T>>().await?)
    }

    async fn post_ack<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<GatewayAck, ServiceError> {
        let response = self.client.post(url).json(body).send().await?;
        let envelope = Self::decode::<serde_json::Value>(response).await?;
        debug!(code = envelope.code, "acknowledgement received");
        Ok(GatewayAck {
            code: envelope.code,
            msg: envelope.msg,
        })
    }

    async fn post_files<T: DeserializeOwned>(&self, url: Url, files: &[SelectedFile]) -> Result<T, ServiceError> {
        let form = Self::file_form(files)?;
        let response = self.client.post(url).multipart(form).send().await?;
        Self::decode::<T>(response).await?.into_data()
    }
}

#[async_trait]
impl DisputeGateway for HttpDisputeGateway {
    #[instrument(skip(self, files), fields(file_count = files.len()))]
    async fn upload_generic_files(
        &self,
        record_id: &RecordId,
        files: &[SelectedFile],
    ) -> Result<Vec<UploadedFile>, ServiceError> {
        let url = self.endpoint(&["disputes", "records", record_id.as_str(), "files"])?;
        self.post_files(url, files).await
    }

    #[instrument(skip(self, file), fields(file_name = %file.file_name))]
    async fn upload_afterpay_file(
        &self,
        case_id: &CaseId,
        file: &SelectedFile,
    ) -> Result<AfterpayUploadedFile, ServiceError> {
        let url = self.endpoint(&["disputes", case_id.as_str(), "afterpay", "files"])?;
        self.post_files(url, std::slice::from_ref(file)).await
    }

    #[instrument(skip(self, files), fields(file_count = files.len()))]
    async fn upload_klarna_files(
        &self,
        case_id: &CaseId,
        files: &[SelectedFile],
    ) -> Result<Vec<KlarnaUploadedFile>, ServiceError> {
        let url = self.endpoint(&["disputes", case_id.as_str(), "klarna", "files"])?;
        self.post_files(url, files).await
    }

    #[instrument(skip(self, files, fields))]
    async fn submit_generic_evidence(
        &self,
        case_id: &CaseId,
        files: &[UploadedFile],
        fields: &GenericEvidenceFields,
    ) -> Result<GatewayAck, ServiceError> {
        let url = self.endpoint(&["disputes", case_id.as_str(), "evidence"])?;
        self.post_ack(url, &GenericEvidenceBody { files, fields }).await
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn update_case_status(
        &self,
        case_id: &CaseId,
        update: &CaseStatusUpdate,
    ) -> Result<GatewayAck, ServiceError> {
        let url = self.endpoint(&["disputes", case_id.as_str(), "status"])?;
        self.post_ack(url, update).await
    }

    #[instrument(skip(self, evidence, session_id))]
    async fn submit_afterpay_evidence(
        &self,
        case_id: &CaseId,
        evidence: &AfterpayEvidenceFields,
        session_id: &str,
    ) -> Result<GatewayAck, ServiceError> {
        let url = self.endpoint(&["disputes", case_id.as_str(), "afterpay", "evidence"])?;
        self.post_ack(url, &AfterpayEvidenceBody { evidence, session_id })
            .await
    }

    #[instrument(skip(self, request), fields(request_count = request.requests.len()))]
    async fn submit_klarna_evidence(
        &self,
        case_id: &CaseId,
        request: &KlarnaEvidenceRequest,
    ) -> Result<GatewayAck, ServiceError> {
        let url = self.endpoint(&["disputes", case_id.as_str(), "klarna", "evidence"])?;
        self.post_ack(url, request).await
    }

    #[instrument(skip(self))]
    async fn get_case_detail(&self, case_id: &CaseId) -> Result<CaseDetail, ServiceError> {
        let url = self.endpoint(&["disputes", case_id.as_str()])?;
        let response = self.client.get(url).send().await?;
        Self::decode::<CaseDetail>(response).await?.into_data()
    }
}
