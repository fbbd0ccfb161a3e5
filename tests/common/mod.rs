#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use stateset_disputes::{
    errors::ServiceError,
    events::{self, Event, NoticeLevel},
    gateway::{
        AfterpayEvidenceFields, AfterpayUploadedFile, CaseDetail, CaseStatusUpdate,
        DisputeGateway, GatewayAck, GenericEvidenceFields, KlarnaEvidenceRequest,
        KlarnaUploadedFile,
    },
    models::{
        CaseId, CaseStatus, DisputeCase, RecordId, SelectedFile, SessionContext, UploadTarget,
        UploadedFile, Vendor,
    },
    workflow::{spawn_workbench, WorkbenchHandle, WorkbenchSettings},
};
use tokio::sync::mpsc;

/// Gateway operations the fake can be scripted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Upload,
    SubmitGeneric,
    UpdateStatus,
    SubmitAfterpay,
    SubmitKlarna,
}

/// One recorded gateway call. Recorded when the call starts.
#[derive(Debug, Clone)]
pub enum GatewayCall {
    UploadGeneric {
        record_id: String,
        file_names: Vec<String>,
    },
    UploadAfterpay {
        case_id: String,
        file_name: String,
    },
    UploadKlarna {
        case_id: String,
        file_names: Vec<String>,
    },
    SubmitGeneric {
        case_id: String,
        file_ids: Vec<String>,
        fields: GenericEvidenceFields,
    },
    UpdateStatus {
        case_id: String,
        update: CaseStatusUpdate,
    },
    SubmitAfterpay {
        case_id: String,
        evidence: AfterpayEvidenceFields,
        session_id: String,
    },
    SubmitKlarna {
        case_id: String,
        request: KlarnaEvidenceRequest,
    },
    CaseDetail {
        case_id: String,
    },
}

impl GatewayCall {
    pub fn is_upload(&self) -> bool {
        matches!(
            self,
            GatewayCall::UploadGeneric { .. }
                | GatewayCall::UploadAfterpay { .. }
                | GatewayCall::UploadKlarna { .. }
        )
    }
}

enum Scripted {
    Ack(GatewayAck),
    Fail(ServiceError),
}

/// In-memory gateway that records every call, answers with fresh file ids and
/// can be told to delay or fail specific operations.
#[derive(Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    delays: Mutex<HashMap<Op, Duration>>,
    scripts: Mutex<HashMap<Op, VecDeque<Scripted>>>,
    next_file: AtomicU64,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_delay(&self, op: Op, delay: Duration) {
        self.delays.lock().unwrap().insert(op, delay);
    }

    /// Queues an acknowledgement for the next call of `op`.
    pub fn script_ack(&self, op: Op, ack: GatewayAck) {
        self.push_script(op, Scripted::Ack(ack));
    }

    /// Queues a transport failure for the next call of `op`.
    pub fn script_failure(&self, op: Op, error: ServiceError) {
        self.push_script(op, Scripted::Fail(error));
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn upload_calls(&self) -> Vec<GatewayCall> {
        self.calls().into_iter().filter(|c| c.is_upload()).collect()
    }

    fn push_script(&self, op: Op, scripted: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(scripted);
    }

    fn next_script(&self, op: Op) -> Option<Scripted> {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
    }

    async fn begin(&self, op: Op, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
        let delay = self.delays.lock().unwrap().get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn ack(&self, op: Op, call: GatewayCall) -> Result<GatewayAck, ServiceError> {
        self.begin(op, call).await;
        match self.next_script(op) {
            Some(Scripted::Ack(ack)) => Ok(ack),
            Some(Scripted::Fail(error)) => Err(error),
            None => Ok(GatewayAck::ok()),
        }
    }

    async fn upload(&self, call: GatewayCall) -> Result<(), ServiceError> {
        self.begin(Op::Upload, call).await;
        match self.next_script(Op::Upload) {
            Some(Scripted::Fail(error)) => Err(error),
            _ => Ok(()),
        }
    }

    fn file_id(&self) -> String {
        format!("file-{}", self.next_file.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn names(files: &[SelectedFile]) -> Vec<String> {
    files.iter().map(|f| f.file_name.clone()).collect()
}

#[async_trait]
impl DisputeGateway for RecordingGateway {
    async fn upload_generic_files(
        &self,
        record_id: &RecordId,
        files: &[SelectedFile],
    ) -> Result<Vec<UploadedFile>, ServiceError> {
        self.upload(GatewayCall::UploadGeneric {
            record_id: record_id.to_string(),
            file_names: names(files),
        })
        .await?;
        Ok(files
            .iter()
            .map(|f| UploadedFile::new(self.file_id(), f.file_name.clone()))
            .collect())
    }

    async fn upload_afterpay_file(
        &self,
        case_id: &CaseId,
        file: &SelectedFile,
    ) -> Result<AfterpayUploadedFile, ServiceError> {
        self.upload(GatewayCall::UploadAfterpay {
            case_id: case_id.to_string(),
            file_name: file.file_name.clone(),
        })
        .await?;
        Ok(AfterpayUploadedFile {
            id: self.file_id(),
            filename: file.file_name.clone(),
            url: None,
            url_expires_at: None,
        })
    }

    async fn upload_klarna_files(
        &self,
        case_id: &CaseId,
        files: &[SelectedFile],
    ) -> Result<Vec<KlarnaUploadedFile>, ServiceError> {
        self.upload(GatewayCall::UploadKlarna {
            case_id: case_id.to_string(),
            file_names: names(files),
        })
        .await?;
        Ok(files
            .iter()
            .map(|f| KlarnaUploadedFile {
                file_id: self.file_id(),
                file_name: f.file_name.clone(),
            })
            .collect())
    }

    async fn submit_generic_evidence(
        &self,
        case_id: &CaseId,
        files: &[UploadedFile],
        fields: &GenericEvidenceFields,
    ) -> Result<GatewayAck, ServiceError> {
        self.ack(
            Op::SubmitGeneric,
            GatewayCall::SubmitGeneric {
                case_id: case_id.to_string(),
                file_ids: files.iter().map(|f| f.file_id.clone()).collect(),
                fields: fields.clone(),
            },
        )
        .await
    }

    async fn update_case_status(
        &self,
        case_id: &CaseId,
        update: &CaseStatusUpdate,
    ) -> Result<GatewayAck, ServiceError> {
        self.ack(
            Op::UpdateStatus,
            GatewayCall::UpdateStatus {
                case_id: case_id.to_string(),
                update: update.clone(),
            },
        )
        .await
    }

    async fn submit_afterpay_evidence(
        &self,
        case_id: &CaseId,
        evidence: &AfterpayEvidenceFields,
        session_id: &str,
    ) -> Result<GatewayAck, ServiceError> {
        self.ack(
            Op::SubmitAfterpay,
            GatewayCall::SubmitAfterpay {
                case_id: case_id.to_string(),
                evidence: evidence.clone(),
                session_id: session_id.to_string(),
            },
        )
        .await
    }

    async fn submit_klarna_evidence(
        &self,
        case_id: &CaseId,
        request: &KlarnaEvidenceRequest,
    ) -> Result<GatewayAck, ServiceError> {
        self.ack(
            Op::SubmitKlarna,
            GatewayCall::SubmitKlarna {
                case_id: case_id.to_string(),
                request: request.clone(),
            },
        )
        .await
    }

    async fn get_case_detail(&self, case_id: &CaseId) -> Result<CaseDetail, ServiceError> {
        self.calls.lock().unwrap().push(GatewayCall::CaseDetail {
            case_id: case_id.to_string(),
        });
        Ok(CaseDetail::default())
    }
}

/// A running workbench wired to a recording gateway and an event receiver.
pub struct TestBench {
    pub workbench: WorkbenchHandle,
    pub gateway: Arc<RecordingGateway>,
    events: mpsc::Receiver<Event>,
}

impl TestBench {
    pub fn new() -> Self {
        Self::with_gateway(RecordingGateway::new())
    }

    pub fn with_gateway(gateway: Arc<RecordingGateway>) -> Self {
        Self::build(gateway, 256)
    }

    /// A bench whose event channel holds at most `capacity` undelivered events.
    pub fn with_event_capacity(capacity: usize) -> Self {
        Self::build(RecordingGateway::new(), capacity)
    }

    fn build(gateway: Arc<RecordingGateway>, capacity: usize) -> Self {
        let (sender, events) = events::channel(capacity);
        let workbench = spawn_workbench(
            gateway.clone() as Arc<dyn DisputeGateway>,
            sender,
            WorkbenchSettings {
                quiescence_window: Duration::from_millis(100),
                ..WorkbenchSettings::default()
            },
        );
        Self {
            workbench,
            gateway,
            events,
        }
    }

    /// Everything emitted so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

pub fn notices(events: &[Event], level: NoticeLevel) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Notice(notice) if notice.level == level => Some(notice.message.clone()),
            _ => None,
        })
        .collect()
}

pub fn refresh_signals(events: &[Event]) -> usize {
    events.iter().filter(|e| e.is_refresh_signal()).count()
}

/// Lets quiescence timers and scripted delays run out on the paused clock.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub fn session() -> SessionContext {
    SessionContext::new("M-100", "S-200")
}

pub fn case(case_id: &str, vendor: Vendor) -> DisputeCase {
    DisputeCase {
        case_id: CaseId::new(case_id),
        record_id: Some(RecordId::new(format!("rec-{}", case_id))),
        vendor,
        status: CaseStatus::RequestInfo,
        amount: Decimal::new(4999, 2),
        currency: "USD".to_string(),
        reason_code: String::new(),
        description: String::new(),
        requests_raw: None,
    }
}

pub fn card_case(case_id: &str, reason_code: &str) -> DisputeCase {
    DisputeCase {
        reason_code: reason_code.to_string(),
        ..case(case_id, Vendor::Card)
    }
}

pub fn klarna_case(case_id: &str, requests_raw: Value) -> DisputeCase {
    DisputeCase {
        record_id: None,
        requests_raw: Some(requests_raw),
        ..case(case_id, Vendor::Klarna)
    }
}

pub fn pdf(name: &str) -> SelectedFile {
    SelectedFile::new(name, "application/pdf", vec![0u8; 1024])
}

pub fn docx(name: &str) -> SelectedFile {
    SelectedFile::new(
        name,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        vec![1u8; 10],
    )
}

pub fn target_pending(pending: &[(UploadTarget, usize)], target: UploadTarget) -> usize {
    pending
        .iter()
        .find(|(t, _)| *t == target)
        .map(|(_, n)| *n)
        .unwrap_or(0)
}
