use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::flows::{accept_refund, SubmissionContext, SubmissionProgress, VendorFlow};
use crate::errors::ServiceError;
use crate::evidence::{EvidenceStore, FieldEdit};
use crate::gateway::DisputeGateway;
use crate::models::{
    CaseId, DisputeCase, EvidenceKind, EvidencePackage, SessionContext, UploadTarget, UploadedFile,
    Vendor,
};
use crate::schema::{parse_requests, KlarnaForm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPhase {
    Closed,
    Editing,
    Confirming,
    AcceptingRefund,
    Submitting,
}

impl SubmissionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionPhase::Closed => "closed",
            SubmissionPhase::Editing => "editing",
            SubmissionPhase::Confirming => "confirming",
            SubmissionPhase::AcceptingRefund => "accepting_refund",
            SubmissionPhase::Submitting => "submitting",
        }
    }
}

/// Which terminal branch a submission takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOutcome {
    EvidenceSubmitted,
    RefundAccepted,
}

/// Everything a submission needs, detached from the editor so it can run on
/// its own task.
pub struct SubmissionJob {
    pub epoch: u64,
    pub outcome: SubmissionOutcome,
    pub context: SubmissionContext,
    pub package: EvidencePackage,
    pub progress: SubmissionProgress,
    flow: Arc<dyn VendorFlow>,
}

impl std::fmt::Debug for SubmissionJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionJob")
            .field("epoch", &self.epoch)
            .field("outcome", &self.outcome)
            .field("context", &self.context)
            .field("package", &self.package)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl SubmissionJob {
    pub fn case_id(&self) -> &CaseId {
        &self.context.case.case_id
    }

    pub async fn run(mut self, gateway: Arc<dyn DisputeGateway>) -> SubmissionReport {
        let result = match self.outcome {
            SubmissionOutcome::EvidenceSubmitted => {
                self.flow
                    .submit(
                        gateway.as_ref(),
                        &self.context,
                        &self.package,
                        &mut self.progress,
                    )
                    .await
            }
            SubmissionOutcome::RefundAccepted => accept_refund(gateway.as_ref(), &self.context).await,
        };

        SubmissionReport {
            epoch: self.epoch,
            case_id: self.context.case.case_id,
            vendor: self.context.case.vendor,
            outcome: self.outcome,
            progress: self.progress,
            result,
        }
    }
}

/// Result of a finished [`SubmissionJob`].
#[derive(Debug)]
pub struct SubmissionReport {
    pub epoch: u64,
    pub case_id: CaseId,
    pub vendor: Vendor,
    pub outcome: SubmissionOutcome,
    pub progress: SubmissionProgress,
    pub result: Result<(), ServiceError>,
}

/// How the editor absorbed a submission report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Success; the editor closed.
    Completed,
    /// Failure; back to editing with data preserved.
    Reverted,
    /// The case the report belongs to is no longer open.
    Detached,
}

struct OpenCase {
    epoch: u64,
    case: DisputeCase,
    session: SessionContext,
    store: EvidenceStore,
    flow: Arc<dyn VendorFlow>,
    progress: SubmissionProgress,
    phase: SubmissionPhase,
}

/// Phase machine for the one case being edited.
///
/// `Closed -> Editing -> Confirming -> Submitting -> Closed`, or
/// `Editing -> AcceptingRefund -> Submitting -> Closed`. A failed submission
/// returns to `Editing`.
#[derive(Default)]
pub struct DisputeEditor {
    open: Option<OpenCase>,
    last_epoch: u64,
}

impl DisputeEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.open
            .as_ref()
            .map(|o| o.phase)
            .unwrap_or(SubmissionPhase::Closed)
    }

    /// Epoch of the open case. Every open gets a fresh one.
    pub fn epoch(&self) -> Option<u64> {
        self.open.as_ref().map(|o| o.epoch)
    }

    pub fn case(&self) -> Option<&DisputeCase> {
        self.open.as_ref().map(|o| &o.case)
    }

    pub fn package(&self) -> Option<&EvidencePackage> {
        self.open.as_ref().map(|o| o.store.package())
    }

    pub fn form(&self) -> Option<&KlarnaForm> {
        self.open.as_ref().and_then(|o| o.store.form())
    }

    pub fn progress(&self) -> SubmissionProgress {
        self.open.as_ref().map(|o| o.progress).unwrap_or_default()
    }

    /// Opens a case with empty evidence. Only allowed while closed.
    #[instrument(skip(self, case, session, flow), fields(case_id = %case.case_id, vendor = %case.vendor))]
    pub fn open(
        &mut self,
        case: DisputeCase,
        session: SessionContext,
        flow: Arc<dyn VendorFlow>,
    ) -> Result<u64, ServiceError> {
        if let Some(open) = &self.open {
            return Err(ServiceError::InvalidStatus(format!(
                "Case {} is already open",
                open.case.case_id
            )));
        }
        if flow.kind() != case.vendor.evidence_kind() {
            return Err(ServiceError::InvalidOperation(format!(
                "{} flow cannot serve a {} case",
                flow.kind(),
                case.vendor
            )));
        }

        let schema = match case.vendor.evidence_kind() {
            EvidenceKind::Klarna => Some(parse_requests(case.requests_raw.as_ref())),
            _ => None,
        };
        let store = EvidenceStore::open(&case, schema.as_ref());

        self.last_epoch += 1;
        let epoch = self.last_epoch;
        self.open = Some(OpenCase {
            epoch,
            case,
            session,
            store,
            flow,
            progress: SubmissionProgress::default(),
            phase: SubmissionPhase::Editing,
        });
        info!(epoch, "case opened for editing");
        Ok(epoch)
    }

    /// Discards the open case and all its evidence. Returns the case that was
    /// open, if any.
    pub fn close(&mut self) -> Option<CaseId> {
        let open = self.open.take()?;
        info!(case_id = %open.case.case_id, phase = open.phase.as_str(), "case closed");
        Some(open.case.case_id)
    }

    pub fn apply_edit(&mut self, edit: FieldEdit) -> Result<(), ServiceError> {
        self.editing_mut()?.store.apply(edit)
    }

    pub fn add_shipment(&mut self, request_index: usize) -> Result<usize, ServiceError> {
        self.editing_mut()?.store.add_shipment(request_index)
    }

    pub fn remove_shipment(
        &mut self,
        request_index: usize,
        shipment_index: usize,
    ) -> Result<(), ServiceError> {
        self.editing_mut()?
            .store
            .remove_shipment(request_index, shipment_index)
    }

    /// Checks that files may be selected for `target` right now.
    pub fn check_selection(&self, target: UploadTarget) -> Result<(), ServiceError> {
        let open = self.open_ref()?;
        if open.phase != SubmissionPhase::Editing {
            return Err(invalid_phase("select files", open.phase));
        }
        let kind = open.case.vendor.evidence_kind();
        if target.evidence_kind() != kind {
            return Err(ServiceError::InvalidOperation(format!(
                "{} does not accept {} uploads",
                open.case.vendor, target
            )));
        }
        Ok(())
    }

    /// Writes an upload response into the store if `epoch` is still open.
    /// Returns false for stale responses.
    pub fn apply_upload(
        &mut self,
        epoch: u64,
        target: UploadTarget,
        files: Vec<UploadedFile>,
    ) -> Result<bool, ServiceError> {
        match self.open.as_mut() {
            Some(open) if open.epoch == epoch => {
                open.store.apply_upload(target, files)?;
                Ok(true)
            }
            _ => {
                debug!(epoch, %target, "dropping upload result for a case that is no longer open");
                Ok(false)
            }
        }
    }

    /// `Editing -> Confirming`, gated by the vendor rules.
    pub fn request_submit(&mut self) -> Result<(), ServiceError> {
        let open = self.editing_mut()?;
        open.flow.validate(&open.case, &open.store)?;
        open.phase = SubmissionPhase::Confirming;
        Ok(())
    }

    /// `Editing -> AcceptingRefund`. Never validates.
    pub fn request_accept_refund(&mut self) -> Result<(), ServiceError> {
        let open = self.editing_mut()?;
        open.phase = SubmissionPhase::AcceptingRefund;
        Ok(())
    }

    /// `Confirming | AcceptingRefund -> Editing`.
    pub fn cancel(&mut self) -> Result<(), ServiceError> {
        let open = self.open_mut()?;
        match open.phase {
            SubmissionPhase::Confirming | SubmissionPhase::AcceptingRefund => {
                open.phase = SubmissionPhase::Editing;
                Ok(())
            }
            phase => Err(invalid_phase("cancel", phase)),
        }
    }

    /// `Confirming | AcceptingRefund -> Submitting`. Returns the job to run.
    pub fn confirm(&mut self) -> Result<SubmissionJob, ServiceError> {
        let open = self.open_mut()?;
        let outcome = match open.phase {
            SubmissionPhase::Confirming => SubmissionOutcome::EvidenceSubmitted,
            SubmissionPhase::AcceptingRefund => SubmissionOutcome::RefundAccepted,
            phase => return Err(invalid_phase("confirm", phase)),
        };
        open.phase = SubmissionPhase::Submitting;

        Ok(SubmissionJob {
            epoch: open.epoch,
            outcome,
            context: SubmissionContext {
                case: open.case.clone(),
                session: open.session.clone(),
            },
            package: open.store.package().clone(),
            progress: open.progress,
            flow: Arc::clone(&open.flow),
        })
    }

    /// Applies a finished submission.
    pub fn finish(&mut self, report: &SubmissionReport) -> Disposition {
        let open = match self.open.as_mut() {
            Some(open) if open.epoch == report.epoch && open.phase == SubmissionPhase::Submitting => {
                open
            }
            _ => {
                debug!(case_id = %report.case_id, epoch = report.epoch, "submission finished after its case was closed");
                return Disposition::Detached;
            }
        };

        open.progress = report.progress;
        open.phase = SubmissionPhase::Editing;
        if report.result.is_err() {
            return Disposition::Reverted;
        }

        self.close();
        Disposition::Completed
    }

    fn open_ref(&self) -> Result<&OpenCase, ServiceError> {
        self.open
            .as_ref()
            .ok_or_else(|| ServiceError::NotFound("No case is open".to_string()))
    }

    fn open_mut(&mut self) -> Result<&mut OpenCase, ServiceError> {
        self.open
            .as_mut()
            .ok_or_else(|| ServiceError::NotFound("No case is open".to_string()))
    }

    fn editing_mut(&mut self) -> Result<&mut OpenCase, ServiceError> {
        let open = self.open_mut()?;
        if open.phase != SubmissionPhase::Editing {
            return Err(invalid_phase("edit evidence", open.phase));
        }
        Ok(open)
    }
}

fn invalid_phase(action: &str, phase: SubmissionPhase) -> ServiceError {
    ServiceError::InvalidStatus(format!("Cannot {} while {}", action, phase.as_str()))
}
