/*!
 * # Workbench
 *
 * One task owns the open case: its editor, evidence store, upload buffers and
 * quiescence timers. Callers talk to it through a cloneable
 * [`WorkbenchHandle`]; every command is answered over a oneshot channel.
 *
 * Network calls run on spawned tasks and report back over an internal channel
 * tagged with the epoch of the case they were issued for. Reports for an epoch
 * that is no longer open are dropped.
 */

use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::editor::{Disposition, DisputeEditor, SubmissionOutcome, SubmissionPhase, SubmissionReport};
use super::flows::flow_for;
use crate::config::EngineConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, Notice};
use crate::evidence::{FieldEdit, DEFAULT_NOTE_MAX_CHARS};
use crate::gateway::DisputeGateway;
use crate::models::{
    CaseId, DisputeCase, EvidencePackage, SelectedFile, SessionContext, UploadTarget, UploadedFile,
};
use crate::schema::KlarnaForm;
use crate::upload::{execute_batch, UploadBatch, UploadCoordinator, UploadPolicy, UploadTicket};

const COMMAND_BUFFER: usize = 64;

const UPLOADS_PENDING: &str = "Please wait for file uploads to finish";

/// Tunables taken from [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct WorkbenchSettings {
    pub quiescence_window: Duration,
    pub upload_policy: UploadPolicy,
    pub note_max_chars: usize,
}

impl Default for WorkbenchSettings {
    fn default() -> Self {
        Self {
            quiescence_window: Duration::from_millis(100),
            upload_policy: UploadPolicy::default(),
            note_max_chars: DEFAULT_NOTE_MAX_CHARS,
        }
    }
}

impl WorkbenchSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            quiescence_window: config.quiescence_window(),
            upload_policy: UploadPolicy::from_config(config),
            note_max_chars: config.note_max_chars,
        }
    }
}

/// Read-only view of the workbench state.
#[derive(Debug, Clone)]
pub struct WorkbenchSnapshot {
    pub case_id: Option<CaseId>,
    pub phase: SubmissionPhase,
    pub package: Option<EvidencePackage>,
    pub form: Option<KlarnaForm>,
    pub evidence_recorded: bool,
    /// Buffered, not yet sent selections per target.
    pub pending_uploads: Vec<(UploadTarget, usize)>,
    pub uploads_in_flight: Vec<UploadTarget>,
}

type Reply<T> = oneshot::Sender<Result<T, ServiceError>>;

enum Command {
    Open {
        case: DisputeCase,
        session: SessionContext,
        reply: Reply<()>,
    },
    Close {
        reply: Reply<Option<CaseId>>,
    },
    Edit {
        edit: FieldEdit,
        reply: Reply<()>,
    },
    AddShipment {
        request_index: usize,
        reply: Reply<usize>,
    },
    RemoveShipment {
        request_index: usize,
        shipment_index: usize,
        reply: Reply<()>,
    },
    SelectFiles {
        target: UploadTarget,
        files: Vec<SelectedFile>,
        reply: Reply<()>,
    },
    Submit {
        reply: Reply<()>,
    },
    AcceptRefund {
        reply: Reply<()>,
    },
    Cancel {
        reply: Reply<()>,
    },
    Confirm {
        reply: Reply<SubmissionOutcome>,
    },
    Snapshot {
        reply: Reply<WorkbenchSnapshot>,
    },
}

enum Internal {
    QuiescenceElapsed {
        epoch: u64,
        target: UploadTarget,
        generation: u64,
    },
    UploadFinished {
        epoch: u64,
        target: UploadTarget,
        ticket: UploadTicket,
        result: Result<Vec<UploadedFile>, ServiceError>,
    },
    SubmissionFinished {
        report: SubmissionReport,
        reply: Reply<SubmissionOutcome>,
    },
}

fn shut_down() -> ServiceError {
    ServiceError::InternalError("workbench has shut down".to_string())
}

/// Cloneable client of a running workbench. The workbench stops once every
/// handle is dropped.
#[derive(Debug, Clone)]
pub struct WorkbenchHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Open { .. } => "Open",
            Command::Close { .. } => "Close",
            Command::Edit { .. } => "Edit",
            Command::AddShipment { .. } => "AddShipment",
            Command::RemoveShipment { .. } => "RemoveShipment",
            Command::SelectFiles { .. } => "SelectFiles",
            Command::Submit { .. } => "Submit",
            Command::AcceptRefund { .. } => "AcceptRefund",
            Command::Cancel { .. } => "Cancel",
            Command::Confirm { .. } => "Confirm",
            Command::Snapshot { .. } => "Snapshot",
        };
        f.write_str(name)
    }
}

impl WorkbenchHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(build(tx)).await.map_err(|_| shut_down())?;
        rx.await.map_err(|_| shut_down())?
    }

    /// Opens a case with fresh, empty evidence.
    pub async fn open(&self, case: DisputeCase, session: SessionContext) -> Result<(), ServiceError> {
        self.request(|reply| Command::Open {
            case,
            session,
            reply,
        })
        .await
    }

    /// Closes the editor, discarding evidence, buffers and timers.
    pub async fn close(&self) -> Result<Option<CaseId>, ServiceError> {
        self.request(|reply| Command::Close { reply }).await
    }

    pub async fn edit(&self, edit: FieldEdit) -> Result<(), ServiceError> {
        self.request(|reply| Command::Edit { edit, reply }).await
    }

    pub async fn add_shipment(&self, request_index: usize) -> Result<usize, ServiceError> {
        self.request(|reply| Command::AddShipment {
            request_index,
            reply,
        })
        .await
    }

    pub async fn remove_shipment(
        &self,
        request_index: usize,
        shipment_index: usize,
    ) -> Result<(), ServiceError> {
        self.request(|reply| Command::RemoveShipment {
            request_index,
            shipment_index,
            reply,
        })
        .await
    }

    /// Buffers a selection; the upload fires once the target has been quiet
    /// for the quiescence window.
    pub async fn select_files(
        &self,
        target: UploadTarget,
        files: Vec<SelectedFile>,
    ) -> Result<(), ServiceError> {
        self.request(|reply| Command::SelectFiles {
            target,
            files,
            reply,
        })
        .await
    }

    /// Validates and moves to confirmation.
    pub async fn submit(&self) -> Result<(), ServiceError> {
        self.request(|reply| Command::Submit { reply }).await
    }

    pub async fn accept_refund(&self) -> Result<(), ServiceError> {
        self.request(|reply| Command::AcceptRefund { reply }).await
    }

    pub async fn cancel(&self) -> Result<(), ServiceError> {
        self.request(|reply| Command::Cancel { reply }).await
    }

    /// Runs the confirmed submission and resolves once it has finished.
    pub async fn confirm(&self) -> Result<SubmissionOutcome, ServiceError> {
        self.request(|reply| Command::Confirm { reply }).await
    }

    pub async fn snapshot(&self) -> Result<WorkbenchSnapshot, ServiceError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }
}

/// Starts a workbench on the current runtime.
pub fn spawn_workbench(
    gateway: Arc<dyn DisputeGateway>,
    events: EventSender,
    settings: WorkbenchSettings,
) -> WorkbenchHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();

    let workbench = Workbench {
        gateway,
        events,
        settings,
        editor: DisputeEditor::new(),
        uploads: UploadCoordinator::new(),
        timers: HashMap::new(),
        internal_tx,
    };
    tokio::spawn(workbench.run(command_rx, internal_rx));

    WorkbenchHandle {
        commands: command_tx,
    }
}

struct Workbench {
    gateway: Arc<dyn DisputeGateway>,
    events: EventSender,
    settings: WorkbenchSettings,
    editor: DisputeEditor,
    uploads: UploadCoordinator,
    timers: HashMap<UploadTarget, JoinHandle<()>>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl Workbench {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        info!("workbench started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(message) = internal.recv() => self.handle_internal(message),
            }
        }
        self.abort_timers();
        info!("workbench stopped");
    }

    fn handle_command(&mut self, command: Command) {
        debug!(?command, phase = self.editor.phase().as_str(), "command received");
        match command {
            Command::Open {
                case,
                session,
                reply,
            } => {
                let flow = flow_for(&case, self.settings.note_max_chars);
                let _ = reply.send(self.editor.open(case, session, flow).map(|_| ()));
            }
            Command::Close { reply } => {
                let _ = reply.send(Ok(self.close()));
            }
            Command::Edit { edit, reply } => {
                let _ = reply.send(self.editor.apply_edit(edit));
            }
            Command::AddShipment {
                request_index,
                reply,
            } => {
                let _ = reply.send(self.editor.add_shipment(request_index));
            }
            Command::RemoveShipment {
                request_index,
                shipment_index,
                reply,
            } => {
                let _ = reply.send(self.editor.remove_shipment(request_index, shipment_index));
            }
            Command::SelectFiles {
                target,
                files,
                reply,
            } => {
                let _ = reply.send(self.select_files(target, files));
            }
            Command::Submit { reply } => {
                let _ = reply.send(self.request_submit());
            }
            Command::AcceptRefund { reply } => {
                let _ = reply.send(self.editor.request_accept_refund());
            }
            Command::Cancel { reply } => {
                let _ = reply.send(self.editor.cancel());
            }
            Command::Confirm { reply } => self.confirm(reply),
            Command::Snapshot { reply } => {
                let _ = reply.send(Ok(self.snapshot()));
            }
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::QuiescenceElapsed {
                epoch,
                target,
                generation,
            } => {
                if self.editor.epoch() != Some(epoch) {
                    debug!(epoch, %target, "timer fired for a closed case");
                    return;
                }
                if let Some(batch) = self.uploads.quiescence_elapsed(target, generation) {
                    self.dispatch(epoch, batch);
                }
            }
            Internal::UploadFinished {
                epoch,
                target,
                ticket,
                result,
            } => self.upload_finished(epoch, target, ticket, result),
            Internal::SubmissionFinished { report, reply } => {
                self.submission_finished(report, reply)
            }
        }
    }

    fn close(&mut self) -> Option<CaseId> {
        self.abort_timers();
        self.uploads.reset();
        self.editor.close()
    }

    fn abort_timers(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }

    fn select_files(
        &mut self,
        target: UploadTarget,
        files: Vec<SelectedFile>,
    ) -> Result<(), ServiceError> {
        self.editor.check_selection(target)?;
        let epoch = self
            .editor
            .epoch()
            .ok_or_else(|| ServiceError::NotFound("No case is open".to_string()))?;
        if files.is_empty() {
            return Ok(());
        }

        let generation = self.uploads.select(target, files);
        if let Some(previous) = self.timers.remove(&target) {
            previous.abort();
        }

        let tx = self.internal_tx.clone();
        let window = self.settings.quiescence_window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(Internal::QuiescenceElapsed {
                epoch,
                target,
                generation,
            });
        });
        self.timers.insert(target, timer);
        Ok(())
    }

    /// Evidence is only sent once every selection has been uploaded.
    fn ensure_uploads_settled(&self, phase: SubmissionPhase) -> Result<(), ServiceError> {
        if self.editor.phase() == phase && !self.uploads.is_idle() {
            return Err(ServiceError::ValidationError(UPLOADS_PENDING.to_string()));
        }
        Ok(())
    }

    fn request_submit(&mut self) -> Result<(), ServiceError> {
        let result = self
            .ensure_uploads_settled(SubmissionPhase::Editing)
            .and_then(|_| self.editor.request_submit());
        if let (Err(ServiceError::ValidationError(reason)), Some(case)) = (&result, self.editor.case()) {
            counter!("disputes.validation.rejected", 1, "vendor" => case.vendor.to_string());
            info!(case_id = %case.case_id, %reason, "submission blocked by validation");
        }
        result
    }

    fn confirm(&mut self, reply: Reply<SubmissionOutcome>) {
        if let Err(e) = self.ensure_uploads_settled(SubmissionPhase::Confirming) {
            let _ = reply.send(Err(e));
            return;
        }
        let job = match self.editor.confirm() {
            Ok(job) => job,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        info!(case_id = %job.case_id(), outcome = ?job.outcome, "submitting");

        let gateway = Arc::clone(&self.gateway);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let report = job.run(gateway).await;
            let _ = tx.send(Internal::SubmissionFinished { report, reply });
        });
    }

    fn dispatch(&mut self, epoch: u64, batch: UploadBatch) {
        let mut next = Some(batch);
        while let Some(batch) = next.take() {
            let Some(case) = self.editor.case().cloned() else {
                return;
            };

            if batch.dropped > 0 {
                self.notify(Notice::info(
                    case.case_id.clone(),
                    format!(
                        "Only the most recent file is kept for this slot; {} earlier selection(s) discarded",
                        batch.dropped
                    ),
                ));
            }

            if let Err(e) = self.settings.upload_policy.check(batch.target, &batch.files) {
                counter!("disputes.uploads.rejected", 1, "target" => batch.target.to_string());
                warn!(case_id = %case.case_id, target = %batch.target, error = %e, "upload rejected before dispatch");
                self.notify(Notice::error(case.case_id.clone(), e.user_message()));
                next = self.uploads.resolve(batch.target, batch.ticket);
                continue;
            }

            counter!("disputes.uploads.dispatched", 1, "target" => batch.target.to_string());
            info!(
                case_id = %case.case_id,
                target = %batch.target,
                ticket = %batch.ticket,
                files = batch.files.len(),
                "dispatching upload"
            );

            let gateway = Arc::clone(&self.gateway);
            let tx = self.internal_tx.clone();
            tokio::spawn(async move {
                let result = execute_batch(gateway.as_ref(), &case, &batch).await;
                let _ = tx.send(Internal::UploadFinished {
                    epoch,
                    target: batch.target,
                    ticket: batch.ticket,
                    result,
                });
            });
        }
    }

    fn upload_finished(
        &mut self,
        epoch: u64,
        target: UploadTarget,
        ticket: UploadTicket,
        result: Result<Vec<UploadedFile>, ServiceError>,
    ) {
        let case_id = match self.editor.case() {
            Some(case) if self.editor.epoch() == Some(epoch) => case.case_id.clone(),
            _ => {
                debug!(epoch, %target, %ticket, "dropping stale upload response");
                return;
            }
        };
        let next = self.uploads.resolve(target, ticket);

        match result {
            Ok(files) => {
                let count = files.len();
                match self.editor.apply_upload(epoch, target, files) {
                    Ok(true) => {
                        info!(%case_id, %target, count, "upload stored");
                        self.events.send_or_log(Event::FilesUploaded {
                            case_id: case_id.clone(),
                            target,
                            count,
                        });
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!(%case_id, %target, error = %e, "failed to store upload response");
                        self.notify(Notice::error(case_id.clone(), e.user_message()));
                    }
                }
            }
            Err(e) => {
                counter!("disputes.uploads.failed", 1, "target" => target.to_string());
                warn!(%case_id, %target, error = %e, "upload failed");
                self.notify(Notice::error(case_id.clone(), e.user_message()));
            }
        }

        if let Some(batch) = next {
            self.dispatch(epoch, batch);
        }
    }

    fn submission_finished(&mut self, report: SubmissionReport, reply: Reply<SubmissionOutcome>) {
        let disposition = self.editor.finish(&report);
        let SubmissionReport {
            case_id,
            vendor,
            outcome,
            result,
            ..
        } = report;

        match result {
            Ok(()) => {
                counter!("disputes.submissions.succeeded", 1, "vendor" => vendor.to_string());
                if disposition == Disposition::Completed {
                    self.abort_timers();
                    self.uploads.reset();
                }
                info!(%case_id, ?outcome, ?disposition, "submission succeeded");

                let message = match outcome {
                    SubmissionOutcome::EvidenceSubmitted => "Evidence submitted successfully",
                    SubmissionOutcome::RefundAccepted => "Refund accepted successfully",
                };
                self.notify(Notice::success(case_id.clone(), message));
                if outcome == SubmissionOutcome::RefundAccepted {
                    self.events.send_or_log(Event::RefundAccepted {
                        case_id: case_id.clone(),
                    });
                }
                self.events.send_or_log(Event::EvidenceSubmitted { case_id });
                let _ = reply.send(Ok(outcome));
            }
            Err(e) => {
                counter!("disputes.submissions.failed", 1, "vendor" => vendor.to_string());
                warn!(%case_id, ?outcome, error = %e, "submission failed");
                self.notify(Notice::error(case_id, e.user_message()));
                let _ = reply.send(Err(e));
            }
        }
    }

    fn notify(&self, notice: Notice) {
        self.events.send_or_log(Event::Notice(notice));
    }

    fn snapshot(&self) -> WorkbenchSnapshot {
        let mut uploads_in_flight = self.uploads.busy_targets();
        uploads_in_flight.sort_by_key(|t| t.to_string());

        WorkbenchSnapshot {
            case_id: self.editor.case().map(|c| c.case_id.clone()),
            phase: self.editor.phase(),
            package: self.editor.package().cloned(),
            form: self.editor.form().cloned(),
            evidence_recorded: self.editor.progress().evidence_recorded,
            pending_uploads: UploadTarget::iter()
                .map(|target| (target, self.uploads.pending_len(target)))
                .filter(|(_, count)| *count > 0)
                .collect(),
            uploads_in_flight,
        }
    }
}
