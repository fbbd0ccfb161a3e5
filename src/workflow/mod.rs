// Submission workflow: vendor flows, the editor phase machine and the
// workbench task that drives them.
pub mod editor;
pub mod flows;
pub mod workbench;

pub use editor::{
    Disposition, DisputeEditor, SubmissionJob, SubmissionOutcome, SubmissionPhase,
    SubmissionReport,
};
pub use flows::{
    accept_refund, flow_for, AfterpayFlow, GenericFlow, KlarnaFlow, SubmissionContext,
    SubmissionProgress, VendorFlow, ACCEPT_REFUND_NOTE,
};
pub use workbench::{spawn_workbench, WorkbenchHandle, WorkbenchSettings, WorkbenchSnapshot};
