// Core models
pub mod dispute_case;
pub mod evidence;
pub mod files;

pub use dispute_case::{
    CaseId, CaseStatus, DisputeCase, EvidenceKind, RecordId, SessionContext, Vendor,
};
pub use evidence::{
    AfterpayEvidence, EvidencePackage, GenericEvidence, KlarnaEvidence, KlarnaRequestValues,
    RequestId, ShipmentKey, ShipmentValues,
};
pub use files::{Arity, SelectedFile, UploadTarget, UploadedFile};
