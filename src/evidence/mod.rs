// Evidence state for the open case and the rules that gate submission.
pub mod store;
pub mod validation;

pub use store::{AfterpayField, EvidenceStore, FieldEdit, GenericField};
pub use validation::{
    validate_afterpay, validate_for_case, validate_generic, validate_klarna, validate_package,
    DEFAULT_NOTE_MAX_CHARS,
};
