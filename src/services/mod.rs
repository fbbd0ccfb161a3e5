// Core services
pub mod disputes;

pub use disputes::DisputeService;
