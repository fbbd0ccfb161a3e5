//! StateSet Disputes Library
//!
//! Evidence submission engine for payment disputes: vendor requirement
//! parsing, evidence state, debounced uploads and the submission workflow.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod errors;
pub mod events;
pub mod evidence;
pub mod gateway;
pub mod models;
pub mod schema;
pub mod services;
pub mod upload;
pub mod workflow;

pub use errors::ServiceError;
pub use services::DisputeService;
pub use workflow::{WorkbenchHandle, WorkbenchSnapshot};
