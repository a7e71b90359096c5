//! Server middleware
//!
//! Provides request logging and source-address admission.

pub mod admission;
pub mod logging;

pub use admission::{AdmissionPolicy, admission_gate};
pub use logging::log_requests;
