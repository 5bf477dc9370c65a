//! Run Monitoring Module
//!
//! Read-side helpers for callers watching a launched engine.
//!
//! # Components
//!
//! - [`is_process_running`]: pid liveness polling
//! - [`locate_reports`]: HTML report discovery in an output tree

pub mod process;
pub mod reports;

pub use process::is_process_running;
pub use reports::{locate_reports, Report};
