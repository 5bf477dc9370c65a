//! Workflow Instance Module
//!
//! Data structures for workflow instances and the configuration scanning
//! that lists their execution profiles.
//!
//! # Structure
//!
//! - [`instance`]: Instance records, run options and the on-disk layout
//! - [`profiles`]: Profile discovery from `nextflow.config`

pub mod instance;
pub mod profiles;

pub use instance::{
    LogKind, ParameterSet, RunOptions, WorkflowInstance, WorkflowStatus, WorkflowVersion,
};
pub use profiles::{available_profiles, discover_profiles};
