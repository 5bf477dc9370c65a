//! Workflow Execution Module
//!
//! Turns a workflow instance into a running engine process, on this host or
//! through the WSL bridge.
//!
//! # Architecture
//!
//! - [`paths`]: Host to runtime path translation
//! - [`runtime`]: Locating the engine executable
//! - [`launcher`]: Preparing the instance and spawning the engine
//! - [`engine`]: Facade used by the application shell

pub mod engine;
pub mod launcher;
pub mod paths;
pub mod runtime;

pub use engine::Engine;
pub use launcher::{launch, launcher_for, BridgedLauncher, DirectLauncher, Launcher};
pub use paths::PathTranslator;
pub use runtime::{RuntimeHandle, RuntimeLocator};
