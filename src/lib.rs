//! GLACIER - Nextflow Instance Execution Orchestrator
//!
//! Runs versioned Nextflow workflows as tracked instances. Each instance owns
//! a directory holding its parameters, logs and engine work tree; this crate
//! prepares that directory and launches the engine against it, either natively
//! or inside a WSL distribution on Windows.
//!
//! # Architecture
//!
//! The library is organized into six modules:
//!
//! - [`workflow`]: Instance records and profile discovery
//! - [`execution`]: Path translation, runtime location and launching
//! - [`environment`]: Engine availability probing and installation
//! - [`monitoring`]: Process liveness and report discovery
//! - [`settings`]: YAML settings and host detection
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use glacier::execution::Engine;
//! use glacier::environment::EnvironmentKey;
//! use glacier::settings::Settings;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(Settings::for_home("/home/me"));
//!
//!     // Check the engine can run before launching anything
//!     let status = engine.environment_status(EnvironmentKey::Nextflow);
//!     for action in status.actions() {
//!         println!("available fix: {}", action.label);
//!     }
//!     Ok(())
//! }
//! ```

pub mod environment;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod settings;
pub mod workflow;

// Re-export commonly used types
pub use environment::{EnvironmentKey, EnvironmentStatus};
pub use error::{LaunchError, ProvisioningError, SettingsError};
pub use execution::engine::Engine;
pub use settings::Settings;
pub use workflow::instance::{RunOptions, WorkflowInstance};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "GLACIER";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name_matches_collections_dir() {
        assert_eq!(APP_NAME, settings::COLLECTIONS_DIR_NAME);
    }

    #[test]
    fn test_module_exports_run_options() {
        let opts = RunOptions::default();
        assert_eq!(opts.profile, "standard");
        assert!(!opts.resume);
    }
}
