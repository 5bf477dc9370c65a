//! Workflow Execution Engine
//!
//! The entry point used by the application shell. It owns the settings and
//! the launcher chosen for this host, and exposes the four orchestrator
//! operations:
//!
//! - launching (or relaunching) a workflow instance
//! - listing the profiles an instance can run with
//! - reporting engine availability
//! - running a remediation action

use log::{info, warn};

use super::launcher::{launch, launcher_for, Launcher};
use crate::environment::{self, EnvironmentKey, EnvironmentStatus};
use crate::error::{LaunchError, ProvisioningError};
use crate::settings::Settings;
use crate::workflow::instance::{ParameterSet, RunOptions, WorkflowInstance};
use crate::workflow::profiles;

/// Orchestrates engine runs for workflow instances.
///
/// # Example
///
/// ```rust,no_run
/// use glacier::execution::Engine;
/// use glacier::settings::Settings;
/// use glacier::workflow::instance::{RunOptions, WorkflowInstance};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let settings = Settings::load("/home/me/.glacier/settings.yaml")?;
///     let engine = Engine::new(settings);
///
///     let text = std::fs::read_to_string("/home/me/GLACIER/rnaseq/run-1/instance.json")?;
///     let instance: WorkflowInstance = serde_json::from_str(&text)?;
///
///     let pid = engine.run_workflow(&instance, Default::default(), &RunOptions::default())?;
///     println!("started pid {}", pid);
///     Ok(())
/// }
/// ```
pub struct Engine {
    settings: Settings,
    launcher: Box<dyn Launcher>,
}

impl Engine {
    /// Creates an engine, selecting the launcher for the configured host.
    pub fn new(settings: Settings) -> Self {
        let launcher = launcher_for(&settings);
        info!("Using {} launcher ({} host)", launcher.name(), settings.host());
        Self { settings, launcher }
    }

    /// Replaces the launcher, e.g. with a test double.
    pub fn with_launcher(mut self, launcher: Box<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Launches the engine for `instance` and returns its pid.
    ///
    /// Launches of the same instance must not overlap; no lock is taken here.
    pub fn run_workflow(
        &self,
        instance: &WorkflowInstance,
        params: ParameterSet,
        opts: &RunOptions,
    ) -> Result<u32, LaunchError> {
        info!(
            "Running workflow instance '{}' ({}) with profile '{}'",
            instance.name, instance.id, opts.profile
        );
        launch(self.launcher.as_ref(), instance, params, opts).map_err(|e| {
            warn!("Launch of '{}' failed: {}", instance.name, e);
            e
        })
    }

    /// Profiles declared by the instance's workflow, always including `standard`.
    pub fn available_profiles(&self, instance: &WorkflowInstance) -> Vec<String> {
        profiles::available_profiles(instance)
    }

    pub fn environment_status(&self, key: EnvironmentKey) -> EnvironmentStatus {
        environment::environment_status(&self.settings, key)
    }

    /// Runs a remediation action. Callers re-probe afterwards.
    pub fn perform_environment_action(
        &self,
        key: EnvironmentKey,
        action_id: &str,
    ) -> Result<(), ProvisioningError> {
        info!("Performing environment action '{}' for {}", action_id, key);
        environment::perform_environment_action(&self.settings, key, action_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::launcher::{DirectLauncher, LaunchPlan, LogFiles};
    use crate::execution::paths::PathTranslator;
    use crate::execution::runtime::RuntimeLocator;
    use crate::settings::HostKind;
    use crate::workflow::instance::{WorkflowStatus, WorkflowVersion};
    use std::fs;
    use std::path::Path;
    use std::process::Command;
    use tempfile::{tempdir, TempDir};

    fn direct_settings(temp_dir: &TempDir) -> Settings {
        let mut settings = Settings::for_home(temp_dir.path());
        settings.host = Some(HostKind::Direct);
        settings
    }

    fn instance_in(root: &Path, workflow_dir: &Path) -> WorkflowInstance {
        WorkflowInstance {
            id: "inst-1".to_string(),
            name: "run-1".to_string(),
            path: root.join("run-1"),
            workflow_version: WorkflowVersion {
                name: "rnaseq".to_string(),
                version: "3.14.0".to_string(),
                path: Some(workflow_dir.to_path_buf()),
            },
            status: WorkflowStatus::Created,
        }
    }

    /// Runs `true` in place of the engine, ignoring the plan's arguments.
    struct NoopLauncher {
        translator: PathTranslator,
    }

    impl Launcher for NoopLauncher {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn translator(&self) -> &PathTranslator {
            &self.translator
        }

        fn command(&self, plan: &LaunchPlan, logs: LogFiles) -> Result<Command, LaunchError> {
            let mut cmd = Command::new("true");
            cmd.current_dir(&plan.cwd).stdout(logs.stdout).stderr(logs.stderr);
            Ok(cmd)
        }
    }

    #[test]
    fn test_engine_available_profiles() {
        let temp_dir = tempdir().unwrap();
        let workflow_dir = temp_dir.path().join("rnaseq");
        fs::create_dir_all(&workflow_dir).unwrap();
        fs::write(
            workflow_dir.join("nextflow.config"),
            "profiles {\n  docker { docker.enabled = true }\n  test {}\n}\n",
        )
        .unwrap();

        let engine = Engine::new(direct_settings(&temp_dir));
        let instance = instance_in(temp_dir.path(), &workflow_dir);

        assert_eq!(
            engine.available_profiles(&instance),
            vec!["docker", "standard", "test"]
        );
    }

    #[test]
    fn test_engine_unknown_action() {
        let temp_dir = tempdir().unwrap();
        let engine = Engine::new(direct_settings(&temp_dir));

        let result = engine.perform_environment_action(EnvironmentKey::Nextflow, "install.cobol");
        assert!(matches!(result, Err(ProvisioningError::UnknownAction(_))));
    }

    #[test]
    fn test_engine_missing_runtime_fails_launch() {
        let temp_dir = tempdir().unwrap();
        let mut settings = direct_settings(&temp_dir);
        settings.engine_command = "glacier-test-no-such-engine".to_string();
        let engine = Engine::new(settings);
        let instance = instance_in(temp_dir.path(), temp_dir.path());

        let result = engine.run_workflow(&instance, ParameterSet::new(), &RunOptions::default());
        assert!(matches!(result, Err(LaunchError::SpawnFailed { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_run_with_custom_launcher() {
        let temp_dir = tempdir().unwrap();
        let engine = Engine::new(direct_settings(&temp_dir)).with_launcher(Box::new(NoopLauncher {
            translator: PathTranslator::Native,
        }));
        let instance = instance_in(temp_dir.path(), temp_dir.path());

        let pid = engine
            .run_workflow(&instance, ParameterSet::new(), &RunOptions::default())
            .unwrap();

        assert!(pid > 0);
        assert!(instance.work_path().is_dir());
        assert_eq!(fs::read_to_string(instance.params_path()).unwrap(), "{}");
    }

    #[test]
    fn test_engine_direct_launcher_type() {
        let temp_dir = tempdir().unwrap();
        let settings = direct_settings(&temp_dir);
        let launcher = DirectLauncher::new(RuntimeLocator::new(&settings));
        let engine = Engine::new(settings).with_launcher(Box::new(launcher));
        assert_eq!(engine.launcher.name(), "direct");
        assert_eq!(engine.settings().host(), HostKind::Direct);
    }
}
