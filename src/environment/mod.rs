//! Environment Management Module
//!
//! Reports whether the execution engine can run on this host and performs
//! the actions that fix it (installing a managed engine, setting up WSL).
//!
//! Status is returned as data, never as an error, so callers can route the
//! user to the listed remediation actions. After an action completes the
//! caller probes again; actions do not update any cached status.

pub mod nextflow;
pub mod wsl;

use serde::{Deserialize, Serialize};

use crate::error::ProvisioningError;
use crate::settings::Settings;

pub use nextflow::{ArtifactFetcher, HttpFetcher, NextflowEnvironment, RuntimeState};

/// Runtime dependencies whose status can be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKey {
    Nextflow,
}

impl EnvironmentKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nextflow => "nextflow",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "nextflow" => Ok(Self::Nextflow),
            other => Err(format!("unknown environment key '{}'; expected: nextflow", other)),
        }
    }
}

impl std::fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How urgent a status entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A remediation entry point offered with a status entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentAction {
    pub action_id: String,
    pub label: String,
}

impl EnvironmentAction {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            label: label.into(),
        }
    }
}

/// One readiness record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub actions: Vec<EnvironmentAction>,
}

impl StatusEntry {
    pub fn new(title: &str, description: &str, severity: Severity) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            severity,
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action_id: &str, label: &str) -> Self {
        self.actions.push(EnvironmentAction::new(action_id, label));
        self
    }
}

/// Ordered readiness report for one environment key.
///
/// A ready environment is a single informational entry with no actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentStatus(pub Vec<StatusEntry>);

impl EnvironmentStatus {
    pub fn entries(&self) -> &[StatusEntry] {
        &self.0
    }

    /// All actions across entries, in order.
    pub fn actions(&self) -> impl Iterator<Item = &EnvironmentAction> {
        self.0.iter().flat_map(|entry| entry.actions.iter())
    }

    /// True when any entry offers a remediation action.
    pub fn has_actions(&self) -> bool {
        self.actions().next().is_some()
    }
}

/// Probes the environment for `key`.
pub fn environment_status(settings: &Settings, key: EnvironmentKey) -> EnvironmentStatus {
    match key {
        EnvironmentKey::Nextflow => NextflowEnvironment::new(settings).probe(),
    }
}

/// Performs a remediation action for `key`.
pub fn perform_environment_action(
    settings: &Settings,
    key: EnvironmentKey,
    action_id: &str,
) -> Result<(), ProvisioningError> {
    match key {
        EnvironmentKey::Nextflow => NextflowEnvironment::new(settings).perform_action(action_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_key_parse() {
        assert_eq!(EnvironmentKey::parse("nextflow").unwrap(), EnvironmentKey::Nextflow);
        assert_eq!(EnvironmentKey::parse(" Nextflow ").unwrap(), EnvironmentKey::Nextflow);
        assert!(EnvironmentKey::parse("snakemake").is_err());
    }

    #[test]
    fn test_status_actions() {
        let ready = EnvironmentStatus(vec![StatusEntry::new("Nextflow", "ok", Severity::Info)]);
        assert!(!ready.has_actions());

        let pending = EnvironmentStatus(vec![
            StatusEntry::new("WSL", "missing", Severity::Warning).with_action("install.wsl", "Install WSL"),
            StatusEntry::new("Nextflow", "missing", Severity::Warning),
        ]);
        assert!(pending.has_actions());
        let ids: Vec<&str> = pending.actions().map(|a| a.action_id.as_str()).collect();
        assert_eq!(ids, vec!["install.wsl"]);
    }

    #[test]
    fn test_status_serializes_as_list() {
        let status = EnvironmentStatus(vec![StatusEntry::new("Nextflow", "ok", Severity::Info)
            .with_action("install.nextflow", "Install Nextflow")]);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "title": "Nextflow",
                "description": "ok",
                "severity": "info",
                "actions": [{ "action_id": "install.nextflow", "label": "Install Nextflow" }]
            }])
        );
    }

    #[test]
    fn test_unknown_action_dispatch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::for_home(temp_dir.path());
        settings.host = Some(crate::settings::HostKind::Direct);

        let result = perform_environment_action(&settings, EnvironmentKey::Nextflow, "install.cobol");
        assert!(matches!(result, Err(ProvisioningError::UnknownAction(_))));
    }
}
