//! Workflow Instance Model
//!
//! Records handed to the orchestrator by the instance registry, plus the
//! per-instance file layout the launcher writes.
//!
//! # Instance Directory Layout
//!
//! ```text
//! {instance.path}/
//!   params.json   pretty-printed parameter mapping
//!   stdout.log    engine standard output (fresh per launch)
//!   stderr.log    engine standard error (fresh per launch)
//!   work/         engine scratch and resume state
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameter file written into the instance directory.
pub const PARAMS_FILE: &str = "params.json";

/// Engine standard output log.
pub const STDOUT_LOG: &str = "stdout.log";

/// Engine standard error log.
pub const STDERR_LOG: &str = "stderr.log";

/// Engine work directory.
pub const WORK_DIR: &str = "work";

/// Engine entry script inside a workflow definition.
pub const MAIN_SCRIPT: &str = "main.nf";

/// Engine configuration file inside a workflow definition.
pub const CONFIG_FILE: &str = "nextflow.config";

/// Profile the engine assumes when none is chosen.
pub const DEFAULT_PROFILE: &str = "standard";

/// Ordered mapping of parameter name to value.
pub type ParameterSet = Map<String, Value>;

/// Lifecycle tag of an instance, owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Created,
    Running,
    Completed,
    Closed,
    Failed,
    Unknown,
}

/// A resolved, already-cloned workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub name: String,
    pub version: String,
    /// Directory holding `main.nf` and `nextflow.config`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// One configured execution of a workflow version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: String,
    /// Unique human-readable name, passed to the engine as the run name.
    pub name: String,
    /// Instance working directory, exclusively owned by this instance.
    pub path: PathBuf,
    pub workflow_version: WorkflowVersion,
    #[serde(default)]
    pub status: WorkflowStatus,
}

impl WorkflowInstance {
    /// Directory the engine is launched against.
    ///
    /// Falls back to the instance directory when the version has no path.
    pub fn project_path(&self) -> &Path {
        self.workflow_version.path.as_deref().unwrap_or(&self.path)
    }

    pub fn params_path(&self) -> PathBuf {
        self.path.join(PARAMS_FILE)
    }

    pub fn work_path(&self) -> PathBuf {
        self.path.join(WORK_DIR)
    }

    pub fn log_path(&self, kind: LogKind) -> PathBuf {
        self.path.join(kind.file_name())
    }

    /// Reads the saved parameter file, if any.
    pub fn read_params(&self) -> io::Result<Option<ParameterSet>> {
        let path = self.params_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let params = serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(params))
    }

    /// Reads one of the engine logs; a missing log reads as empty.
    pub fn read_log(&self, kind: LogKind) -> io::Result<String> {
        match fs::read_to_string(self.log_path(kind)) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }
}

/// Which engine log to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Stdout,
    Stderr,
}

impl LogKind {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Stdout => STDOUT_LOG,
            Self::Stderr => STDERR_LOG,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            _ => Err("log must be one of: stdout, stderr".to_string()),
        }
    }
}

/// Options controlling a single launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Resume from the engine's cached work; keeps the existing parameter file.
    pub resume: bool,
    /// Rerun with the existing parameter file.
    pub restart: bool,
    pub profile: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            resume: false,
            restart: false,
            profile: DEFAULT_PROFILE.to_string(),
        }
    }
}

impl RunOptions {
    /// True when the launch writes a fresh parameter file.
    pub fn writes_params(&self) -> bool {
        !self.resume && !self.restart
    }
}
