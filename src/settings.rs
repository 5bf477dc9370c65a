//! Orchestrator Settings
//!
//! Everything the launcher, runtime locator and installer need to know about
//! the host is carried here explicitly instead of being read from the process
//! environment at call sites. Tests build settings around a temporary
//! directory; the CLI builds them from the user's home directory and an
//! optional YAML file.
//!
//! # Example YAML Format
//!
//! ```yaml
//! collections_path: /home/alice/GLACIER
//! engine_command: nextflow
//! packaging:
//!   kind: bundled
//!   resource_root: /opt/glacier/resources/bundle
//!   user_data_dir: /home/alice/.config/GLACIER
//! bridge:
//!   distribution: glacier
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Name of the collections directory created under the user's home.
pub const COLLECTIONS_DIR_NAME: &str = "GLACIER";

/// Default engine command resolved on the search path.
pub const DEFAULT_ENGINE_COMMAND: &str = "nextflow";

/// Self-installing engine launcher.
pub const DEFAULT_ENGINE_URL: &str = "https://get.nextflow.io";

/// Host kind detected for the running binary.
static DETECTED_HOST: Lazy<HostKind> = Lazy::new(|| {
    let host = if cfg!(windows) {
        HostKind::Bridged
    } else {
        HostKind::Direct
    };
    info!("Detected host kind: {}", host);
    host
});

/// How the execution engine is reached from this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    /// The engine runs natively (Linux, macOS).
    Direct,
    /// The engine runs inside a WSL distribution (Windows).
    Bridged,
}

impl HostKind {
    /// Returns the host kind of the running binary.
    pub fn detect() -> Self {
        *DETECTED_HOST
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Bridged => "bridged",
        }
    }
}

impl std::fmt::Display for HostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the application was packaged.
///
/// A bare install relies on an engine found on the search path (or a
/// managed install); a bundled build ships its own JRE and engine jar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Packaging {
    #[default]
    Bare,
    Bundled {
        /// Directory holding `jre/` and `nextflow.jar`.
        resource_root: PathBuf,
        /// Per-user application data; `nextflow/` below it becomes `NXF_HOME`.
        user_data_dir: PathBuf,
    },
}

/// WSL bridge configuration used on bridged hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Bridge executable.
    pub command: String,
    /// Dedicated distribution the engine runs in.
    pub distribution: String,
    /// Distribution image the dedicated distribution is created from.
    pub base_distribution: String,
    /// Where host drives are mounted inside the distribution.
    pub mount_root: String,
    /// Java runtime package installed inside the distribution.
    pub java_package: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            command: "wsl.exe".to_string(),
            distribution: "glacier".to_string(),
            base_distribution: "Ubuntu-24.04".to_string(),
            mount_root: "/mnt".to_string(),
            java_package: "openjdk-21-jre-headless".to_string(),
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Base library directory for collections and managed tools.
    pub collections_path: PathBuf,

    /// Location of the managed engine install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_engine_path: Option<PathBuf>,

    /// Engine command resolved on the search path.
    #[serde(default = "default_engine_command")]
    pub engine_command: String,

    /// Where the managed engine is downloaded from.
    #[serde(default = "default_engine_url")]
    pub engine_url: String,

    #[serde(default)]
    pub packaging: Packaging,

    /// Overrides host detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostKind>,

    #[serde(default)]
    pub bridge: BridgeSettings,
}

fn default_engine_command() -> String {
    DEFAULT_ENGINE_COMMAND.to_string()
}

fn default_engine_url() -> String {
    DEFAULT_ENGINE_URL.to_string()
}

impl Settings {
    /// Builds default settings rooted at the given home directory.
    pub fn for_home(home: impl AsRef<Path>) -> Self {
        Self {
            collections_path: home.as_ref().join(COLLECTIONS_DIR_NAME),
            managed_engine_path: None,
            engine_command: default_engine_command(),
            engine_url: default_engine_url(),
            packaging: Packaging::default(),
            host: None,
            bridge: BridgeSettings::default(),
        }
    }

    /// Loads settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let settings = serde_yaml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Saves settings as YAML, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let write_err = |reason: String| SettingsError::Write {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let yaml = serde_yaml::to_string(self).map_err(|e| write_err(e.to_string()))?;
        fs::write(path, yaml).map_err(|e| write_err(e.to_string()))?;
        Ok(())
    }

    /// Returns the configured host kind, falling back to detection.
    pub fn host(&self) -> HostKind {
        self.host.unwrap_or_else(HostKind::detect)
    }

    /// Path of the managed engine install.
    ///
    /// Defaults to `{collections_path}/bin/nextflow`.
    pub fn managed_engine_path(&self) -> PathBuf {
        self.managed_engine_path.clone().unwrap_or_else(|| {
            self.collections_path
                .join("bin")
                .join(DEFAULT_ENGINE_COMMAND)
        })
    }
}
