//! Nextflow Availability and Installation
//!
//! # Probe Order
//!
//! Direct hosts:
//! 1. Managed install: `{collections_path}/bin/nextflow -version` succeeds
//! 2. System install: `nextflow -version` on PATH succeeds
//! 3. Otherwise unavailable
//!
//! Bridged (WSL) hosts:
//! 1. `wsl.exe --status` succeeds, otherwise the bridge is missing
//! 2. `nextflow -version` succeeds inside the GLACIER distribution
//!
//! # Actions
//!
//! - `install.nextflow` (direct): download the self-installing launcher into
//!   the managed location, mark it executable and smoke-test it
//! - `install.wsl` (bridged): install WSL itself
//! - `install.distribution` (bridged): recreate the GLACIER distribution
//!   with Java and Nextflow inside

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::wsl::WslBridge;
use super::{EnvironmentStatus, Severity, StatusEntry};
use crate::error::ProvisioningError;
use crate::settings::{HostKind, Settings};

pub const INSTALL_NEXTFLOW: &str = "install.nextflow";
pub const INSTALL_WSL: &str = "install.wsl";
pub const INSTALL_DISTRIBUTION: &str = "install.distribution";

/// Attempts made when a freshly written executable is still busy.
const BUSY_RETRIES: u32 = 5;

/// Where an engine runtime was (or was not) found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// No working engine on a direct host.
    Unavailable,
    /// An engine on PATH works; no managed install.
    SystemAvailable,
    /// The managed install works.
    ManagedAvailable,
    /// WSL is missing or not accessible.
    BridgeMissing,
    /// WSL works but the distribution lacks a working engine.
    BridgeWithoutRuntime,
    /// The engine works inside the distribution.
    Ready,
}

/// Source of the engine launcher artifact.
pub trait ArtifactFetcher: Send + Sync {
    /// Human-readable origin, used in errors.
    fn source(&self) -> &str;

    /// Streams the artifact into `dest`, returning the bytes written.
    fn fetch(&self, dest: &mut dyn Write) -> Result<u64, ProvisioningError>;
}

/// Downloads the artifact over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    url: String,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn source(&self) -> &str {
        &self.url
    }

    fn fetch(&self, dest: &mut dyn Write) -> Result<u64, ProvisioningError> {
        let download_err = |reason: String| ProvisioningError::Download {
            url: self.url.clone(),
            reason,
        };

        let response = ureq::get(&self.url)
            .set("user-agent", concat!("glacier/", env!("CARGO_PKG_VERSION")))
            .call()
            .map_err(|e| download_err(e.to_string()))?;

        let status = response.status();
        if status != 200 {
            return Err(download_err(format!("unexpected status {}", status)));
        }

        io::copy(&mut response.into_reader(), dest).map_err(|e| download_err(e.to_string()))
    }
}

/// Runs `<program> -version`, retrying while the executable is busy.
///
/// A just-written executable can briefly report ETXTBSY while another
/// thread's fork still holds the write handle.
fn run_version(program: &Path) -> io::Result<ExitStatus> {
    let mut attempt = 0;
    loop {
        let result = Command::new(program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match result {
            Err(e) if is_busy(&e) && attempt + 1 < BUSY_RETRIES => {
                attempt += 1;
                thread::sleep(Duration::from_millis(50 * u64::from(attempt)));
            }
            other => return other,
        }
    }
}

#[cfg(unix)]
fn is_busy(e: &io::Error) -> bool {
    const ETXTBSY: i32 = 26;
    e.raw_os_error() == Some(ETXTBSY)
}

#[cfg(not(unix))]
fn is_busy(_e: &io::Error) -> bool {
    false
}

/// True when the engine at `program` answers `-version` successfully.
fn engine_responds(program: &Path) -> bool {
    match run_version(program) {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("'{} -version' not runnable: {}", program.display(), e);
            false
        }
    }
}

/// Prober and installer for the Nextflow runtime.
pub struct NextflowEnvironment {
    host: HostKind,
    managed_path: PathBuf,
    system_command: String,
    fetcher: Box<dyn ArtifactFetcher>,
    bridge: WslBridge,
}

impl NextflowEnvironment {
    pub fn new(settings: &Settings) -> Self {
        Self {
            host: settings.host(),
            managed_path: settings.managed_engine_path(),
            system_command: settings.engine_command.clone(),
            fetcher: Box::new(HttpFetcher::new(&settings.engine_url)),
            bridge: WslBridge::new(&settings.bridge, &settings.engine_command, &settings.engine_url),
        }
    }

    /// Replaces the artifact source used by `install.nextflow`.
    pub fn with_fetcher(mut self, fetcher: Box<dyn ArtifactFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Determines the current runtime state.
    pub fn state(&self) -> RuntimeState {
        match self.host {
            HostKind::Direct => {
                if self.managed_path.is_file() && engine_responds(&self.managed_path) {
                    RuntimeState::ManagedAvailable
                } else if engine_responds(Path::new(&self.system_command)) {
                    RuntimeState::SystemAvailable
                } else {
                    RuntimeState::Unavailable
                }
            }
            HostKind::Bridged => {
                if !self.bridge.is_available() {
                    RuntimeState::BridgeMissing
                } else if self.bridge.has_engine() {
                    RuntimeState::Ready
                } else {
                    RuntimeState::BridgeWithoutRuntime
                }
            }
        }
    }

    /// Reports readiness with remediation actions.
    pub fn probe(&self) -> EnvironmentStatus {
        let state = self.state();
        info!("Nextflow environment state: {:?}", state);
        status_for(state)
    }

    /// Runs a remediation action.
    ///
    /// Every action can be re-run after a partial failure.
    pub fn perform_action(&self, action_id: &str) -> Result<(), ProvisioningError> {
        match (self.host, action_id) {
            (HostKind::Direct, INSTALL_NEXTFLOW) => self.install_managed(),
            (HostKind::Bridged, INSTALL_WSL) => self.bridge.install(),
            (HostKind::Bridged, INSTALL_DISTRIBUTION) => self.bridge.provision_distribution(),
            _ => Err(ProvisioningError::UnknownAction(action_id.to_string())),
        }
    }

    /// Downloads, installs and smoke-tests the managed engine.
    fn install_managed(&self) -> Result<(), ProvisioningError> {
        let target = &self.managed_path;
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .map_err(|e| ProvisioningError::io("failed to create directory", dir, e))?;

        let partial = partial_path(target);
        remove_if_present(&partial)?;

        info!("Downloading Nextflow from {}", self.fetcher.source());
        let mut file = File::create(&partial)
            .map_err(|e| ProvisioningError::io("failed to create", &partial, e))?;

        let written = self.fetcher.fetch(&mut file).and_then(|bytes| {
            file.sync_all()
                .map_err(|e| ProvisioningError::io("failed to flush", &partial, e))?;
            Ok(bytes)
        });
        drop(file);

        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Nextflow download failed: {}", e);
                if let Err(cleanup) = fs::remove_file(&partial) {
                    warn!("Failed to remove {}: {}", partial.display(), cleanup);
                }
                return Err(e);
            }
        };
        debug!("Downloaded {} bytes to {}", bytes, partial.display());

        fs::rename(&partial, target)
            .map_err(|e| ProvisioningError::io("failed to move into place", target, e))?;
        mark_executable(target)?;

        let status = run_version(target).map_err(|e| ProvisioningError::Command {
            program: target.display().to_string(),
            reason: e.to_string(),
        })?;

        if !status.success() {
            error!("Nextflow smoke test failed: {}", status);
            return Err(ProvisioningError::SmokeTest {
                command: format!("{} -version", target.display()),
                status: status.code(),
            });
        }

        info!("Installed managed Nextflow at {}", target.display());
        Ok(())
    }
}

/// Maps a runtime state to the status shown to the user.
pub fn status_for(state: RuntimeState) -> EnvironmentStatus {
    let entries = match state {
        RuntimeState::ManagedAvailable => vec![StatusEntry::new(
            "Nextflow",
            "A GLACIER managed version of Nextflow is installed and accessible.",
            Severity::Info,
        )],
        RuntimeState::SystemAvailable => vec![StatusEntry::new(
            "Nextflow",
            "A system install is available and accessible. \
             You can install a GLACIER managed version if you prefer.",
            Severity::Info,
        )
        .with_action(INSTALL_NEXTFLOW, "Install Nextflow")],
        RuntimeState::Unavailable => vec![StatusEntry::new(
            "Nextflow",
            "A working Nextflow installation cannot be found. Please install Nextflow.",
            Severity::Warning,
        )
        .with_action(INSTALL_NEXTFLOW, "Install Nextflow")],
        RuntimeState::BridgeMissing => vec![
            StatusEntry::new(
                "WSL",
                "WSL2 is not installed or not accessible. It is required to run Nextflow on Windows.",
                Severity::Warning,
            )
            .with_action(INSTALL_WSL, "Install WSL"),
            StatusEntry::new(
                "GLACIER distribution",
                "The GLACIER WSL distribution can be set up once WSL is installed.",
                Severity::Info,
            ),
        ],
        RuntimeState::BridgeWithoutRuntime => vec![
            StatusEntry::new("WSL", "WSL2 is installed and accessible.", Severity::Info),
            StatusEntry::new(
                "GLACIER distribution",
                "The GLACIER WSL distribution is not set up or cannot run Nextflow.",
                Severity::Warning,
            )
            .with_action(INSTALL_DISTRIBUTION, "Set up GLACIER distribution"),
        ],
        RuntimeState::Ready => vec![StatusEntry::new(
            "Nextflow",
            "Nextflow is installed and accessible in the GLACIER WSL distribution.",
            Severity::Info,
        )],
    };
    EnvironmentStatus(entries)
}

/// Download destination used until the artifact is complete.
fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

fn remove_if_present(path: &Path) -> Result<(), ProvisioningError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProvisioningError::io("failed to remove stale file", path, e)),
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), ProvisioningError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
        ProvisioningError::Permission {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), ProvisioningError> {
    Ok(())
}
