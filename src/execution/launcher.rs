//! Engine Launch
//!
//! Prepares an instance directory and starts the engine as a detached
//! process. The preparation steps are shared; how the engine is invoked
//! depends on the host and is captured by the [`Launcher`] trait:
//!
//! - [`DirectLauncher`]: runs the located runtime directly, with its output
//!   redirected to the instance log files.
//! - [`BridgedLauncher`]: runs `wsl.exe -d <distro> -e bash -lc "<cmd>"`,
//!   where the shell command performs the redirection inside the bridge.
//!
//! The engine is never waited on by the caller. Failures after a successful
//! spawn show up in `stderr.log`, not in the launch result.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use log::{debug, info, warn};

use super::paths::PathTranslator;
use super::runtime::RuntimeLocator;
use crate::error::LaunchError;
use crate::settings::{BridgeSettings, Settings};
use crate::workflow::instance::{
    LogKind, ParameterSet, RunOptions, WorkflowInstance, MAIN_SCRIPT,
};

/// Log files opened for a launch, truncated and in append mode.
#[derive(Debug)]
pub struct LogFiles {
    pub stdout: File,
    pub stderr: File,
}

/// Host-independent description of one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Directory the process starts in (host syntax).
    pub cwd: PathBuf,
    /// Engine arguments in runtime syntax, starting with `run`.
    pub engine_args: Vec<String>,
    /// Log destinations in runtime syntax.
    pub stdout_path: String,
    pub stderr_path: String,
}

/// Host-specific way of starting the engine.
pub trait Launcher: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Translator for paths handed to the engine.
    fn translator(&self) -> &PathTranslator;

    /// Builds the command to spawn.
    ///
    /// The returned command is not yet detached; [`launch`] does that.
    fn command(&self, plan: &LaunchPlan, logs: LogFiles) -> Result<Command, LaunchError>;
}

/// Runs the engine natively.
#[derive(Debug, Clone)]
pub struct DirectLauncher {
    locator: RuntimeLocator,
    translator: PathTranslator,
}

impl DirectLauncher {
    pub fn new(locator: RuntimeLocator) -> Self {
        Self {
            locator,
            translator: PathTranslator::Native,
        }
    }
}

impl Launcher for DirectLauncher {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn translator(&self) -> &PathTranslator {
        &self.translator
    }

    fn command(&self, plan: &LaunchPlan, logs: LogFiles) -> Result<Command, LaunchError> {
        let runtime = self.locator.locate()?;

        let mut cmd = runtime.command();
        cmd.args(&plan.engine_args)
            .current_dir(&plan.cwd)
            .stdin(Stdio::null())
            .stdout(logs.stdout)
            .stderr(logs.stderr);

        info!(
            "Spawning {} {} from {}",
            runtime.program().display(),
            plan.engine_args.join(" "),
            plan.cwd.display()
        );
        Ok(cmd)
    }
}

/// Runs the engine inside a WSL distribution.
#[derive(Debug, Clone)]
pub struct BridgedLauncher {
    bridge: BridgeSettings,
    engine_command: String,
    translator: PathTranslator,
}

impl BridgedLauncher {
    pub fn new(bridge: BridgeSettings, engine_command: impl Into<String>) -> Self {
        let translator = PathTranslator::Bridged {
            mount_root: bridge.mount_root.trim_end_matches('/').to_string(),
        };
        Self {
            bridge,
            engine_command: engine_command.into(),
            translator,
        }
    }

    /// Builds the shell command run by `bash -lc` inside the distribution.
    pub fn shell_command(&self, plan: &LaunchPlan) -> String {
        let engine = std::iter::once(self.engine_command.as_str())
            .chain(plan.engine_args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ");

        format!(
            "{} > {} 2> {} < /dev/null",
            engine,
            shell_quote(&plan.stdout_path),
            shell_quote(&plan.stderr_path)
        )
    }
}

impl Launcher for BridgedLauncher {
    fn name(&self) -> &'static str {
        "bridged"
    }

    fn translator(&self) -> &PathTranslator {
        &self.translator
    }

    fn command(&self, plan: &LaunchPlan, _logs: LogFiles) -> Result<Command, LaunchError> {
        let shell = self.shell_command(plan);

        let mut cmd = Command::new(&self.bridge.command);
        cmd.arg("-d")
            .arg(&self.bridge.distribution)
            .arg("-e")
            .arg("bash")
            .arg("-lc")
            .arg(&shell)
            .current_dir(&plan.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        info!(
            "Spawning {} in WSL distribution '{}' from {}",
            shell,
            self.bridge.distribution,
            plan.cwd.display()
        );
        Ok(cmd)
    }
}

/// Selects the launcher for the configured host.
pub fn launcher_for(settings: &Settings) -> Box<dyn Launcher> {
    use crate::settings::HostKind;

    match settings.host() {
        HostKind::Direct => Box::new(DirectLauncher::new(RuntimeLocator::new(settings))),
        HostKind::Bridged => Box::new(BridgedLauncher::new(
            settings.bridge.clone(),
            settings.engine_command.clone(),
        )),
    }
}

/// Quotes a word for a POSIX shell when it contains special characters.
fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Builds the engine argument vector for an instance.
pub fn engine_arguments(
    instance: &WorkflowInstance,
    opts: &RunOptions,
    translator: &PathTranslator,
) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        translator.resolve_runtime_path(instance.project_path(), MAIN_SCRIPT),
        "-work-dir".to_string(),
        translator.translate(&instance.work_path()),
        "-profile".to_string(),
        opts.profile.clone(),
        "-params-file".to_string(),
        translator.translate(&instance.params_path()),
        "-name".to_string(),
        instance.name.clone(),
    ];
    if opts.resume {
        args.push("-resume".to_string());
    }
    args
}

/// Creates the instance and work directories.
fn ensure_directories(instance: &WorkflowInstance) -> Result<(), LaunchError> {
    let work = instance.work_path();
    fs::create_dir_all(&work)
        .map_err(|e| LaunchError::io("failed to create work directory", &work, e))?;
    debug!("Work directory ready: {}", work.display());
    Ok(())
}

/// Writes the parameter file, replacing any previous one.
fn write_params(instance: &WorkflowInstance, params: &ParameterSet) -> Result<(), LaunchError> {
    let path = instance.params_path();
    let json = serde_json::to_string_pretty(params)?;
    fs::write(&path, json).map_err(|e| LaunchError::io("failed to write parameters", &path, e))?;
    debug!("Wrote parameters to {}", path.display());
    Ok(())
}

/// Truncates (or creates) a log file and reopens it for appending.
fn reset_log(path: &Path) -> Result<File, LaunchError> {
    File::create(path).map_err(|e| LaunchError::io("failed to truncate log", path, e))?;
    OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| LaunchError::io("failed to open log", path, e))
}

/// Prepares the instance directory for a launch.
///
/// Creates `work/`, writes `params.json` unless resuming or restarting, and
/// resets both log files. Returns the opened logs.
pub fn prepare_instance(
    instance: &WorkflowInstance,
    params: &ParameterSet,
    opts: &RunOptions,
) -> Result<LogFiles, LaunchError> {
    ensure_directories(instance)?;

    if opts.writes_params() {
        write_params(instance, params)?;
    } else {
        debug!(
            "Keeping existing parameters for '{}' (resume: {}, restart: {})",
            instance.name, opts.resume, opts.restart
        );
    }

    Ok(LogFiles {
        stdout: reset_log(&instance.log_path(LogKind::Stdout))?,
        stderr: reset_log(&instance.log_path(LogKind::Stderr))?,
    })
}

/// Starts the child in its own process group so it outlives the caller.
fn detach(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
    }
}

/// Collects the child's exit status in the background and logs it.
fn release(mut child: Child, instance_name: String) {
    let pid = child.id();
    let spawned = thread::Builder::new()
        .name(format!("reap-{}", pid))
        .spawn(move || match child.wait() {
            Ok(status) => debug!("Engine for '{}' (pid {}) exited: {}", instance_name, pid, status),
            Err(e) => warn!("Failed to wait on engine pid {}: {}", pid, e),
        });

    if let Err(e) = spawned {
        warn!("Failed to start reaper for pid {}: {}", pid, e);
    }
}

/// Launches the engine for an instance and returns the process id.
///
/// Steps, in order: ensure directories, translate path-like parameters on
/// bridged hosts, write `params.json` (unless `resume`/`restart`), reset
/// the logs, build the engine command, and spawn it detached.
///
/// Callers must serialize launches of the same instance.
pub fn launch(
    launcher: &dyn Launcher,
    instance: &WorkflowInstance,
    params: ParameterSet,
    opts: &RunOptions,
) -> Result<u32, LaunchError> {
    let translator = launcher.translator();

    let params: ParameterSet = if translator.translates() {
        params
            .into_iter()
            .map(|(key, value)| (key, translator.translate_params_if_path_like(value)))
            .collect()
    } else {
        params
    };

    let logs = prepare_instance(instance, &params, opts)?;

    let plan = LaunchPlan {
        cwd: instance.path.clone(),
        engine_args: engine_arguments(instance, opts, translator),
        stdout_path: translator.translate(&instance.log_path(LogKind::Stdout)),
        stderr_path: translator.translate(&instance.log_path(LogKind::Stderr)),
    };

    let mut cmd = launcher.command(&plan, logs)?;
    detach(&mut cmd);

    let program = cmd.get_program().to_string_lossy().into_owned();
    let child = cmd.spawn().map_err(|e| LaunchError::SpawnFailed {
        program: program.clone(),
        reason: e.to_string(),
    })?;

    let pid = child.id();
    if pid == 0 {
        return Err(LaunchError::SpawnFailed {
            program,
            reason: "process started without an id".to_string(),
        });
    }

    info!(
        "Launched '{}' via {} launcher (pid {})",
        instance.name,
        launcher.name(),
        pid
    );
    release(child, instance.name.clone());
    Ok(pid)
}
