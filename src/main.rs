//! GLACIER CLI Entry Point
//!
//! Command-line interface over the instance execution orchestrator.
//!
//! # Usage
//!
//! ```bash
//! # Launch an instance (params.json is optional)
//! glacier run ~/GLACIER/rnaseq/run-1/instance.json params.json --profile docker
//!
//! # Relaunch, letting the engine reuse cached work
//! glacier run ~/GLACIER/rnaseq/run-1/instance.json --resume
//!
//! # List the profiles a workflow declares
//! glacier profiles ~/GLACIER/rnaseq/3.14.0
//!
//! # Check and fix the engine installation
//! glacier env status
//! glacier env action nextflow install.nextflow
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use colored::Colorize;
use log::{debug, info};

use glacier::environment::{EnvironmentKey, EnvironmentStatus, Severity};
use glacier::execution::Engine;
use glacier::monitoring::{is_process_running, locate_reports};
use glacier::settings::Settings;
use glacier::workflow::instance::{LogKind, ParameterSet, RunOptions, WorkflowInstance};
use glacier::workflow::profiles::discover_profiles;
use glacier::{APP_NAME, VERSION};

/// Settings file looked up under the home directory when `--config` is absent.
const DEFAULT_SETTINGS_FILE: &str = ".glacier/settings.yaml";

/// Subcommand parsed from arguments.
#[derive(Debug, PartialEq)]
enum Command {
    Run {
        instance: PathBuf,
        params: Option<PathBuf>,
        opts: RunOptions,
    },
    Profiles {
        workflow_dir: PathBuf,
    },
    EnvStatus {
        key: EnvironmentKey,
    },
    EnvAction {
        key: EnvironmentKey,
        action_id: String,
    },
    Ps {
        pid: u32,
    },
    Logs {
        instance: PathBuf,
        kind: LogKind,
    },
    Reports {
        dir: PathBuf,
    },
    Help,
    Version,
}

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    command: Command,
    config_path: Option<PathBuf>,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: glacier [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("Commands:");
    println!("  run <INSTANCE_JSON> [PARAMS_JSON]   Launch the engine for an instance");
    println!("  profiles <WORKFLOW_DIR>             List profiles in nextflow.config");
    println!("  env status [KEY]                    Report engine availability");
    println!("  env action <KEY> <ACTION>           Run a remediation action");
    println!("  ps <PID>                            Check whether an engine is running");
    println!("  logs <INSTANCE_JSON> [stdout|stderr] Print an instance log");
    println!("  reports <DIR>                       List HTML reports under a directory");
    println!();
    println!("Run options:");
    println!("  --resume            Reuse cached work and keep params.json");
    println!("  --restart           Keep params.json without resuming");
    println!("  --profile NAME      Engine profile (default: standard)");
    println!();
    println!("Options:");
    println!("  --config FILE       Settings file (default: ~/{})", DEFAULT_SETTINGS_FILE);
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
}

fn parse_key(raw: Option<&String>) -> Result<EnvironmentKey, String> {
    raw.map_or(Ok(EnvironmentKey::Nextflow), |k| EnvironmentKey::parse(k))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut positional: Vec<String> = Vec::new();
    let mut opts = RunOptions::default();
    let mut config_path = None;
    let mut verbose = false;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                return Ok(Config {
                    command: Command::Help,
                    config_path,
                    verbose,
                })
            }
            "--version" | "-V" => {
                return Ok(Config {
                    command: Command::Version,
                    config_path,
                    verbose,
                })
            }
            "--verbose" | "-v" => verbose = true,
            "--resume" => opts.resume = true,
            "--restart" => opts.restart = true,
            "--profile" => {
                i += 1;
                let name = args.get(i).ok_or("--profile requires a name argument")?;
                opts.profile = name.clone();
            }
            "--config" => {
                i += 1;
                let path = args.get(i).ok_or("--config requires a path argument")?;
                config_path = Some(PathBuf::from(path));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => positional.push(arg.clone()),
        }
        i += 1;
    }

    let (name, rest) = positional.split_first().ok_or("No command given")?;
    let at_most = |count: usize| -> Result<(), String> {
        if rest.len() > count {
            Err(format!("Unexpected argument: {}", rest[count]))
        } else {
            Ok(())
        }
    };
    let required = |index: usize, what: &str| -> Result<PathBuf, String> {
        rest.get(index)
            .map(PathBuf::from)
            .ok_or_else(|| format!("'{}' requires {}", name, what))
    };

    let command = match name.as_str() {
        "run" => {
            at_most(2)?;
            Command::Run {
                instance: required(0, "an instance file")?,
                params: rest.get(1).map(PathBuf::from),
                opts,
            }
        }
        "profiles" => {
            at_most(1)?;
            Command::Profiles {
                workflow_dir: required(0, "a workflow directory")?,
            }
        }
        "env" => match rest.first().map(String::as_str) {
            Some("status") => {
                at_most(2)?;
                Command::EnvStatus {
                    key: parse_key(rest.get(1))?,
                }
            }
            Some("action") => {
                at_most(3)?;
                let key = parse_key(rest.get(1))?;
                let action_id = rest.get(2).ok_or("'env action' requires <KEY> <ACTION>")?;
                Command::EnvAction {
                    key,
                    action_id: action_id.clone(),
                }
            }
            _ => return Err("'env' expects 'status' or 'action'".to_string()),
        },
        "ps" => {
            at_most(1)?;
            let raw = rest.first().ok_or("'ps' requires a pid")?;
            let pid = raw.parse().map_err(|_| format!("Invalid pid: {}", raw))?;
            Command::Ps { pid }
        }
        "logs" => {
            at_most(2)?;
            let kind = match rest.get(1) {
                Some(raw) => LogKind::parse(raw)?,
                None => LogKind::Stdout,
            };
            Command::Logs {
                instance: required(0, "an instance file")?,
                kind,
            }
        }
        "reports" => {
            at_most(1)?;
            Command::Reports {
                dir: required(0, "a directory")?,
            }
        }
        other => return Err(format!("Unknown command: {}", other)),
    };

    Ok(Config {
        command,
        config_path,
        verbose,
    })
}

fn home_dir() -> Result<PathBuf, String> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or_else(|| "Cannot determine home directory (HOME/USERPROFILE unset)".to_string())
}

/// Loads settings from `--config`, the default file, or built-in defaults.
fn load_settings(config_path: Option<&Path>) -> Result<Settings, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading settings: {}", path.display());
        return Ok(Settings::load(path)?);
    }

    let home = home_dir()?;
    let default_path = home.join(DEFAULT_SETTINGS_FILE);
    if default_path.is_file() {
        info!("Loading settings: {}", default_path.display());
        Ok(Settings::load(&default_path)?)
    } else {
        debug!("No settings file at {}, using defaults", default_path.display());
        Ok(Settings::for_home(&home))
    }
}

fn read_instance(path: &Path) -> Result<WorkflowInstance, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Could not read instance '{}': {}", path.display(), e))?;
    let instance = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid instance file '{}': {}", path.display(), e))?;
    Ok(instance)
}

fn read_params(path: &Path) -> Result<ParameterSet, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Could not read parameters '{}': {}", path.display(), e))?;
    let params = serde_json::from_str(&text)
        .map_err(|e| format!("Parameters '{}' must be a JSON object: {}", path.display(), e))?;
    Ok(params)
}

/// Prints a status report with coloured severities.
fn print_status(key: EnvironmentKey, status: &EnvironmentStatus) {
    println!("{} environment:", key.to_string().bold());
    for entry in status.entries() {
        let tag = match entry.severity {
            Severity::Info => "ok".green(),
            Severity::Warning => "warning".yellow(),
            Severity::Error => "error".red(),
        };
        println!("  [{}] {}: {}", tag, entry.title.bold(), entry.description);
        for action in &entry.actions {
            println!("      -> {} ({})", action.label, action.action_id.cyan());
        }
    }
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    match config.command {
        Command::Help => {
            print_usage();
            return Ok(());
        }
        Command::Version => {
            println!("{} {}", APP_NAME, VERSION);
            return Ok(());
        }
        _ => {}
    }

    setup_logging(config.verbose);
    let settings = load_settings(config.config_path.as_deref())?;

    match config.command {
        Command::Run {
            instance,
            params,
            opts,
        } => {
            let instance = read_instance(&instance)?;
            let params = match params {
                Some(path) => read_params(&path)?,
                None => ParameterSet::new(),
            };
            let engine = Engine::new(settings);
            let pid = engine.run_workflow(&instance, params, &opts)?;
            println!("{} '{}' (pid {})", "Launched".green(), instance.name, pid);
            println!("  stdout: {}", instance.log_path(LogKind::Stdout).display());
            println!("  stderr: {}", instance.log_path(LogKind::Stderr).display());
        }
        Command::Profiles { workflow_dir } => {
            let config_file = workflow_dir.join("nextflow.config");
            let text = fs::read_to_string(&config_file).unwrap_or_else(|e| {
                debug!("Cannot read {}: {}", config_file.display(), e);
                String::new()
            });
            for profile in discover_profiles(&text) {
                println!("{}", profile);
            }
        }
        Command::EnvStatus { key } => {
            let engine = Engine::new(settings);
            print_status(key, &engine.environment_status(key));
        }
        Command::EnvAction { key, action_id } => {
            let engine = Engine::new(settings);
            if let Err(e) = engine.perform_environment_action(key, &action_id) {
                if e.is_network() {
                    eprintln!("{} check your connection and retry", "Network error:".yellow());
                }
                return Err(e.into());
            }
            println!("{} {}", "Completed".green(), action_id);
            print_status(key, &engine.environment_status(key));
        }
        Command::Ps { pid } => {
            if is_process_running(pid) {
                println!("{} {}", pid, "running".green());
            } else {
                println!("{} {}", pid, "not running".yellow());
            }
        }
        Command::Logs { instance, kind } => {
            let instance = read_instance(&instance)?;
            print!("{}", instance.read_log(kind)?);
        }
        Command::Reports { dir } => {
            for report in locate_reports(&dir)? {
                println!("{:>3}  {:<30} {}", report.id, report.name, report.short_path.display());
            }
        }
        Command::Help | Command::Version => {}
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("glacier")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_run_with_options() {
        let config = parse_arguments(&args(&[
            "run",
            "instance.json",
            "params.json",
            "--resume",
            "--profile",
            "docker",
            "--verbose",
        ]))
        .unwrap();

        assert!(config.verbose);
        let Command::Run {
            instance,
            params,
            opts,
        } = config.command
        else {
            panic!("expected run command");
        };
        assert_eq!(instance, PathBuf::from("instance.json"));
        assert_eq!(params, Some(PathBuf::from("params.json")));
        assert!(opts.resume);
        assert!(!opts.restart);
        assert_eq!(opts.profile, "docker");
    }

    #[test]
    fn test_parse_env_commands() {
        let status = parse_arguments(&args(&["env", "status"])).unwrap();
        assert_eq!(
            status.command,
            Command::EnvStatus {
                key: EnvironmentKey::Nextflow
            }
        );

        let action = parse_arguments(&args(&["env", "action", "nextflow", "install.nextflow"])).unwrap();
        assert_eq!(
            action.command,
            Command::EnvAction {
                key: EnvironmentKey::Nextflow,
                action_id: "install.nextflow".to_string()
            }
        );

        assert!(parse_arguments(&args(&["env", "action", "nextflow"])).is_err());
        assert!(parse_arguments(&args(&["env", "status", "conda"])).is_err());
    }

    #[test]
    fn test_parse_logs_and_ps() {
        let logs = parse_arguments(&args(&["logs", "i.json", "stderr"])).unwrap();
        assert_eq!(
            logs.command,
            Command::Logs {
                instance: PathBuf::from("i.json"),
                kind: LogKind::Stderr
            }
        );

        let ps = parse_arguments(&args(&["ps", "4242"])).unwrap();
        assert_eq!(ps.command, Command::Ps { pid: 4242 });
        assert!(parse_arguments(&args(&["ps", "abc"])).is_err());
    }

    #[test]
    fn test_parse_config_flag() {
        let config = parse_arguments(&args(&["--config", "/tmp/s.yaml", "reports", "out"])).unwrap();
        assert_eq!(config.config_path, Some(PathBuf::from("/tmp/s.yaml")));
        assert_eq!(
            config.command,
            Command::Reports {
                dir: PathBuf::from("out")
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_arguments(&args(&[])).is_err());
        assert!(parse_arguments(&args(&["launch"])).is_err());
        assert!(parse_arguments(&args(&["run"])).is_err());
        assert!(parse_arguments(&args(&["profiles", "a", "b"])).is_err());
        assert!(parse_arguments(&args(&["run", "i.json", "--profile"])).is_err());
        assert!(parse_arguments(&args(&["--bogus"])).is_err());
    }

    #[test]
    fn test_parse_help_and_version() {
        assert_eq!(parse_arguments(&args(&["--help"])).unwrap().command, Command::Help);
        assert_eq!(parse_arguments(&args(&["-V"])).unwrap().command, Command::Version);
    }
}
