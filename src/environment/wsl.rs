//! WSL Bridge Provisioning
//!
//! On Windows the engine runs inside a dedicated WSL distribution. This
//! module checks that WSL works, checks that the distribution can run the
//! engine, and (re)creates that distribution.
//!
//! Provisioning is destructive by intent: an existing distribution with the
//! configured name is unregistered before being recreated, so a half-built
//! distribution never blocks a retry.

use std::process::{Command, Output, Stdio};

use log::{debug, error, info};

use crate::error::ProvisioningError;
use crate::settings::BridgeSettings;

/// Commands and names for talking to WSL.
#[derive(Debug, Clone)]
pub struct WslBridge {
    command: String,
    distribution: String,
    base_distribution: String,
    java_package: String,
    engine_command: String,
    engine_url: String,
}

impl WslBridge {
    pub fn new(settings: &BridgeSettings, engine_command: &str, engine_url: &str) -> Self {
        Self {
            command: settings.command.clone(),
            distribution: settings.distribution.clone(),
            base_distribution: settings.base_distribution.clone(),
            java_package: settings.java_package.clone(),
            engine_command: engine_command.to_string(),
            engine_url: engine_url.to_string(),
        }
    }

    fn wsl(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Runs WSL with `args`, failing on spawn errors or non-zero exit.
    ///
    /// Failures are returned without logging; callers decide how loud
    /// they are.
    fn output(&self, args: &[&str]) -> Result<Output, ProvisioningError> {
        debug!("Running {} {}", self.command, args.join(" "));

        let output = self.wsl().args(args).output().map_err(|e| ProvisioningError::Command {
            program: self.command.clone(),
            reason: e.to_string(),
        })?;

        if output.status.success() {
            Ok(output)
        } else {
            let stderr = decode_wsl_output(&output.stderr);
            Err(ProvisioningError::Command {
                program: format!("{} {}", self.command, args.join(" ")),
                reason: format!("exit status {}: {}", output.status, stderr.trim()),
            })
        }
    }

    /// Runs a provisioning step, logging failures as errors.
    fn run(&self, args: &[&str]) -> Result<Output, ProvisioningError> {
        self.output(args).map_err(|e| {
            error!("{}", e);
            e
        })
    }

    /// Runs a read-only check; failure only means "no".
    fn check(&self, args: &[&str]) -> bool {
        match self.output(args) {
            Ok(_) => true,
            Err(e) => {
                debug!("Check failed: {}", e);
                false
            }
        }
    }

    /// True when WSL is installed and answers.
    pub fn is_available(&self) -> bool {
        self.check(&["--status"])
    }

    /// True when the engine runs inside the distribution.
    pub fn has_engine(&self) -> bool {
        let check = format!("{} -version", self.engine_command);
        self.check(&["-d", &self.distribution, "-e", "bash", "-lc", &check])
    }

    /// Lists registered distribution names.
    ///
    /// WSL exits non-zero when no distribution is registered, so callers
    /// that only need to know about one name should treat an error as empty.
    pub fn distributions(&self) -> Result<Vec<String>, ProvisioningError> {
        let output = self.output(&["--list", "--quiet"])?;
        Ok(parse_distribution_list(&output.stdout))
    }

    /// Installs WSL without a default distribution.
    pub fn install(&self) -> Result<(), ProvisioningError> {
        info!("Installing WSL");
        self.run(&["--install", "--no-distribution"])?;
        Ok(())
    }

    /// Recreates the dedicated distribution with Java and the engine.
    pub fn provision_distribution(&self) -> Result<(), ProvisioningError> {
        let existing = self.distributions().unwrap_or_else(|e| {
            debug!("No distributions listed ({}); nothing to unregister", e);
            Vec::new()
        });
        if existing.iter().any(|name| name.eq_ignore_ascii_case(&self.distribution)) {
            info!("Removing existing WSL distribution '{}'", self.distribution);
            self.run(&["--unregister", &self.distribution])?;
        }

        info!(
            "Creating WSL distribution '{}' from {}",
            self.distribution, self.base_distribution
        );
        self.run(&[
            "--install",
            &self.base_distribution,
            "--name",
            &self.distribution,
            "--no-launch",
        ])?;

        let script = self.provision_script();
        self.run(&["-d", &self.distribution, "-u", "root", "-e", "bash", "-lc", &script])?;

        info!("WSL distribution '{}' is ready", self.distribution);
        Ok(())
    }

    /// Shell script installing Java and the engine as root.
    pub fn provision_script(&self) -> String {
        let target = format!("/usr/local/bin/{}", self.engine_command);
        [
            "set -e".to_string(),
            "export DEBIAN_FRONTEND=noninteractive".to_string(),
            "apt-get update".to_string(),
            format!("apt-get install -y {} curl", self.java_package),
            format!("curl -fsSL {} -o {}.part", self.engine_url, target),
            format!("chmod 755 {}.part", target),
            format!("mv {}.part {}", target, target),
            format!("{} -version", target),
        ]
        .join(" && ")
    }
}

/// Decodes WSL console output, which is UTF-16LE on most Windows builds.
fn decode_wsl_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace('\0', "")
}

/// Parses `wsl --list --quiet` output into distribution names.
fn parse_distribution_list(stdout: &[u8]) -> Vec<String> {
    decode_wsl_output(stdout)
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge_with_command(command: &str) -> WslBridge {
        let settings = BridgeSettings {
            command: command.to_string(),
            ..BridgeSettings::default()
        };
        WslBridge::new(&settings, "nextflow", "https://get.nextflow.io")
    }

    #[test]
    fn test_parse_distribution_list_utf8() {
        let names = parse_distribution_list(b"Ubuntu\r\nglacier\r\n\r\n");
        assert_eq!(names, vec!["Ubuntu", "glacier"]);
    }

    #[test]
    fn test_parse_distribution_list_utf16() {
        let utf16: Vec<u8> = "Ubuntu\r\nglacier\r\n"
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        assert_eq!(parse_distribution_list(&utf16), vec!["Ubuntu", "glacier"]);
    }

    #[test]
    fn test_provision_script() {
        let script = bridge_with_command("wsl.exe").provision_script();

        assert!(script.starts_with("set -e && "));
        assert!(script.contains("apt-get install -y openjdk-21-jre-headless curl"));
        assert!(script.contains("curl -fsSL https://get.nextflow.io -o /usr/local/bin/nextflow.part"));
        assert!(script.contains("mv /usr/local/bin/nextflow.part /usr/local/bin/nextflow"));
        assert!(script.ends_with("/usr/local/bin/nextflow -version"));
    }

    #[test]
    fn test_missing_bridge() {
        let bridge = bridge_with_command("glacier-test-no-such-wsl");

        assert!(!bridge.is_available());
        assert!(!bridge.has_engine());
        assert!(matches!(
            bridge.provision_distribution(),
            Err(ProvisioningError::Command { .. })
        ));
        assert!(matches!(bridge.install(), Err(ProvisioningError::Command { .. })));
    }

    /// Writes a stand-in for `wsl.exe` that records its arguments, one
    /// invocation per line, and lists `registered` as installed distributions.
    #[cfg(unix)]
    fn scripted_bridge(dir: &std::path::Path, registered: Option<&str>) -> (WslBridge, std::path::PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let calls = dir.join("calls.txt");
        let list = match registered {
            Some(name) => format!("printf '%s\\r\\n' '{}'; exit 0", name),
            None => "echo 'no installed distributions' >&2; exit 1".to_string(),
        };
        let script = dir.join("fake-wsl");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$*\" >> {}\ncase \"$1\" in --list) {} ;; esac\nexit 0\n",
                calls.display(),
                list
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        (bridge_with_command(script.to_str().unwrap()), calls)
    }

    #[cfg(unix)]
    #[test]
    fn test_provision_on_fresh_wsl() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (bridge, calls) = scripted_bridge(temp_dir.path(), None);

        bridge.provision_distribution().unwrap();

        let calls = std::fs::read_to_string(calls).unwrap();
        assert!(!calls.contains("--unregister"));
        assert!(calls.contains("--install Ubuntu-24.04 --name glacier --no-launch"));
        assert!(calls.contains("-d glacier -u root -e bash -lc set -e"));
    }

    #[cfg(unix)]
    #[test]
    fn test_provision_replaces_existing_distribution() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (bridge, calls) = scripted_bridge(temp_dir.path(), Some("glacier"));

        bridge.provision_distribution().unwrap();

        let calls = std::fs::read_to_string(calls).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines[0], "--list --quiet");
        assert_eq!(lines[1], "--unregister glacier");
        assert!(lines[2].starts_with("--install Ubuntu-24.04"));
        assert_eq!(lines.len(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_bridge_reports_exit_status() {
        let bridge = bridge_with_command("false");
        let err = bridge.install().unwrap_err();
        assert!(err.to_string().contains("--install --no-distribution"));
    }
}
