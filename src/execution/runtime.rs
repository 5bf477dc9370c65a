//! Engine Runtime Location
//!
//! Resolves what to execute when launching the engine on a direct host.
//!
//! # Resolution Priority
//!
//! 1. Bundled build: `{resource_root}/jre/bin/java -jar {resource_root}/nextflow.jar`
//! 2. Managed install: `{collections_path}/bin/nextflow`
//! 3. System PATH: the bare `nextflow` command

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

use crate::error::LaunchError;
use crate::settings::{Packaging, Settings};

/// JVM flags used when running the bundled engine jar.
pub const JAVA_FLAGS: &[&str] = &[
    "-Dfile.encoding=UTF-8",
    "-Dcapsule.trampoline",
    "-Dcom.sun.security.enableAIAcaIssuers=true",
    "-Djava.awt.headless=true",
    "-XX:+TieredCompilation",
    "-XX:TieredStopAtLevel=1",
    "--add-opens=java.base/java.lang=ALL-UNNAMED",
    "--add-opens=java.base/java.io=ALL-UNNAMED",
    "--enable-native-access=ALL-UNNAMED",
    "--sun-misc-unsafe-memory-access=allow",
];

/// Everything needed to invoke the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeHandle {
    /// A command name or executable path.
    Command { program: PathBuf },
    /// A bundled JRE running the engine jar with an environment overlay.
    Bundled {
        java: PathBuf,
        jar: PathBuf,
        env: Vec<(String, OsString)>,
    },
}

impl RuntimeHandle {
    /// Name used in logs and spawn errors.
    pub fn program(&self) -> &Path {
        match self {
            Self::Command { program } => program,
            Self::Bundled { java, .. } => java,
        }
    }

    /// Builds a command that runs the engine; engine arguments follow.
    pub fn command(&self) -> Command {
        match self {
            Self::Command { program } => Command::new(program),
            Self::Bundled { java, jar, env } => {
                let mut cmd = Command::new(java);
                cmd.args(JAVA_FLAGS).arg("-jar").arg(jar);
                cmd.envs(env.iter().map(|(k, v)| (k, v)));
                cmd
            }
        }
    }
}

/// Finds the engine to run, following the packaging in [`Settings`].
#[derive(Debug, Clone)]
pub struct RuntimeLocator {
    packaging: Packaging,
    managed_path: PathBuf,
    command: String,
}

impl RuntimeLocator {
    pub fn new(settings: &Settings) -> Self {
        Self {
            packaging: settings.packaging.clone(),
            managed_path: settings.managed_engine_path(),
            command: settings.engine_command.clone(),
        }
    }

    /// Resolves the runtime handle.
    ///
    /// A bundled build whose JRE or jar is missing is reported as
    /// [`LaunchError::RuntimeUnavailable`]. Bare commands are not checked
    /// here; a missing command surfaces when spawning.
    pub fn locate(&self) -> Result<RuntimeHandle, LaunchError> {
        match &self.packaging {
            Packaging::Bundled {
                resource_root,
                user_data_dir,
            } => bundled_handle(resource_root, user_data_dir),
            Packaging::Bare => {
                if self.managed_path.is_file() {
                    debug!("Using managed engine: {}", self.managed_path.display());
                    return Ok(RuntimeHandle::Command {
                        program: self.managed_path.clone(),
                    });
                }
                debug!("Using engine from PATH: {}", self.command);
                Ok(RuntimeHandle::Command {
                    program: PathBuf::from(&self.command),
                })
            }
        }
    }
}

fn bundled_handle(resource_root: &Path, user_data_dir: &Path) -> Result<RuntimeHandle, LaunchError> {
    let jre = resource_root.join("jre");
    let java_name = if cfg!(windows) { "java.exe" } else { "java" };
    let java = jre.join("bin").join(java_name);
    let jar = resource_root.join("nextflow.jar");

    for required in [&java, &jar] {
        if !required.is_file() {
            return Err(LaunchError::RuntimeUnavailable(format!(
                "bundled runtime file missing: {}",
                required.display()
            )));
        }
    }

    let nxf_home = user_data_dir.join("nextflow");
    if let Err(e) = fs::create_dir_all(&nxf_home) {
        warn!("Failed to create NXF_HOME {}: {}", nxf_home.display(), e);
    }

    info!("Using bundled engine: {}", jar.display());
    Ok(RuntimeHandle::Bundled {
        java,
        jar,
        env: vec![
            ("NXF_HOME".to_string(), nxf_home.into_os_string()),
            ("NXF_JAVA_HOME".to_string(), jre.into_os_string()),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn bare_settings(home: &Path) -> Settings {
        Settings::for_home(home)
    }

    #[test]
    fn test_bare_falls_back_to_command() {
        let temp_dir = tempdir().unwrap();
        let locator = RuntimeLocator::new(&bare_settings(temp_dir.path()));

        assert_eq!(
            locator.locate().unwrap(),
            RuntimeHandle::Command {
                program: PathBuf::from("nextflow")
            }
        );
    }

    #[test]
    fn test_bare_prefers_managed_install() {
        let temp_dir = tempdir().unwrap();
        let settings = bare_settings(temp_dir.path());
        let managed = settings.managed_engine_path();
        fs::create_dir_all(managed.parent().unwrap()).unwrap();
        fs::write(&managed, "#!/bin/sh\n").unwrap();

        let handle = RuntimeLocator::new(&settings).locate().unwrap();
        assert_eq!(handle, RuntimeHandle::Command { program: managed });
    }

    #[test]
    fn test_bundled_missing_runtime() {
        let temp_dir = tempdir().unwrap();
        let mut settings = bare_settings(temp_dir.path());
        settings.packaging = Packaging::Bundled {
            resource_root: temp_dir.path().join("bundle"),
            user_data_dir: temp_dir.path().join("userdata"),
        };

        let result = RuntimeLocator::new(&settings).locate();
        assert!(matches!(result, Err(LaunchError::RuntimeUnavailable(_))));
    }

    #[test]
    fn test_bundled_handle_and_env() {
        let temp_dir = tempdir().unwrap();
        let bundle = temp_dir.path().join("bundle");
        let java_name = if cfg!(windows) { "java.exe" } else { "java" };
        fs::create_dir_all(bundle.join("jre").join("bin")).unwrap();
        fs::write(bundle.join("jre").join("bin").join(java_name), "").unwrap();
        fs::write(bundle.join("nextflow.jar"), "").unwrap();

        let mut settings = bare_settings(temp_dir.path());
        settings.packaging = Packaging::Bundled {
            resource_root: bundle.clone(),
            user_data_dir: temp_dir.path().join("userdata"),
        };

        let handle = RuntimeLocator::new(&settings).locate().unwrap();
        let RuntimeHandle::Bundled { java, jar, env } = &handle else {
            panic!("expected bundled handle, got {:?}", handle);
        };
        assert_eq!(jar, &bundle.join("nextflow.jar"));
        assert!(java.ends_with(java_name));
        assert!(temp_dir.path().join("userdata").join("nextflow").is_dir());
        assert_eq!(env[0].0, "NXF_HOME");
        assert_eq!(env[1], ("NXF_JAVA_HOME".to_string(), bundle.join("jre").into_os_string()));

        let cmd = handle.command();
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args.len(), JAVA_FLAGS.len() + 2);
        assert_eq!(args[JAVA_FLAGS.len()], "-jar");
        assert_eq!(cmd.get_envs().count(), 2);
    }

    #[test]
    fn test_command_handle_has_no_args() {
        let handle = RuntimeHandle::Command {
            program: PathBuf::from("nextflow"),
        };
        assert_eq!(handle.command().get_args().count(), 0);
        assert_eq!(handle.program(), Path::new("nextflow"));
    }
}
