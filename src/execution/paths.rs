//! Host-to-Runtime Path Translation
//!
//! On direct hosts the engine sees the same paths as the orchestrator. On
//! bridged hosts the engine runs inside WSL, where `C:\Users\a` is reachable
//! as `/mnt/c/Users/a`; every path handed to the engine must be rewritten.

use std::path::Path;

use serde_json::Value;

use crate::settings::HostKind;

/// Converts host paths into the syntax the engine runtime expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathTranslator {
    /// Paths pass through unchanged.
    Native,
    /// Separators become `/` and drive letters map below `mount_root`.
    Bridged { mount_root: String },
}

impl PathTranslator {
    /// Selects the translator for a host kind.
    pub fn for_host(host: HostKind, mount_root: &str) -> Self {
        match host {
            HostKind::Direct => Self::Native,
            HostKind::Bridged => Self::Bridged {
                mount_root: mount_root.trim_end_matches('/').to_string(),
            },
        }
    }

    /// True when parameter values must be rewritten before launch.
    pub fn translates(&self) -> bool {
        matches!(self, Self::Bridged { .. })
    }

    /// Translates a host path string into runtime syntax.
    ///
    /// Idempotent: translating an already-translated path is a no-op.
    ///
    /// ```
    /// use glacier::execution::paths::PathTranslator;
    ///
    /// let wsl = PathTranslator::Bridged { mount_root: "/mnt".to_string() };
    /// assert_eq!(wsl.to_runtime_path("C:\\Users\\a\\f.txt"), "/mnt/c/Users/a/f.txt");
    /// ```
    pub fn to_runtime_path(&self, host_path: &str) -> String {
        match self {
            Self::Native => host_path.to_string(),
            Self::Bridged { mount_root } => {
                let posix = host_path.replace('\\', "/");
                match split_drive(&posix) {
                    Some((drive, rest)) => {
                        format!("{}/{}{}", mount_root, drive.to_ascii_lowercase(), rest)
                    }
                    None => posix,
                }
            }
        }
    }

    /// Translates a host [`Path`].
    pub fn translate(&self, host_path: &Path) -> String {
        self.to_runtime_path(&host_path.to_string_lossy())
    }

    /// Joins `name` onto `base` on the host, then translates the result.
    pub fn resolve_runtime_path(&self, base: &Path, name: &str) -> String {
        self.translate(&base.join(name))
    }

    /// Rewrites every path-like string in a parameter tree.
    ///
    /// Objects and arrays are walked recursively; numbers, booleans, null
    /// and non-path strings are returned unchanged.
    pub fn translate_params_if_path_like(&self, value: Value) -> Value {
        match value {
            Value::String(s) if looks_like_path(&s) => Value::String(self.to_runtime_path(&s)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.translate_params_if_path_like(item))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, item)| (key, self.translate_params_if_path_like(item)))
                    .collect(),
            ),
            other => other,
        }
    }
}

/// Splits `X:rest` into the drive letter and the remainder.
fn split_drive(path: &str) -> Option<(char, &str)> {
    let mut chars = path.chars();
    let drive = chars.next().filter(char::is_ascii_alphabetic)?;
    if chars.next() != Some(':') {
        return None;
    }
    Some((drive, &path[2..]))
}

/// Heuristic for strings that name filesystem paths.
///
/// Anything containing a separator counts, as does a drive-absolute
/// Windows path. False positives (e.g. `"a/b testing"`) are accepted; a
/// missed real path would break the run inside the bridge.
pub fn looks_like_path(s: &str) -> bool {
    let drive_absolute = matches!(
        s.as_bytes(),
        [letter, b':', b'\\', ..] if letter.is_ascii_alphabetic()
    );
    drive_absolute || s.contains('/') || s.contains('\\')
}
