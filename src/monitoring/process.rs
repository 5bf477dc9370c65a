//! Engine Process Liveness
//!
//! Launches return only a pid. Callers poll it here to notice when the
//! engine has exited.

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, System};

/// Returns true when `pid` names a live, non-zombie process.
pub fn is_process_running(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessRefreshKind::new());

    match system.process(pid) {
        Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_running() {
        assert!(is_process_running(std::process::id()));
    }

    #[test]
    fn test_unknown_pid_is_not_running() {
        // Above the default pid_max on Linux and macOS.
        assert!(!is_process_running(u32::MAX - 1));
    }

    #[cfg(unix)]
    #[test]
    fn test_exited_child_is_not_running() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_process_running(pid));
    }
}
