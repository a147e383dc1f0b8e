use std::collections::HashSet;

use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System, UpdateKind};

/// Source of running process identifiers.
pub trait ProcessRegistry: Send + Sync {
    /// Returns the PIDs of the processes running the given executable.
    ///
    /// Enumeration failures yield an empty set.
    fn pids_by_name(&self, executable_name: &str) -> HashSet<u32>;

    /// Kills a process, returning whether it was found.
    fn kill(&self, pid: u32) -> bool {
        let _ = pid;
        false
    }
}

/// [ProcessRegistry] backed by the operating system process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRegistry;

impl SystemRegistry {
    fn snapshot() -> System {
        System::new_with_specifics(RefreshKind::new().with_processes(
            ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
        ))
    }
}

fn name_matches(candidate: &str, wanted: &str) -> bool {
    if candidate == wanted {
        return true;
    }

    if cfg!(windows) {
        let strip = |name: &str| {
            let lower = name.to_ascii_lowercase();
            lower.strip_suffix(".exe").map(str::to_owned).unwrap_or(lower)
        };

        return strip(candidate) == strip(wanted);
    }

    false
}

impl ProcessRegistry for SystemRegistry {
    fn pids_by_name(&self, executable_name: &str) -> HashSet<u32> {
        let system = Self::snapshot();

        system
            .processes()
            .iter()
            .filter(|(_, process)| {
                // process names may be truncated, the executable path is not
                name_matches(process.name(), executable_name)
                    || process
                        .exe()
                        .and_then(|exe| exe.file_name())
                        .is_some_and(|name| name_matches(&name.to_string_lossy(), executable_name))
            })
            .map(|(pid, _)| pid.as_u32())
            .collect()
    }

    fn kill(&self, pid: u32) -> bool {
        let mut system = System::new();
        let pid = Pid::from_u32(pid);

        system.refresh_process(pid) && system.process(pid).is_some_and(|process| process.kill())
    }
}

/// Picks the new process among two snapshots of the same executable.
///
/// When several processes appeared, the smallest PID wins.
pub(crate) fn pid_delta(before: &HashSet<u32>, after: &HashSet<u32>) -> Option<u32> {
    after.difference(before).copied().min()
}
