use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

/// Debugger binary found on the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerBinary {
    /// Path (or name resolved through `PATH`) of the binary.
    pub path: PathBuf,

    /// First line printed by `--version`.
    pub version: String,
}

/// Returns the first candidate that runs `--version` successfully.
pub async fn locate_debugger(candidates: &[PathBuf], limit: Duration) -> Option<DebuggerBinary> {
    for candidate in candidates {
        match probe(candidate, limit).await {
            Some(version) => {
                tracing::debug!(path = %candidate.display(), version, "debugger found");

                return Some(DebuggerBinary {
                    path: candidate.clone(),
                    version,
                });
            }
            None => tracing::trace!(path = %candidate.display(), "debugger candidate rejected"),
        }
    }

    None
}

async fn probe(candidate: &Path, limit: Duration) -> Option<String> {
    let mut command = Command::new(candidate);

    command
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = tokio::time::timeout(limit, command.output()).await.ok()?.ok()?;

    output.status.success().then(|| {
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_owned()
    })
}

impl DebuggerBinary {
    /// Spawns the debugger with piped standard streams.
    pub(crate) fn spawn(&self, args: &[String]) -> std::io::Result<Child> {
        Command::new(&self.path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}
