use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;

use tokio::io::AsyncRead;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;

use crate::config::EngineConfig;
use crate::error::LaunchError;
use crate::event::OutputStream;
use crate::hub::SessionHub;
use crate::registry::{ProcessRegistry, pid_delta};
use crate::session::LineDecoder;
use crate::sync::lock;

const CAPTURED_LINES: usize = 200;

/// Maximum wait for the output of a host that exited right away.
const OUTPUT_FLUSH_DELAY: Duration = Duration::from_millis(250);

/// Exit of the host process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostExit {
    /// Exit code, if the host was not killed by a signal.
    pub code: Option<i32>,
}

/// Handle on the spawned host process.
///
/// Dropping the handle leaves the host running.
#[derive(Debug)]
pub struct HostHandle {
    exit: watch::Receiver<Option<HostExit>>,
    output: Arc<Mutex<Vec<String>>>,
    relays: Vec<JoinHandle<()>>,
    kill: Option<oneshot::Sender<()>>,
}

impl HostHandle {
    /// Returns the exit of the host, if it already exited.
    pub fn exited(&self) -> Option<HostExit> {
        *self.exit.borrow()
    }

    /// Returns a receiver notified when the host exits.
    pub fn exit_watch(&self) -> watch::Receiver<Option<HostExit>> {
        self.exit.clone()
    }

    /// Returns the output lines captured so far.
    pub fn output(&self) -> Vec<String> {
        lock(&self.output).clone()
    }

    /// Kills the host.
    pub fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }

    async fn flush_output(&mut self) {
        let relays = std::mem::take(&mut self.relays);

        let _ = tokio::time::timeout(OUTPUT_FLUSH_DELAY, async {
            for relay in relays {
                let _ = relay.await;
            }
        })
        .await;
    }
}

/// Host spawned, with the PID of the target it started.
#[derive(Debug)]
pub struct Launched {
    pub host: HostHandle,
    pub pid: Option<u32>,
}

async fn snapshot(registry: &Arc<dyn ProcessRegistry>, name: &str) -> HashSet<u32> {
    let registry = Arc::clone(registry);
    let name = name.to_owned();

    tokio::task::spawn_blocking(move || registry.pids_by_name(&name))
        .await
        .unwrap_or_default()
}

fn relay_lines<R>(
    reader: R,
    stream: OutputStream,
    hub: Arc<SessionHub>,
    output: Arc<Mutex<Vec<String>>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = FramedRead::new(reader, LineDecoder::default());

        while let Some(Ok(line)) = lines.next().await {
            {
                let mut output = lock(&output);

                if output.len() == CAPTURED_LINES {
                    output.remove(0);
                }

                output.push(line.clone());
            }

            hub.output(stream, line);
        }
    })
}

/// Spawns the host and resolves the PID of the target it started.
///
/// The target PID is the smallest PID running the watched executable that
/// appeared between before the spawn and after the settle delay.
#[tracing::instrument(skip_all, fields(host = %host.display(), target = %target.display()))]
pub async fn launch_host(
    config: &EngineConfig,
    host: &Path,
    target: &Path,
    registry: &Arc<dyn ProcessRegistry>,
    hub: &Arc<SessionHub>,
) -> Result<Launched, LaunchError> {
    let process_name = config.watched_process_name().unwrap_or_default();

    let before = snapshot(registry, &process_name).await;

    let mut command = config.host_command(host, target);

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    command.process_group(0);

    #[cfg(windows)]
    command.creation_flags(0x0000_0200); // CREATE_NEW_PROCESS_GROUP

    let mut child = command.spawn().map_err(LaunchError::Spawn)?;

    tracing::info!(pid = ?child.id(), "host spawned");

    let output = Arc::new(Mutex::new(Vec::new()));
    let mut relays = Vec::with_capacity(2);

    if let Some(stdout) = child.stdout.take() {
        relays.push(relay_lines(
            stdout,
            OutputStream::HostStdout,
            Arc::clone(hub),
            Arc::clone(&output),
        ));
    }

    if let Some(stderr) = child.stderr.take() {
        relays.push(relay_lines(
            stderr,
            OutputStream::HostStderr,
            Arc::clone(hub),
            Arc::clone(&output),
        ));
    }

    let (exit_tx, exit_rx) = watch::channel(None);
    let (kill_tx, kill_rx) = oneshot::channel();

    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            Ok(()) = kill_rx => {
                if let Err(error) = child.start_kill() {
                    tracing::debug!(%error, "host already gone");
                }

                child.wait().await
            }
        };

        let code = match status {
            Ok(status) => status.code(),
            Err(error) => {
                tracing::warn!(%error, "failed to wait for host");
                None
            }
        };

        tracing::info!(?code, "host exited");
        let _ = exit_tx.send(Some(HostExit { code }));
    });

    let mut handle = HostHandle {
        exit: exit_rx,
        output,
        relays,
        kill: Some(kill_tx),
    };

    tokio::time::sleep(config.timings.settle_delay).await;

    if let Some(exit) = handle.exited() {
        handle.flush_output().await;

        return Err(LaunchError::ImmediateExit {
            code: exit.code,
            output: handle.output(),
        });
    }

    let after = snapshot(registry, &process_name).await;
    let pid = pid_delta(&before, &after);

    tracing::info!(?pid, %process_name, "target process resolved");

    Ok(Launched { host: handle, pid })
}
