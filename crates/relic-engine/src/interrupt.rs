use std::process::Stdio;
use std::time::Duration;

use crate::config::HelperCommand;
use crate::error::{CommandError, PauseError};
use crate::event::PauseReport;
use crate::hub::SessionState;
use crate::session::{ELEVATION_HINT, MiSession, StopInfo, StopReason, is_access_denied};

/// Way of forcing a running target to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptStrategy {
    /// Run an external helper that forces a debug break in the target.
    HelperScript(HelperCommand),

    /// Deliver `SIGINT` to the target.
    #[cfg(unix)]
    Signal,

    /// Ask the debugger with `-exec-interrupt`.
    Protocol,
}

impl InterruptStrategy {
    /// Returns the strategies to try, in order, given an optional helper.
    pub fn defaults(helper: Option<HelperCommand>) -> Vec<Self> {
        let mut strategies: Vec<_> = helper.into_iter().map(Self::HelperScript).collect();

        #[cfg(unix)]
        strategies.push(Self::Signal);

        strategies.push(Self::Protocol);
        strategies
    }

    /// Issues the interrupt, returning the failure message on error.
    async fn issue(
        &self,
        session: &MiSession,
        pid: u32,
        helper_timeout: Duration,
    ) -> Result<(), String> {
        match self {
            Self::HelperScript(helper) => run_helper(helper, pid, helper_timeout).await,
            #[cfg(unix)]
            Self::Signal => send_sigint(pid),
            Self::Protocol => session
                .send_no_wait("-exec-interrupt --all")
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
        }
    }
}

async fn run_helper(helper: &HelperCommand, pid: u32, limit: Duration) -> Result<(), String> {
    let mut command = helper.command(pid);

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(limit, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(error)) => return Err(format!("failed to run {}: {error}", helper.program)),
        Err(_) => return Err(format!("{} timed out", helper.program)),
    };

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let message = [stderr.trim(), stdout.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if message.is_empty() {
        Err(format!("{} failed ({})", helper.program, output.status))
    } else {
        Err(message)
    }
}

#[cfg(unix)]
fn send_sigint(pid: u32) -> Result<(), String> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).map_err(|_| format!("invalid pid {pid}"))?;

    kill(Pid::from_raw(pid), Signal::SIGINT).map_err(|errno| errno.desc().to_owned())
}

impl MiSession {
    /// Interrupts the target and waits for it to stop.
    ///
    /// Strategies are tried in order until one is issued successfully.
    #[tracing::instrument(skip(self, strategies))]
    pub async fn interrupt(
        &self,
        strategies: &[InterruptStrategy],
        helper_timeout: Duration,
    ) -> Result<PauseReport, PauseError> {
        let Some(pid) = self.target_pid() else {
            return Err(PauseError::NoTarget);
        };

        if self.hub().state() == SessionState::Paused {
            let stop = StopInfo {
                reason: StopReason::Other("already-paused".to_owned()),
                address: String::new(),
                function: String::new(),
                signal_name: String::new(),
                breakpoint_id: None,
                thread_id: None,
                exit_code: None,
            };

            return Ok(self.report_pause(stop).await?);
        }

        let waiter = self.stop_waiter()?;
        let mut failures = Vec::new();

        for strategy in strategies {
            match strategy.issue(self, pid, helper_timeout).await {
                Ok(()) => {
                    tracing::debug!(?strategy, "interrupt issued");
                    failures.clear();
                    break;
                }
                Err(message) => {
                    if is_access_denied(&message) {
                        self.hub().log(ELEVATION_HINT);
                    }

                    tracing::warn!(?strategy, reason = %message, "interrupt strategy failed");
                    failures.push(message);
                }
            }
        }

        if !failures.is_empty() || strategies.is_empty() {
            return Err(PauseError::Interrupt(failures.join("; ")));
        }

        let stop = match self.wait_for_stop(waiter, self.options().stop_timeout).await {
            Ok(stop) => stop,
            Err(CommandError::Timeout) => return Err(PauseError::Timeout),
            Err(error) => return Err(error.into()),
        };

        self.hub().set_state_unless_stopped(SessionState::Paused);

        Ok(self.report_pause(stop).await?)
    }
}
