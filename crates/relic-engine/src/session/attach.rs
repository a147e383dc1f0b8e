use std::sync::atomic::Ordering;
use std::time::Duration;

use relic_mi::ResultClass;

use super::{MiSession, Reply, StopOutcome};
use crate::error::AttachError;
use crate::hub::SessionState;
use crate::sync::lock;

/// Diagnostic emitted when the debugger lacks the privileges of the target.
pub(crate) const ELEVATION_HINT: &str = "the debugger was denied access to the target; \
     the host runs with different privileges, start the engine with the same elevation as the host";

const ACCESS_DENIED_SIGNATURES: &[&str] = &[
    "access is denied",
    "operation not permitted",
    "permission denied",
    "error 5",
];

/// Maximum wait for the stop following a successful attach answer.
const ATTACH_STOP_GRACE: Duration = Duration::from_millis(500);

/// Returns whether a debugger or helper message reports a permission error.
pub(crate) fn is_access_denied(message: &str) -> bool {
    let message = message.to_ascii_lowercase();

    ACCESS_DENIED_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

impl MiSession {
    /// Makes the debugger pass the given signals to the target silently.
    ///
    /// Commands are not awaited.
    pub async fn configure_signals<S: AsRef<str>>(&self, signals: &[S]) {
        for signal in signals {
            let command = format!(
                "-interpreter-exec console \"handle {} nostop noprint pass\"",
                signal.as_ref()
            );

            if let Err(error) = self.send_no_wait(&command).await {
                tracing::warn!(%error, signal = signal.as_ref(), "failed to configure signal");
            }
        }
    }

    /// Attaches the debugger to a process and resumes it.
    ///
    /// On failure the session is closed, leaving the state untouched.
    #[tracing::instrument(skip(self))]
    pub async fn attach(&self, pid: u32) -> Result<(), AttachError> {
        let mut stop = self.stop_waiter()?;

        let reply = self
            .send_command_with_timeout(&format!("-target-attach {pid}"), self.options.attach_timeout)
            .await;

        let stopped = matches!(stop.try_recv(), Ok(StopOutcome::Stopped(_)));

        let outcome = match reply {
            Reply::Record(record) => match record.class {
                ResultClass::Done | ResultClass::Running => Ok(()),
                _ if stopped => Ok(()),
                ResultClass::Error => Err(record
                    .error_message()
                    .unwrap_or("unknown error")
                    .to_owned()),
                class => Err(format!("unexpected answer {class:?}")),
            },
            _ if stopped => Ok(()),
            Reply::Expired => Err("attach timed out".to_owned()),
            Reply::Closed => Err("debugger exited while attaching".to_owned()),
        };

        if let Err(message) = outcome {
            self.close();

            return Err(if is_access_denied(&message) {
                self.hub.log(ELEVATION_HINT);
                AttachError::AccessDenied(message)
            } else {
                self.hub.log(format!("failed to attach to process {pid}: {message}"));
                AttachError::Failed(message)
            });
        }

        // the stop of the attached target must not be mistaken for a pause
        if !stopped {
            let _ = tokio::time::timeout(ATTACH_STOP_GRACE, stop).await;
        }

        *lock(&self.target_pid) = Some(pid);
        self.attached.store(true, Ordering::SeqCst);

        self.send_no_wait("-exec-continue").await?;
        self.hub.set_state_unless_stopped(SessionState::Running);

        self.hub.log(format!("debugger attached to process {pid}"));

        Ok(())
    }
}
