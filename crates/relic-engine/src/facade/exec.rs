use crate::error::{CommandError, Result};
use crate::event::PauseReport;
use crate::hub::SessionState;
use crate::session::MiSession;

impl MiSession {
    /// Resumes the target.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self) -> Result<()> {
        self.command("-exec-continue").await?;
        self.hub().set_state_unless_stopped(SessionState::Running);

        Ok(())
    }

    /// Executes one machine instruction, entering calls.
    pub async fn step(&self) -> Result<PauseReport> {
        self.step_with("-exec-step-instruction").await
    }

    /// Executes one machine instruction, stepping over calls.
    pub async fn step_over(&self) -> Result<PauseReport> {
        self.step_with("-exec-next-instruction").await
    }

    #[tracing::instrument(skip(self))]
    async fn step_with(&self, command: &str) -> Result<PauseReport> {
        let state = self.hub().state();

        if state != SessionState::Paused {
            return Err(CommandError::NotPaused(state));
        }

        let waiter = self.stop_waiter()?;
        self.send_no_wait(command).await?;

        let stop = self.wait_for_stop(waiter, self.options().stop_timeout).await?;
        self.hub().set_state_unless_stopped(SessionState::Paused);

        self.report_pause(stop).await
    }
}
