use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::EngineConfig;
use crate::error::{AttachError, CommandError, LaunchError, PauseError, Result};
use crate::event::{EngineEvent, PauseReport};
use crate::facade::{Breakpoint, Frame, MemoryBlock, RegisterSnapshot};
use crate::hub::{SessionHub, SessionState};
use crate::interrupt::InterruptStrategy;
use crate::launcher::{self, HostHandle};
use crate::locator::{DebuggerBinary, locate_debugger};
use crate::registry::{ProcessRegistry, SystemRegistry};
use crate::session::{MiSession, SessionOptions};
use crate::sync::lock;

/// Result of a launch that started the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The target runs with a debugger attached.
    Debugging {
        /// PID of the target.
        pid: u32,

        /// Debugger attached to the target.
        debugger: DebuggerBinary,
    },

    /// The target runs, but cannot be debugged.
    DebuggingUnavailable {
        /// PID of the target, if it was resolved.
        pid: Option<u32>,

        /// Why debugging is unavailable.
        reason: UnavailableReason,
    },
}

/// Why a launched target cannot be debugged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// No new process of the watched executable appeared.
    PidUnresolved,

    /// No debugger binary could be found.
    NoDebugger,

    /// The debugger could not be started.
    DebuggerSpawn(String),

    /// The debugger failed to attach.
    AttachFailed(String),

    /// The debugger was denied access to the target.
    AccessDenied(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PidUnresolved => f.write_str("the target process could not be identified"),
            Self::NoDebugger => f.write_str("no debugger found"),
            Self::DebuggerSpawn(message) => write!(f, "failed to start the debugger: {message}"),
            Self::AttachFailed(message) => write!(f, "failed to attach: {message}"),
            Self::AccessDenied(message) => write!(f, "access denied: {message}"),
        }
    }
}

struct ActiveTarget {
    generation: u64,
    pid: Option<u32>,
    session: Option<Arc<MiSession>>,
    host: HostHandle,
    supervisor: Option<JoinHandle<()>>,
}

struct EngineInner {
    config: EngineConfig,
    registry: Arc<dyn ProcessRegistry>,
    hub: Arc<SessionHub>,
    strategies: Vec<InterruptStrategy>,
    active: Mutex<Option<ActiveTarget>>,
    generation: AtomicU64,
}

impl EngineInner {
    /// Ends the active target.
    ///
    /// With a generation, only ends the target of that generation. Returns
    /// the ended target.
    fn finish(&self, generation: Option<u64>) -> Option<ActiveTarget> {
        let mut active = {
            let mut active = lock(&self.active);
            let current = active.as_ref()?.generation;

            if generation.is_some_and(|generation| generation != current) {
                return None;
            }

            active.take()?
        };

        if let Some(session) = &active.session {
            session.teardown();
        }

        if let Some(supervisor) = active.supervisor.take() {
            supervisor.abort();
        }

        self.hub.set_state(SessionState::Stopped);

        Some(active)
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let active = lock(&self.active).take();

        if let Some(mut active) = active {
            if let Some(session) = &active.session {
                session.teardown();
            }

            if let Some(supervisor) = active.supervisor.take() {
                supervisor.abort();
            }
        }
    }
}

/// Debug engine driving a single target at a time.
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("target_pid", &self.target_pid())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine using the operating system process table.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, Arc::new(SystemRegistry))
    }

    /// Creates an engine using the given process registry.
    pub fn with_registry(config: EngineConfig, registry: Arc<dyn ProcessRegistry>) -> Self {
        let strategies = InterruptStrategy::defaults(config.interrupt_helper.clone());

        Self {
            inner: Arc::new(EngineInner {
                config,
                registry,
                hub: Arc::new(SessionHub::new()),
                strategies,
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the configuration of this engine.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Subscribes to the events of this engine.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.hub.subscribe()
    }

    /// Returns the events of this engine as a stream.
    ///
    /// Events missed by a slow consumer are reported as stream errors.
    pub fn events(&self) -> BroadcastStream<EngineEvent> {
        BroadcastStream::new(self.subscribe())
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        self.inner.hub.state()
    }

    /// Returns the PID of the running target, if resolved.
    pub fn target_pid(&self) -> Option<u32> {
        lock(&self.inner.active).as_ref().and_then(|active| active.pid)
    }

    fn session(&self) -> Result<Arc<MiSession>> {
        lock(&self.inner.active)
            .as_ref()
            .and_then(|active| active.session.clone())
            .ok_or(CommandError::NoSession)
    }

    /// Launches a target through the configured host and attaches to it.
    ///
    /// Failing to debug a started target is not an error: the outcome is
    /// then [LaunchOutcome::DebuggingUnavailable] and the target keeps
    /// running.
    #[tracing::instrument(skip_all, fields(target = %target.as_ref().display()))]
    pub async fn launch(&self, target: impl AsRef<Path>) -> Result<LaunchOutcome, LaunchError> {
        let target = target.as_ref();
        let inner = &self.inner;
        let config = &inner.config;

        let host = config.host.clone().ok_or(LaunchError::HostNotConfigured)?;

        if !host.exists() {
            return Err(LaunchError::HostNotFound(host));
        }

        if lock(&inner.active).is_some() {
            return Err(LaunchError::AlreadyActive);
        }

        if !target.exists() {
            return Err(LaunchError::TargetNotFound(target.to_path_buf()));
        }

        if !inner.hub.begin_launch() {
            return Err(LaunchError::AlreadyActive);
        }

        inner.hub.log(format!("launching {}", target.display()));

        let launched =
            match launcher::launch_host(config, &host, target, &inner.registry, &inner.hub).await {
                Ok(launched) => launched,
                Err(error) => {
                    inner.hub.set_state(SessionState::Stopped);
                    return Err(error);
                }
            };

        let Some(pid) = launched.pid else {
            inner
                .hub
                .log("could not identify the target process, running without debugger");

            self.activate(None, None, launched.host);

            return Ok(LaunchOutcome::DebuggingUnavailable {
                pid: None,
                reason: UnavailableReason::PidUnresolved,
            });
        };

        inner.hub.log(format!("target process is {pid}"));

        match self.attach(pid).await {
            Ok((session, debugger)) => {
                self.activate(Some(pid), Some(session), launched.host);
                Ok(LaunchOutcome::Debugging { pid, debugger })
            }
            Err(reason) => {
                inner.hub.log(format!("running without debugger: {reason}"));
                self.activate(Some(pid), None, launched.host);

                Ok(LaunchOutcome::DebuggingUnavailable {
                    pid: Some(pid),
                    reason,
                })
            }
        }
    }

    async fn attach(
        &self,
        pid: u32,
    ) -> Result<(Arc<MiSession>, DebuggerBinary), UnavailableReason> {
        let config = &self.inner.config;

        let debugger = locate_debugger(&config.debugger_candidates, config.timings.probe_timeout)
            .await
            .ok_or(UnavailableReason::NoDebugger)?;

        self.inner.hub.log(format!(
            "using debugger {} ({})",
            debugger.path.display(),
            debugger.version
        ));

        let session = debugger
            .spawn(&config.debugger_args)
            .and_then(|child| {
                MiSession::from_child(
                    child,
                    Arc::clone(&self.inner.hub),
                    SessionOptions::from(&config.timings),
                )
            })
            .map_err(|e| UnavailableReason::DebuggerSpawn(e.to_string()))?;

        session.configure_signals(&config.pass_signals).await;

        match session.attach(pid).await {
            Ok(()) => Ok((session, debugger)),
            Err(error) => {
                session.close();

                Err(match error {
                    AttachError::AccessDenied(message) => UnavailableReason::AccessDenied(message),
                    AttachError::Failed(message) => UnavailableReason::AttachFailed(message),
                    AttachError::Command(error) => UnavailableReason::AttachFailed(error.to_string()),
                })
            }
        }
    }

    /// Records the launched target and supervises its end.
    fn activate(&self, pid: Option<u32>, session: Option<Arc<MiSession>>, host: HostHandle) {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let mut exit = host.exit_watch();
        let closed = session.as_ref().map(|session| session.closed());
        let engine = Arc::downgrade(&self.inner);

        // the lock is held until the target is recorded so that the
        // supervisor cannot observe a missing target
        let mut active = lock(&self.inner.active);

        let supervisor = tokio::spawn(async move {
            let host_exit = async move {
                let _ = exit.wait_for(Option::is_some).await;
            };

            let session_end = async move {
                match closed {
                    Some(closed) => closed.await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = host_exit => tracing::info!("host exited, ending session"),
                () = session_end => tracing::info!("debugger session ended"),
            }

            if let Some(engine) = Weak::upgrade(&engine) {
                engine.finish(Some(generation));
            }
        });

        *active = Some(ActiveTarget {
            generation,
            pid,
            session,
            host,
            supervisor: Some(supervisor),
        });

        drop(active);

        self.inner.hub.set_state_unless_stopped(SessionState::Running);
    }

    /// Interrupts the target and returns where it stopped.
    pub async fn pause(&self) -> Result<PauseReport, PauseError> {
        let (pid, session) = match lock(&self.inner.active).as_ref() {
            Some(active) => (active.pid, active.session.clone()),
            None => (None, None),
        };

        if pid.is_none() {
            return Err(PauseError::NoTarget);
        }

        let session = session.ok_or(PauseError::DebuggingUnavailable)?;

        session
            .interrupt(&self.inner.strategies, self.inner.config.timings.helper_timeout)
            .await
    }

    /// Resumes the target.
    pub async fn resume(&self) -> Result<()> {
        self.session()?.resume().await
    }

    /// Executes one instruction, entering calls.
    pub async fn step(&self) -> Result<PauseReport> {
        self.session()?.step().await
    }

    /// Executes one instruction, stepping over calls.
    pub async fn step_over(&self) -> Result<PauseReport> {
        self.session()?.step_over().await
    }

    /// Sets a breakpoint at an address, a symbol or a `file:line`.
    pub async fn set_breakpoint(&self, location: &str) -> Result<Breakpoint> {
        self.session()?.insert_breakpoint(location).await
    }

    /// Removes a breakpoint by number.
    pub async fn remove_breakpoint(&self, id: &str) -> Result<()> {
        self.session()?.delete_breakpoint(id).await
    }

    /// Lists the breakpoints, refreshed from the debugger.
    pub async fn list_breakpoints(&self) -> Result<Vec<Breakpoint>> {
        self.session()?.refresh_breakpoints().await
    }

    /// Reads target memory.
    pub async fn read_memory(&self, address: &str, size: usize) -> Result<MemoryBlock> {
        self.session()?.read_memory(address, size).await
    }

    /// Writes hexadecimal bytes to target memory.
    pub async fn write_memory(&self, address: &str, data: &str) -> Result<()> {
        self.session()?.write_memory(address, data).await
    }

    /// Lists the frames of the current thread.
    pub async fn backtrace(&self) -> Result<Vec<Frame>> {
        self.session()?.backtrace().await
    }

    /// Fetches the register values of the target.
    pub async fn registers(&self) -> Result<RegisterSnapshot> {
        self.session()?.fetch_registers().await
    }

    /// Stops debugging and kills the host and the target.
    ///
    /// Does nothing when no target is running.
    pub async fn stop(&self) {
        let Some(mut active) = self.inner.finish(None) else {
            return;
        };

        active.host.kill();

        if let Some(pid) = active.pid {
            let registry = Arc::clone(&self.inner.registry);

            let killed = tokio::task::spawn_blocking(move || registry.kill(pid))
                .await
                .unwrap_or(false);

            tracing::debug!(pid, killed, "target killed");
        }

        self.inner.hub.log("target stopped");
    }
}
