//! Token-correlated session with a debugger speaking GDB/MI.

mod attach;
mod codec;
mod dispatch;
mod pending;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::StreamExt;

use indexmap::IndexMap;

use relic_mi::{AsyncKind, AsyncRecord, Record, StreamKind, Tuple};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::config::Timings;
use crate::error::{CommandError, Result};
use crate::event::{EngineEvent, OutputStream, PauseReport};
use crate::facade::{Breakpoint, RegisterSnapshot};
use crate::hub::{SessionHub, SessionState};
use crate::sync::lock;

pub(crate) use self::attach::{ELEVATION_HINT, is_access_denied};
pub(crate) use self::codec::LineDecoder;
pub(crate) use self::dispatch::{StopDispatcher, StopDisposition, StopOutcome};
pub use self::dispatch::{StopInfo, StopReason};
pub use self::pending::Reply;
use self::pending::PendingRequests;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Timeouts of a [MiSession].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Default reply window of a command.
    pub request_timeout: Duration,

    /// Reply window of the attach command.
    pub attach_timeout: Duration,

    /// Maximum wait for a stop after an interrupt or a step.
    pub stop_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&Timings::default())
    }
}

impl From<&Timings> for SessionOptions {
    fn from(timings: &Timings) -> Self {
        Self {
            request_timeout: timings.request_timeout,
            attach_timeout: timings.attach_timeout,
            stop_timeout: timings.stop_timeout,
        }
    }
}

/// Session with a debugger speaking GDB/MI.
///
/// Commands are prefixed with a unique token and their answers are matched
/// by token, so any number of commands may be in flight at once. A single
/// read task consumes the debugger output, completes pending commands,
/// dispatches stop notifications and relays text output as events.
pub struct MiSession {
    hub: Arc<SessionHub>,
    options: SessionOptions,
    writer: tokio::sync::Mutex<BoxedWriter>,
    next_token: AtomicU64,
    pending: PendingRequests,
    stops: StopDispatcher,
    shutdown: CancellationToken,
    torn_down: AtomicBool,
    attached: AtomicBool,
    child: Mutex<Option<Child>>,
    target_pid: Mutex<Option<u32>>,
    pub(crate) breakpoints: Mutex<IndexMap<String, Breakpoint>>,
    pub(crate) registers: Mutex<Option<RegisterSnapshot>>,
    pub(crate) register_names: Mutex<Option<Arc<Vec<String>>>>,
}

impl std::fmt::Debug for MiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiSession")
            .field("options", &self.options)
            .field("pending", &self.pending)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl MiSession {
    /// Starts a session over the given debugger streams.
    ///
    /// A stopped hub moves to [SessionState::Starting] until the session
    /// attaches or closes.
    ///
    /// Must be called from within a tokio runtime, as the read task is
    /// spawned right away.
    pub fn connect<R, W>(
        reader: R,
        writer: W,
        hub: Arc<SessionHub>,
        options: SessionOptions,
    ) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        if hub.state() == SessionState::Stopped {
            hub.set_state(SessionState::Starting);
        }

        let session = Arc::new(Self {
            hub,
            options,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            next_token: AtomicU64::new(1),
            pending: PendingRequests::default(),
            stops: StopDispatcher::default(),
            shutdown: CancellationToken::new(),
            torn_down: AtomicBool::new(false),
            attached: AtomicBool::new(false),
            child: Mutex::new(None),
            target_pid: Mutex::new(None),
            breakpoints: Mutex::new(IndexMap::new()),
            registers: Mutex::new(None),
            register_names: Mutex::new(None),
        });

        tokio::spawn(read_loop(
            Arc::downgrade(&session),
            reader,
            session.shutdown.clone(),
        ));

        session
    }

    /// Starts a session over the standard streams of a debugger process.
    ///
    /// The debugger standard error is relayed as log output, and the process
    /// is killed on teardown.
    pub(crate) fn from_child(
        mut child: Child,
        hub: Arc<SessionHub>,
        options: SessionOptions,
    ) -> std::io::Result<Arc<Self>> {
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(std::io::Error::other("debugger standard streams not piped"));
        };

        if let Some(stderr) = child.stderr.take() {
            let hub = Arc::clone(&hub);

            tokio::spawn(async move {
                let mut lines = FramedRead::new(stderr, LineDecoder::default());

                while let Some(Ok(line)) = lines.next().await {
                    hub.output(OutputStream::Log, line);
                }
            });
        }

        let session = Self::connect(stdout, stdin, hub, options);
        *lock(&session.child) = Some(child);

        Ok(session)
    }

    /// Returns the hub this session reports to.
    pub fn hub(&self) -> &Arc<SessionHub> {
        &self.hub
    }

    /// Returns the timeouts of this session.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Returns the PID the session is attached to.
    pub fn target_pid(&self) -> Option<u32> {
        *lock(&self.target_pid)
    }

    /// Returns whether the session was torn down.
    pub fn is_closed(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Returns a future completing once the session is torn down.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        self.shutdown.clone().cancelled_owned()
    }

    /// Returns the number of commands waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.pending.count()
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends a command and waits for its answer with the default window.
    pub async fn send_command(&self, command: &str) -> Reply {
        self.send_command_with_timeout(command, self.options.request_timeout)
            .await
    }

    /// Sends a command and waits for its answer.
    ///
    /// Resolves to [Reply::Expired] if no answer arrives within `window`; an
    /// answer arriving later is dropped.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn send_command_with_timeout(&self, command: &str, window: Duration) -> Reply {
        let token = self.next_token();

        let Some(mut rx) = self.pending.register(token) else {
            return Reply::Closed;
        };

        let _guard = self.pending.expire_on_drop(token);

        if let Err(error) = self.write_line(token, command).await {
            tracing::warn!(%error, token, "failed to send command");
            return Reply::Closed;
        }

        match tokio::time::timeout(window, &mut rx).await {
            Ok(reply) => reply.unwrap_or(Reply::Closed),
            Err(_) if self.pending.expire(token) => {
                tracing::warn!(token, command, "debugger did not answer in time");
                Reply::Expired
            }
            // the answer won the race against the deadline
            Err(_) => rx.await.unwrap_or(Reply::Closed),
        }
    }

    /// Sends a command without waiting for its answer.
    ///
    /// Returns the token of the command.
    pub async fn send_no_wait(&self, command: &str) -> Result<u64> {
        if self.is_closed() {
            return Err(CommandError::Closed);
        }

        let token = self.next_token();
        self.write_line(token, command).await?;

        Ok(token)
    }

    /// Sends a command and returns the payload of a successful answer.
    pub(crate) async fn command(&self, command: &str) -> Result<Tuple> {
        self.send_command(command).await.into_done()
    }

    async fn write_line(&self, token: u64, command: &str) -> std::io::Result<()> {
        let line = format!("{token}{command}\n");

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }

    /// Registers a waiter for the next stop of the target.
    pub(crate) fn stop_waiter(&self) -> Result<oneshot::Receiver<StopOutcome>> {
        self.stops.register().ok_or(CommandError::Closed)
    }

    /// Waits for the stop a waiter was registered for.
    pub(crate) async fn wait_for_stop(
        &self,
        waiter: oneshot::Receiver<StopOutcome>,
        window: Duration,
    ) -> Result<StopInfo> {
        match tokio::time::timeout(window, waiter).await {
            Ok(Ok(StopOutcome::Stopped(stop))) if stop.is_exit() => Err(CommandError::TargetExited),
            Ok(Ok(StopOutcome::Stopped(stop))) => Ok(stop),
            Ok(Ok(StopOutcome::Aborted) | Err(_)) => Err(CommandError::Closed),
            Err(_) => Err(CommandError::Timeout),
        }
    }

    /// Fetches registers and backtrace, then broadcasts a pause event.
    pub(crate) async fn report_pause(&self, stop: StopInfo) -> Result<PauseReport> {
        let registers = self.fetch_registers().await?;
        let backtrace = self.backtrace().await?;

        let report = PauseReport {
            stop,
            registers,
            backtrace,
        };

        self.hub.emit(EngineEvent::Paused(report.clone()));

        Ok(report)
    }

    fn handle_line(self: &Arc<Self>, line: &str) {
        match relic_mi::parse_record(line) {
            Ok(Record::Prompt) => {}
            Ok(Record::Result(record)) => {
                let token = record.token;

                if !token.is_some_and(|token| self.pending.complete(token, record)) {
                    tracing::debug!(?token, "dropping unmatched result");
                }
            }
            Ok(Record::Async(record)) => self.handle_async(record),
            Ok(Record::Stream(record)) => {
                let stream = match record.kind {
                    StreamKind::Console => OutputStream::Console,
                    StreamKind::Target => OutputStream::Target,
                    StreamKind::Log => OutputStream::Log,
                };

                self.hub.output(stream, record.text);
            }
            Err(error) => tracing::debug!(%error, line, "unrecognized debugger output"),
        }
    }

    fn handle_async(self: &Arc<Self>, record: AsyncRecord) {
        match (record.kind, record.class.as_str()) {
            (AsyncKind::Exec, "running") => {
                self.hub.set_state_unless_stopped(SessionState::Running);
            }
            (AsyncKind::Exec, "stopped") => self.on_stopped(&record.results),
            (AsyncKind::Notify, "breakpoint-modified") => {
                self.on_breakpoint_modified(&record.results);
            }
            (AsyncKind::Notify, "breakpoint-deleted") => {
                self.on_breakpoint_deleted(&record.results);
            }
            (kind, class) => tracing::debug!(?kind, class, "debugger notification"),
        }
    }

    fn on_stopped(self: &Arc<Self>, results: &Tuple) {
        let prior = self.hub.state();
        let stop = StopInfo::from_results(results);

        tracing::debug!(reason = ?stop.reason, address = %stop.address, %prior, "target stopped");

        match self.stops.dispatch(&stop, prior) {
            StopDisposition::Unsolicited => {
                self.hub.set_state_unless_stopped(SessionState::Paused);

                let session = Arc::clone(self);

                tokio::spawn(async move {
                    if let Err(error) = session.report_pause(stop).await {
                        tracing::warn!(%error, "failed to inspect paused target");
                    }
                });
            }
            StopDisposition::Exited => {
                match stop.exit_code {
                    Some(code) => self.hub.log(format!("target exited with code {code}")),
                    None => self.hub.log("target exited"),
                }

                self.teardown();
            }
            StopDisposition::Solicited | StopDisposition::Ignored => {}
        }
    }

    /// Tears the session down and moves to [SessionState::Stopped].
    ///
    /// Pending commands resolve as [Reply::Closed], stop waiters are
    /// aborted, cached target state is cleared and the debugger process is
    /// killed. Calling it again has no effect.
    pub fn teardown(&self) {
        if self.close() {
            self.hub.set_state(SessionState::Stopped);
        }
    }

    /// Handles the end of the debugger output.
    ///
    /// Before an attach succeeded the target state is not the session's to
    /// change, so the session is only closed.
    fn on_debugger_gone(&self) {
        if self.attached.load(Ordering::SeqCst) {
            self.teardown();
        } else {
            self.close();
        }
    }

    /// Same as [teardown](Self::teardown), without changing the state.
    ///
    /// Returns `false` if the session was already torn down.
    pub(crate) fn close(&self) -> bool {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.shutdown.cancel();

        let requests = self.pending.close_all();
        let waiters = self.stops.abort_all();

        let had_breakpoints = {
            let mut breakpoints = lock(&self.breakpoints);
            let had_breakpoints = !breakpoints.is_empty();
            breakpoints.clear();
            had_breakpoints
        };

        if had_breakpoints {
            self.hub.emit(EngineEvent::Breakpoints(Vec::new()));
        }

        *lock(&self.registers) = None;
        *lock(&self.register_names) = None;

        if let Some(mut child) = lock(&self.child).take() {
            if let Err(error) = child.start_kill() {
                tracing::debug!(%error, "debugger already gone");
            }
        }

        tracing::debug!(requests, waiters, "debugger session closed");

        true
    }
}

impl Drop for MiSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn read_loop<R>(session: Weak<MiSession>, reader: R, shutdown: CancellationToken)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = FramedRead::new(reader, LineDecoder::default());

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return,
            line = lines.next() => line,
        };

        let Some(session) = session.upgrade() else {
            return;
        };

        match line {
            Some(Ok(line)) => session.handle_line(&line),
            Some(Err(error)) => {
                tracing::warn!(%error, "failed to read from debugger");
                session.on_debugger_gone();
                return;
            }
            None => {
                tracing::debug!("debugger closed its output");
                session.on_debugger_gone();
                return;
            }
        }
    }
}
