use std::sync::Mutex;

use relic_mi::Tuple;
use tokio::sync::oneshot;

use crate::hub::SessionState;
use crate::sync::lock;

/// Why the target stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A breakpoint was hit.
    BreakpointHit,

    /// A step completed.
    EndSteppingRange,

    /// The target received a signal (including interrupts).
    SignalReceived,

    /// The target exited.
    Exited,

    /// Any other reason, as reported by the debugger (possibly empty).
    Other(String),
}

impl StopReason {
    fn from_name(name: &str) -> Self {
        match name {
            "breakpoint-hit" => Self::BreakpointHit,
            "end-stepping-range" => Self::EndSteppingRange,
            "signal-received" => Self::SignalReceived,
            name if name.starts_with("exited") => Self::Exited,
            name => Self::Other(name.to_owned()),
        }
    }
}

/// Details of a `*stopped` notification.
///
/// Fields missing from the notification are left empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopInfo {
    /// Why the target stopped.
    pub reason: StopReason,

    /// Address of the stop frame.
    pub address: String,

    /// Function of the stop frame.
    pub function: String,

    /// Name of the received signal.
    pub signal_name: String,

    /// Number of the hit breakpoint.
    pub breakpoint_id: Option<String>,

    /// Thread that stopped.
    pub thread_id: Option<String>,

    /// Exit code of an exited target.
    pub exit_code: Option<i32>,
}

impl StopInfo {
    /// Extracts the stop details from the results of a `*stopped` record.
    pub fn from_results(results: &Tuple) -> Self {
        let text = |path: &[&str]| results.get_path(path).unwrap_or_default().to_owned();

        Self {
            reason: StopReason::from_name(results.get_str("reason").unwrap_or_default()),
            address: text(&["frame", "addr"]),
            function: text(&["frame", "func"]),
            signal_name: text(&["signal-name"]),
            breakpoint_id: results.get_str("bkptno").map(str::to_owned),
            thread_id: results.get_str("thread-id").map(str::to_owned),
            // the debugger prints exit codes in octal
            exit_code: results
                .get_str("exit-code")
                .and_then(|code| i32::from_str_radix(code, 8).ok()),
        }
    }

    /// Returns whether the stop is the end of the target.
    pub fn is_exit(&self) -> bool {
        self.reason == StopReason::Exited
    }
}

/// What a waiter receives when the target stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The target stopped.
    Stopped(StopInfo),

    /// The session was torn down before any stop.
    Aborted,
}

/// How a stop was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDisposition {
    /// Someone was waiting for this stop and owns its follow-up.
    Solicited,

    /// The target stopped on its own while running.
    Unsolicited,

    /// The target exited.
    Exited,

    /// Nobody waited and the target was not running.
    Ignored,
}

#[derive(Debug, Default)]
struct Waiters {
    list: Vec<oneshot::Sender<StopOutcome>>,
    closed: bool,
}

/// Routes stop notifications to the operations waiting for them.
#[derive(Debug, Default)]
pub struct StopDispatcher {
    waiters: Mutex<Waiters>,
}

impl StopDispatcher {
    /// Registers a one-shot waiter for the next stop.
    ///
    /// Returns `None` once the dispatcher is closed.
    pub fn register(&self) -> Option<oneshot::Receiver<StopOutcome>> {
        let mut waiters = lock(&self.waiters);

        if waiters.closed {
            return None;
        }

        let (tx, rx) = oneshot::channel();
        waiters.list.push(tx);

        Some(rx)
    }

    /// Releases every waiter with the given stop and classifies it.
    ///
    /// `prior` is the session state when the notification arrived.
    pub fn dispatch(&self, stop: &StopInfo, prior: SessionState) -> StopDisposition {
        let released = {
            let mut waiters = lock(&self.waiters);
            waiters.list.retain(|tx| !tx.is_closed());
            std::mem::take(&mut waiters.list)
        };

        let had_waiters = !released.is_empty();

        for tx in released {
            let _ = tx.send(StopOutcome::Stopped(stop.clone()));
        }

        if stop.is_exit() {
            StopDisposition::Exited
        } else if had_waiters {
            StopDisposition::Solicited
        } else if prior == SessionState::Running {
            StopDisposition::Unsolicited
        } else {
            StopDisposition::Ignored
        }
    }

    /// Aborts every waiter and rejects further registrations.
    ///
    /// Returns the number of aborted waiters.
    pub fn abort_all(&self) -> usize {
        let released = {
            let mut waiters = lock(&self.waiters);
            waiters.closed = true;
            std::mem::take(&mut waiters.list)
        };

        let count = released.len();

        for tx in released {
            let _ = tx.send(StopOutcome::Aborted);
        }

        count
    }
}
