use crate::facade::{Breakpoint, Frame, RegisterSnapshot};
use crate::hub::SessionState;
use crate::session::StopInfo;

/// Event broadcast by the engine to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Human-readable message about the engine itself.
    Log(String),

    /// Text produced by the debugger or by the host.
    Output {
        /// Origin of the text.
        stream: OutputStream,

        /// The text, without line terminator for host output.
        text: String,
    },

    /// The session state changed.
    StateChanged {
        /// Previous state.
        from: SessionState,

        /// New state.
        to: SessionState,
    },

    /// The breakpoint list changed.
    Breakpoints(Vec<Breakpoint>),

    /// The target paused on its own (breakpoint, signal, ...).
    Paused(PauseReport),
}

/// Origin of an [EngineEvent::Output] text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    /// Debugger console output (`~`).
    Console,

    /// Target output relayed by the debugger (`@`).
    Target,

    /// Debugger log output (`&`).
    Log,

    /// Standard output of the host.
    HostStdout,

    /// Standard error of the host.
    HostStderr,
}

/// Snapshot of the target taken when it paused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseReport {
    /// Why the target stopped.
    pub stop: StopInfo,

    /// Register values at the stop.
    pub registers: RegisterSnapshot,

    /// Call stack at the stop, innermost frame first.
    pub backtrace: Vec<Frame>,
}
