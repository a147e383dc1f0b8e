use std::path::PathBuf;

use relic_mi::ResultClass;

use crate::hub::SessionState;

/// Error of a request sent through a debugger session.
#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    /// No debugger session is active.
    #[error("no active debugger session")]
    NoSession,

    /// The debugger did not answer in time.
    #[error("debugger did not answer in time")]
    Timeout,

    /// The session was closed before the answer arrived.
    #[error("debugger session closed")]
    Closed,

    /// The debugger answered with `^error`.
    #[error("debugger rejected the command: {0}")]
    Rejected(String),

    /// The debugger answered with an unexpected result class.
    #[error("unexpected answer from debugger: {0:?}")]
    UnexpectedClass(ResultClass),

    /// The answer is missing a field or has a malformed one.
    #[error("malformed debugger answer (field {0})")]
    Malformed(&'static str),

    /// The command requires the target to be paused.
    #[error("target must be paused (currently {0})")]
    NotPaused(SessionState),

    /// The target exited while the command was in progress.
    #[error("target exited")]
    TargetExited,

    /// The provided data is not a valid hexadecimal byte string.
    #[error("invalid hexadecimal byte string")]
    InvalidHex,

    /// The debugger returned fewer bytes than requested.
    #[error("partial read ({0} of {1} bytes)")]
    PartialRead(usize, usize),

    /// Failed to write to the debugger.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Error of an attach attempt.
#[derive(thiserror::Error, Debug)]
pub enum AttachError {
    /// The operating system denied the debugger access to the target.
    #[error("access denied while attaching: {0}")]
    AccessDenied(String),

    /// The debugger failed to attach.
    #[error("failed to attach: {0}")]
    Failed(String),

    /// The attach command did not complete.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Error of a launch request.
///
/// These are errors where nothing is left running. A launch that starts the
/// host but cannot debug it is reported as a degraded success instead.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    /// No host program is configured.
    #[error("no host program configured")]
    HostNotConfigured,

    /// The configured host program does not exist.
    #[error("host program not found: {0}")]
    HostNotFound(PathBuf),

    /// A target is already running.
    #[error("a target is already running")]
    AlreadyActive,

    /// The target file does not exist.
    #[error("target not found: {0}")]
    TargetNotFound(PathBuf),

    /// Failed to spawn the host.
    #[error("failed to spawn host")]
    Spawn(#[source] std::io::Error),

    /// The host exited right after being spawned.
    #[error("host exited immediately (code {code:?})")]
    ImmediateExit {
        /// Exit code of the host, if any.
        code: Option<i32>,

        /// Output captured before the exit.
        output: Vec<String>,
    },
}

/// Error of a pause request.
#[derive(thiserror::Error, Debug)]
pub enum PauseError {
    /// No target PID is known.
    #[error("no target process")]
    NoTarget,

    /// The target runs without a debugger attached.
    #[error("debugging is unavailable for this target")]
    DebuggingUnavailable,

    /// The target did not stop in time.
    #[error("target did not stop in time")]
    Timeout,

    /// Every interrupt strategy failed.
    #[error("failed to interrupt target: {0}")]
    Interrupt(String),

    /// The session failed while waiting for the stop.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Any error of the engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Launch error.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Debugger request error.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Pause error.
    #[error(transparent)]
    Pause(#[from] PauseError),
}

/// Result type of this crate, failing with [CommandError] by default.
pub type Result<T, E = CommandError> = core::result::Result<T, E>;
