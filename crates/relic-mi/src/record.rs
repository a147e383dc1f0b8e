use crate::Tuple;

/// One line of MI output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// The `(gdb)` prompt.
    Prompt,

    /// Answer to a command.
    Result(ResultRecord),

    /// Asynchronous notification.
    Async(AsyncRecord),

    /// Console, target or log text.
    Stream(StreamRecord),
}

/// Answer to a command (`<token>^<class>,<results>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    /// Token of the command being answered.
    pub token: Option<u64>,

    /// Outcome of the command.
    pub class: ResultClass,

    /// Payload of the answer.
    pub results: Tuple,
}

impl ResultRecord {
    /// Returns the error message of an `^error` record.
    pub fn error_message(&self) -> Option<&str> {
        (self.class == ResultClass::Error)
            .then(|| self.results.get_str("msg"))
            .flatten()
    }
}

/// Outcome of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    /// `^done`
    Done,

    /// `^running` (equivalent to `^done` for execution commands).
    Running,

    /// `^connected`
    Connected,

    /// `^error`
    Error,

    /// `^exit`
    Exit,
}

impl ResultClass {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "done" => Some(Self::Done),
            "running" => Some(Self::Running),
            "connected" => Some(Self::Connected),
            "error" => Some(Self::Error),
            "exit" => Some(Self::Exit),
            _ => None,
        }
    }
}

/// Asynchronous notification (`*stopped,...`, `=thread-created,...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncRecord {
    /// Token, rarely present on notifications.
    pub token: Option<u64>,

    /// Kind of notification.
    pub kind: AsyncKind,

    /// Notification class (e.g., `stopped`, `running`).
    pub class: String,

    /// Payload of the notification.
    pub results: Tuple,
}

/// Kind of asynchronous notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    /// `*`: execution state of the debuggee changed.
    Exec,

    /// `+`: progress of a long-running operation.
    Status,

    /// `=`: supplementary information (threads, libraries, breakpoints).
    Notify,
}

/// Text output (`~"..."`, `@"..."`, `&"..."`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Origin of the text.
    pub kind: StreamKind,

    /// Unescaped text.
    pub text: String,
}

/// Origin of a [StreamRecord].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Output of the debugger's console interpreter.
    Console,

    /// Output of the debuggee (remote targets only).
    Target,

    /// Debugger internal log messages.
    Log,
}
