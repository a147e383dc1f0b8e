use std::fmt;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::event::{EngineEvent, OutputStream};
use crate::sync::lock;

const EVENT_CAPACITY: usize = 256;

/// Execution state of the debug session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing is running.
    #[default]
    Stopped,

    /// A launch is in progress.
    Starting,

    /// The target is executing.
    Running,

    /// The target is halted by the debugger.
    Paused,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
        };

        f.write_str(name)
    }
}

/// Shared session state and event channel.
///
/// Every state transition goes through this hub, which broadcasts a
/// [EngineEvent::StateChanged] event whenever the state actually changes.
#[derive(Debug)]
pub struct SessionHub {
    state: Mutex<SessionState>,
    events: broadcast::Sender<EngineEvent>,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHub {
    /// Creates a hub in the [SessionState::Stopped] state.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            state: Mutex::new(SessionState::Stopped),
            events,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Subscribes to the events of this hub.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Broadcasts an event.
    pub fn emit(&self, event: EngineEvent) {
        // no subscriber is not an error
        let _ = self.events.send(event);
    }

    /// Broadcasts a log message.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(%message);
        self.emit(EngineEvent::Log(message));
    }

    pub(crate) fn output(&self, stream: OutputStream, text: impl Into<String>) {
        self.emit(EngineEvent::Output {
            stream,
            text: text.into(),
        });
    }

    /// Moves to the given state and returns the previous one.
    pub(crate) fn set_state(&self, to: SessionState) -> SessionState {
        let from = std::mem::replace(&mut *lock(&self.state), to);

        if from != to {
            tracing::debug!(%from, %to, "session state changed");
            self.emit(EngineEvent::StateChanged { from, to });
        }

        from
    }

    /// Moves to the given state unless the session is stopped.
    ///
    /// Returns whether the transition happened.
    pub(crate) fn set_state_unless_stopped(&self, to: SessionState) -> bool {
        let from = {
            let mut state = lock(&self.state);

            if *state == SessionState::Stopped {
                return false;
            }

            std::mem::replace(&mut *state, to)
        };

        if from != to {
            tracing::debug!(%from, %to, "session state changed");
            self.emit(EngineEvent::StateChanged { from, to });
        }

        true
    }

    /// Moves from [SessionState::Stopped] to [SessionState::Starting].
    ///
    /// Returns `false` if the session was not stopped.
    pub(crate) fn begin_launch(&self) -> bool {
        {
            let mut state = lock(&self.state);

            if *state != SessionState::Stopped {
                return false;
            }

            *state = SessionState::Starting;
        }

        self.emit(EngineEvent::StateChanged {
            from: SessionState::Stopped,
            to: SessionState::Starting,
        });

        true
    }
}
