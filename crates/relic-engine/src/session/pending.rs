use std::collections::HashMap;
use std::sync::Mutex;

use relic_mi::{ResultClass, ResultRecord, Tuple};
use tokio::sync::oneshot;

use crate::error::{CommandError, Result};
use crate::sync::lock;

/// Final outcome of a command sent to the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The debugger answered.
    Record(ResultRecord),

    /// No answer arrived within the reply window.
    Expired,

    /// The session closed before an answer arrived.
    Closed,
}

impl Reply {
    /// Returns the payload of a successful answer.
    ///
    /// Both `^done` and `^running` are successful answers.
    pub fn into_done(self) -> Result<Tuple> {
        match self {
            Self::Record(record) => match record.class {
                ResultClass::Done | ResultClass::Running => Ok(record.results),
                ResultClass::Error => Err(CommandError::Rejected(
                    record.error_message().unwrap_or("unknown error").to_owned(),
                )),
                class => Err(CommandError::UnexpectedClass(class)),
            },
            Self::Expired => Err(CommandError::Timeout),
            Self::Closed => Err(CommandError::Closed),
        }
    }
}

#[derive(Debug, Default)]
struct Waiting {
    senders: HashMap<u64, oneshot::Sender<Reply>>,
    closed: bool,
}

/// Commands awaiting their answer, keyed by token.
///
/// Each token completes at most once: whichever of [complete](Self::complete),
/// [expire](Self::expire) and [close_all](Self::close_all) removes it first
/// decides the reply.
#[derive(Debug, Default)]
pub struct PendingRequests {
    waiting: Mutex<Waiting>,
}

impl PendingRequests {
    /// Registers a token, returning `None` once the table is closed.
    pub fn register(&self, token: u64) -> Option<oneshot::Receiver<Reply>> {
        let mut waiting = lock(&self.waiting);

        if waiting.closed {
            return None;
        }

        let (tx, rx) = oneshot::channel();
        waiting.senders.insert(token, tx);

        Some(rx)
    }

    /// Delivers the answer of a token.
    ///
    /// Returns `false` if the token is unknown (expired, or never sent).
    pub fn complete(&self, token: u64, record: ResultRecord) -> bool {
        let Some(tx) = lock(&self.waiting).senders.remove(&token) else {
            return false;
        };

        // the requester may have given up (e.g., cancelled future)
        let _ = tx.send(Reply::Record(record));

        true
    }

    /// Forgets a token whose reply window elapsed.
    ///
    /// Returns `false` if the token already completed.
    pub fn expire(&self, token: u64) -> bool {
        lock(&self.waiting).senders.remove(&token).is_some()
    }

    /// Fails every waiting command and rejects further registrations.
    ///
    /// Returns the number of commands that were waiting.
    pub fn close_all(&self) -> usize {
        let senders = {
            let mut waiting = lock(&self.waiting);
            waiting.closed = true;
            std::mem::take(&mut waiting.senders)
        };

        let count = senders.len();

        for tx in senders.into_values() {
            let _ = tx.send(Reply::Closed);
        }

        count
    }

    /// Returns the number of commands waiting for an answer.
    pub fn count(&self) -> usize {
        lock(&self.waiting).senders.len()
    }

    /// Returns a guard expiring the token when dropped.
    ///
    /// Keeps the table clean when a requester is cancelled before its
    /// reply window elapsed.
    pub fn expire_on_drop(&self, token: u64) -> ExpireOnDrop<'_> {
        ExpireOnDrop {
            pending: self,
            token,
        }
    }
}

/// Expires a token of [PendingRequests] when dropped.
#[derive(Debug)]
pub struct ExpireOnDrop<'a> {
    pending: &'a PendingRequests,
    token: u64,
}

impl Drop for ExpireOnDrop<'_> {
    fn drop(&mut self) {
        if self.pending.expire(self.token) {
            tracing::debug!(token = self.token, "request abandoned");
        }
    }
}
