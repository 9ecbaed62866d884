//! Shared bookkeeping between the public API and the two pipeline loops.
//!
//! Four FIFOs: queued submissions, pending response actions, and the two
//! promise queues that the action queue indexes into. Each sits behind
//! its own mutex; critical sections are push/pop only and no lock is held
//! across an await, so submission order is the single source of truth for
//! wire order, reply order, and completion order.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::Error;
use crate::flag::WaitableFlag;
use crate::{Queries, Query, Replies, Reply};

/// Producer half of a single-reply promise.
pub(crate) type ReplySink = oneshot::Sender<Result<Reply, Error>>;

/// Producer half of a batch-reply promise.
pub(crate) type RepliesSink = oneshot::Sender<Result<Replies, Error>>;

/// One queued request from a caller. Exactly one disposition per variant.
pub(crate) enum Submission {
    /// Send one query, discard its reply.
    FireOne(Query),
    /// Send a batch of queries, discard every reply.
    FireMany(Queries),
    /// Send one query, deliver its reply.
    AskOne(Query, ReplySink),
    /// Send a batch of queries, deliver all replies as one batch.
    AskMany(Queries, RepliesSink),
}

/// How the read side disposes of the next `amount` replies on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionKind {
    /// Read and discard.
    Ignore,
    /// Pop one single-reply sink per reply.
    Deliver,
    /// Pop one batch sink for the whole run of replies.
    DeliverBulk,
}

/// A run of `amount` wire replies sharing one disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResponseAction {
    pub(crate) amount: usize,
    pub(crate) kind: ActionKind,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The queues and flags shared by the write and read loops.
///
/// Length invariants, maintained by the write loop and consumed by the
/// read loop: `reply_sinks` holds one sink per reply owed to a `Deliver`
/// action, `replies_sinks` one sink per `DeliverBulk` action.
pub(crate) struct QueueSet {
    writes: Mutex<VecDeque<Submission>>,
    actions: Mutex<VecDeque<ResponseAction>>,
    reply_sinks: Mutex<VecDeque<ReplySink>>,
    replies_sinks: Mutex<VecDeque<RepliesSink>>,
    /// Set while `writes` is non-empty.
    pub(crate) write_ready: WaitableFlag,
    /// Set while `actions` is non-empty.
    pub(crate) read_ready: WaitableFlag,
}

impl QueueSet {
    pub(crate) fn new() -> Self {
        Self {
            writes: Mutex::new(VecDeque::new()),
            actions: Mutex::new(VecDeque::new()),
            reply_sinks: Mutex::new(VecDeque::new()),
            replies_sinks: Mutex::new(VecDeque::new()),
            write_ready: WaitableFlag::new(),
            read_ready: WaitableFlag::new(),
        }
    }

    /// Append a submission and signal the write loop.
    pub(crate) fn push_write(&self, submission: Submission) {
        lock(&self.writes).push_back(submission);
        self.write_ready.set();
    }

    pub(crate) fn pop_write(&self) -> Option<Submission> {
        lock(&self.writes).pop_front()
    }

    pub(crate) fn writes_pending(&self) -> bool {
        !lock(&self.writes).is_empty()
    }

    /// Append a response action, merging with the tail where the
    /// disposition permits: `Ignore` merges with trailing `Ignore`,
    /// `Deliver` with trailing `Deliver`. `DeliverBulk` always stands
    /// alone so the batch sink boundary survives.
    pub(crate) fn push_action(&self, kind: ActionKind, amount: usize) {
        let mut actions = lock(&self.actions);
        match actions.back_mut() {
            Some(tail) if tail.kind == kind && kind != ActionKind::DeliverBulk => {
                tail.amount += amount;
            }
            _ => actions.push_back(ResponseAction { amount, kind }),
        }
    }

    pub(crate) fn pop_action(&self) -> Option<ResponseAction> {
        lock(&self.actions).pop_front()
    }

    pub(crate) fn actions_pending(&self) -> bool {
        !lock(&self.actions).is_empty()
    }

    pub(crate) fn push_reply_sink(&self, sink: ReplySink) {
        lock(&self.reply_sinks).push_back(sink);
    }

    pub(crate) fn pop_reply_sink(&self) -> Option<ReplySink> {
        lock(&self.reply_sinks).pop_front()
    }

    pub(crate) fn push_replies_sink(&self, sink: RepliesSink) {
        lock(&self.replies_sinks).push_back(sink);
    }

    pub(crate) fn pop_replies_sink(&self) -> Option<RepliesSink> {
        lock(&self.replies_sinks).pop_front()
    }

    /// Complete every parked promise with a connection-lost error and
    /// drop every pending action. Part of teardown.
    pub(crate) fn fail_outstanding(&self) {
        lock(&self.actions).clear();
        let sinks: Vec<ReplySink> = lock(&self.reply_sinks).drain(..).collect();
        for sink in sinks {
            let _ = sink.send(Err(Error::ConnectionClosed));
        }
        let sinks: Vec<RepliesSink> = lock(&self.replies_sinks).drain(..).collect();
        for sink in sinks {
            let _ = sink.send(Err(Error::ConnectionClosed));
        }
    }

    /// Drop queued submissions that never reached the wire, failing the
    /// ask-class ones. Part of teardown; also run by enqueuers that lose
    /// the race with it.
    pub(crate) fn fail_queued_writes(&self) {
        let pending: Vec<Submission> = lock(&self.writes).drain(..).collect();
        for submission in pending {
            fail_submission(submission);
        }
    }
}

/// Complete one submission that will never reach the wire.
pub(crate) fn fail_submission(submission: Submission) {
    match submission {
        Submission::FireOne(_) | Submission::FireMany(_) => {
            tracing::debug!("dropping an unsent fire-and-forget submission");
        }
        Submission::AskOne(_, sink) => {
            let _ = sink.send(Err(Error::ConnectionClosed));
        }
        Submission::AskMany(_, sink) => {
            let _ = sink.send(Err(Error::ConnectionClosed));
        }
    }
}

#[cfg(test)]
impl QueueSet {
    pub(crate) fn actions_snapshot(&self) -> Vec<ResponseAction> {
        lock(&self.actions).iter().copied().collect()
    }

    /// Sum of `amount` over `Deliver` entries.
    pub(crate) fn deliver_owed(&self) -> usize {
        lock(&self.actions)
            .iter()
            .filter(|action| action.kind == ActionKind::Deliver)
            .map(|action| action.amount)
            .sum()
    }

    /// Count of `DeliverBulk` entries.
    pub(crate) fn bulk_entries(&self) -> usize {
        lock(&self.actions)
            .iter()
            .filter(|action| action.kind == ActionKind::DeliverBulk)
            .count()
    }

    pub(crate) fn reply_sinks_len(&self) -> usize {
        lock(&self.reply_sinks).len()
    }

    pub(crate) fn replies_sinks_len(&self) -> usize {
        lock(&self.replies_sinks).len()
    }
}
