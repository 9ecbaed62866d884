//! The pipelined connection: write loop, read loop, and lifecycle.
//!
//! A [`Connection`] multiplexes many producers onto one duplex socket.
//! Producers enqueue submissions; the write loop drains them onto the
//! wire in FIFO order while recording, per submission, how the read loop
//! must dispose of the replies it owes; the read loop consumes replies in
//! wire order and discards them, resolves single-reply promises, or
//! resolves batch promises, as recorded. For any two submissions X then Y
//! in queue order, X's commands reach the wire entirely before Y's, their
//! replies come back in that order, and their promises complete in that
//! order.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use redpipe_proto::Request;

use crate::config::ConnectionConfig;
use crate::error::Error;
use crate::metrics;
use crate::queue::{ActionKind, QueueSet, ResponseAction, Submission, fail_submission, lock};
use crate::transport::{ReplyReader, Transport, WriteHalf};
use crate::{Queries, Query, Replies, Reply};

// ── Connection state ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Idle = 0,
    Starting = 1,
    Connecting = 2,
    Connected = 3,
    /// Terminal. Reconnection is the embedding layer's policy.
    Disconnected = 4,
}

impl State {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => State::Idle,
            1 => State::Starting,
            2 => State::Connecting,
            3 => State::Connected,
            _ => State::Disconnected,
        }
    }
}

// ── Shared inner state ──────────────────────────────────────────────────

struct Inner {
    config: ConnectionConfig,
    queues: QueueSet,
    state: AtomicU8,
    started: AtomicBool,
    connecting: AtomicBool,
    write_tx: mpsc::Sender<WriteHalf>,
    read_tx: mpsc::Sender<ReplyReader>,
    write_rx: Mutex<Option<mpsc::Receiver<WriteHalf>>>,
    read_rx: Mutex<Option<mpsc::Receiver<ReplyReader>>>,
}

impl Inner {
    fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn is_shut_down(&self) -> bool {
        self.state() == State::Disconnected
    }

    /// Tear the connection down exactly once: fail every parked promise
    /// and every queued ask, then wake both loops so they exit.
    fn disconnect(&self) {
        let previous = self.state.swap(State::Disconnected as u8, Ordering::AcqRel);
        if previous == State::Disconnected as u8 {
            return;
        }
        metrics::CONNECTIONS_LOST.increment();
        self.queues.fail_outstanding();
        self.queues.fail_queued_writes();
        self.queues.write_ready.set();
        self.queues.read_ready.set();
    }
}

// ── Public handle ───────────────────────────────────────────────────────

/// Handle to a pipelined connection. Cheap to clone; every clone shares
/// the same socket, queues, and ordering domain.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a connection for `config`. No socket is opened until
    /// [`start`](Connection::start).
    pub fn new(config: ConnectionConfig) -> Self {
        let (write_tx, write_rx) = mpsc::channel(1);
        let (read_tx, read_rx) = mpsc::channel(1);
        Connection {
            inner: Arc::new(Inner {
                config,
                queues: QueueSet::new(),
                state: AtomicU8::new(State::Idle as u8),
                started: AtomicBool::new(false),
                connecting: AtomicBool::new(false),
                write_tx,
                read_tx,
                write_rx: Mutex::new(Some(write_rx)),
                read_rx: Mutex::new(Some(read_rx)),
            }),
        }
    }

    /// Spawn the two pipeline loops and the first connect attempt onto
    /// the ambient tokio runtime. Idempotent: the loops spawn exactly
    /// once; the connect attempt re-arms only after a failed connect.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime. Use
    /// [`start_on`](Connection::start_on) to pass a handle explicitly.
    pub fn start(&self) {
        self.start_on(&Handle::current());
    }

    /// [`start`](Connection::start), spawning onto an explicit runtime
    /// handle.
    pub fn start_on(&self, handle: &Handle) {
        if !self.inner.started.swap(true, Ordering::AcqRel) {
            self.inner.set_state(State::Starting);
            let write_rx = lock(&self.inner.write_rx).take();
            let read_rx = lock(&self.inner.read_rx).take();
            if let Some(rx) = write_rx {
                handle.spawn(write_loop(self.inner.clone(), rx));
            }
            if let Some(rx) = read_rx {
                handle.spawn(read_loop(self.inner.clone(), rx));
            }
        }

        if !self.inner.connecting.swap(true, Ordering::AcqRel) {
            handle.spawn(connect(self.inner.clone()));
        }
    }

    /// Racy snapshot of connectivity, for observability rather than
    /// gating: submissions may be enqueued before the transport is up and
    /// are written once it is.
    pub fn is_connected(&self) -> bool {
        self.inner.state() == State::Connected
    }

    /// Enqueue `query` and discard its eventual reply. Returns once the
    /// submission is scheduled; send failures are logged, not reported.
    pub fn fire(&self, query: Query) {
        debug!(query = %describe_query(&query), "firing and forgetting query");
        self.enqueue(Submission::FireOne(query));
    }

    /// Enqueue a batch of queries, discarding every reply. The batch
    /// keeps its relative order against all other submissions from this
    /// caller.
    pub fn fire_all(&self, queries: Queries) {
        if queries.is_empty() {
            return;
        }
        for query in &queries {
            debug!(query = %describe_query(query), "firing and forgetting query");
        }
        self.enqueue(Submission::FireMany(queries));
    }

    /// Enqueue `query` and await its reply.
    ///
    /// A RESP error reply resolves as a normal [`Reply`]; `Err` means the
    /// query could not be sent or its reply could not be read.
    pub async fn exec(&self, query: Query) -> Result<Reply, Error> {
        if self.inner.is_shut_down() {
            return Err(Error::ConnectionClosed);
        }
        debug!(query = %describe_query(&query), "executing query");
        let (sink, promise) = oneshot::channel();
        self.enqueue(Submission::AskOne(query, sink));
        promise.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Enqueue a batch and await all replies, in submission order. On
    /// success the batch resolves with exactly one reply per query; the
    /// batch is pipelined back-to-back on the wire without interleaving.
    /// An empty batch resolves immediately.
    pub async fn exec_all(&self, queries: Queries) -> Result<Replies, Error> {
        if queries.is_empty() {
            return Ok(Replies::new());
        }
        if self.inner.is_shut_down() {
            return Err(Error::ConnectionClosed);
        }
        for query in &queries {
            debug!(query = %describe_query(query), "executing query");
        }
        let (sink, promise) = oneshot::channel();
        self.enqueue(Submission::AskMany(queries, sink));
        promise.await.map_err(|_| Error::ConnectionClosed)?
    }

    fn enqueue(&self, submission: Submission) {
        self.inner.queues.push_write(submission);
        // A teardown that raced with the push would strand the
        // submission; re-drain after observing it.
        if self.inner.is_shut_down() {
            self.inner.queues.fail_queued_writes();
        }
    }
}

// ── Connect ─────────────────────────────────────────────────────────────

async fn connect(inner: Arc<Inner>) {
    inner.set_state(State::Connecting);
    let target = inner.config.target();
    info!(?target, "trying to connect");

    match Transport::connect(&target).await {
        Ok(transport) => {
            let (read_half, write_half) = transport.split();
            let _ = inner.write_tx.send(write_half).await;
            let _ = inner.read_tx.send(ReplyReader::new(read_half)).await;
            // The loops own the transport from here on and may already
            // have torn it down; never resurrect a Disconnected state.
            let _ = inner.state.compare_exchange(
                State::Connecting as u8,
                State::Connected as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            metrics::CONNECTIONS_ESTABLISHED.increment();
            info!(?target, "connected");
        }
        Err(e) => {
            error!(?target, error = %e, "cannot connect");
            inner.set_state(State::Idle);
        }
    }

    // Mirror connectivity into the connecting flag: a failed attempt
    // re-arms start(), a successful one keeps further attempts parked.
    inner
        .connecting
        .store(inner.state() == State::Connected, Ordering::Release);
}

// ── Write pipeline ──────────────────────────────────────────────────────

async fn write_loop(inner: Arc<Inner>, mut transport_rx: mpsc::Receiver<WriteHalf>) {
    let Some(mut wire) = transport_rx.recv().await else {
        return;
    };
    let mut buf = Vec::with_capacity(512);

    loop {
        inner.queues.write_ready.wait().await;

        while let Some(submission) = inner.queues.pop_write() {
            // Teardown can land while a write is suspended; anything
            // popped after it must be failed, not written to a dead
            // transport.
            if inner.is_shut_down() {
                fail_submission(submission);
                break;
            }
            write_submission(&inner.queues, &mut wire, &mut buf, submission).await;
        }
        if inner.is_shut_down() {
            break;
        }

        inner.queues.write_ready.clear();
        // A push that raced with the clear must not go unserved.
        if inner.queues.writes_pending() {
            inner.queues.write_ready.set();
        }
    }

    // Teardown is the read side's; whatever its drain could not see —
    // queued submissions and promises parked while this loop raced it —
    // is completed here.
    inner.queues.fail_queued_writes();
    inner.queues.fail_outstanding();
}

/// Send one submission and record the disposition its replies require.
///
/// Write failures are absorbed here, per the submission's policy:
/// fire-and-forget failures are logged with the transmitted prefix still
/// accounted, ask-class failures complete the promise with the error and
/// record no action. The drain continues either way; a dead transport
/// surfaces on the read side, which owns teardown.
async fn write_submission(
    queues: &QueueSet,
    wire: &mut WriteHalf,
    buf: &mut Vec<u8>,
    submission: Submission,
) {
    match submission {
        Submission::FireOne(query) => match write_query(wire, buf, &query).await {
            Ok(()) => {
                queues.push_action(ActionKind::Ignore, 1);
                queues.read_ready.set();
            }
            Err(e) => {
                metrics::WRITE_ERRORS.increment();
                error!(
                    query = %describe_query(&query),
                    error = %e,
                    "error sending fire-and-forget query",
                );
            }
        },
        Submission::FireMany(queries) => {
            let mut sent = 0;
            let mut failure = None;
            for query in &queries {
                match write_query(wire, buf, query).await {
                    Ok(()) => sent += 1,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            // The transmitted prefix still owes replies even when the
            // batch dies mid-way.
            if sent > 0 {
                queues.push_action(ActionKind::Ignore, sent);
                queues.read_ready.set();
            }
            if let Some(e) = failure {
                metrics::WRITE_ERRORS.increment();
                error!(
                    query = %describe_query(&queries[sent]),
                    error = %e,
                    "error sending fire-and-forget batch",
                );
            }
        }
        Submission::AskOne(query, sink) => match write_query(wire, buf, &query).await {
            Ok(()) => {
                queues.push_reply_sink(sink);
                queues.push_action(ActionKind::Deliver, 1);
                queues.read_ready.set();
            }
            Err(e) => {
                metrics::WRITE_ERRORS.increment();
                let _ = sink.send(Err(e));
            }
        },
        Submission::AskMany(queries, sink) => {
            let mut failure = None;
            for query in &queries {
                if let Err(e) = write_query(wire, buf, query).await {
                    failure = Some(e);
                    break;
                }
            }
            match failure {
                None => {
                    queues.push_replies_sink(sink);
                    queues.push_action(ActionKind::DeliverBulk, queries.len());
                    queues.read_ready.set();
                }
                Some(e) => {
                    // A half-sent batch cannot resolve partially; the
                    // whole promise fails and no action is recorded.
                    metrics::WRITE_ERRORS.increment();
                    let _ = sink.send(Err(e));
                }
            }
        }
    }
}

async fn write_query(wire: &mut WriteHalf, buf: &mut Vec<u8>, query: &Query) -> Result<(), Error> {
    let args: Vec<&[u8]> = query.iter().map(|arg| arg.as_ref()).collect();
    let request = Request::new(args);
    buf.resize(request.encoded_len(), 0);
    request.encode(buf);
    wire.write_all(buf).await?;
    metrics::QUERIES_WRITTEN.increment();
    Ok(())
}

// ── Read pipeline ───────────────────────────────────────────────────────

async fn read_loop(inner: Arc<Inner>, mut transport_rx: mpsc::Receiver<ReplyReader>) {
    let Some(mut reader) = transport_rx.recv().await else {
        return;
    };

    loop {
        inner.queues.read_ready.wait().await;
        if inner.is_shut_down() {
            break;
        }

        let mut healthy = true;
        while let Some(action) = inner.queues.pop_action() {
            healthy = read_action(&inner.queues, &mut reader, action).await;
            if !healthy {
                break;
            }
        }
        if !healthy {
            inner.disconnect();
            break;
        }

        inner.queues.read_ready.clear();
        if inner.queues.actions_pending() {
            inner.queues.read_ready.set();
        }
    }
}

/// Consume the replies one action prescribes.
///
/// Returns `false` when a read failed: the wire can no longer be trusted
/// to line up with the action queue, so the caller must tear down. The
/// promise owed by the failing read, if any, has received the error.
async fn read_action(queues: &QueueSet, reader: &mut ReplyReader, action: ResponseAction) -> bool {
    match action.kind {
        ActionKind::Ignore => {
            for _ in 0..action.amount {
                match reader.read_reply().await {
                    Ok(_) => {
                        metrics::REPLIES_DISCARDED.increment();
                    }
                    Err(e) => {
                        metrics::READ_ERRORS.increment();
                        error!(
                            error = %e,
                            "error reading the reply to a fired-and-forgotten query",
                        );
                        return false;
                    }
                }
            }
            true
        }
        ActionKind::Deliver => {
            for _ in 0..action.amount {
                let Some(sink) = queues.pop_reply_sink() else {
                    error!("reply promise queue out of step with the action queue");
                    return false;
                };
                match reader.read_reply().await {
                    Ok(reply) => {
                        metrics::REPLIES_DELIVERED.increment();
                        let _ = sink.send(Ok(reply));
                    }
                    Err(e) => {
                        metrics::READ_ERRORS.increment();
                        let _ = sink.send(Err(e));
                        return false;
                    }
                }
            }
            true
        }
        ActionKind::DeliverBulk => {
            let Some(sink) = queues.pop_replies_sink() else {
                error!("batch promise queue out of step with the action queue");
                return false;
            };
            let mut replies = Replies::with_capacity(action.amount);
            for _ in 0..action.amount {
                match reader.read_reply().await {
                    Ok(reply) => replies.push(reply),
                    Err(e) => {
                        metrics::READ_ERRORS.increment();
                        let _ = sink.send(Err(e));
                        return false;
                    }
                }
            }
            metrics::REPLIES_DELIVERED.add(replies.len() as u64);
            let _ = sink.send(Ok(replies));
            true
        }
    }
}

// ── Log formatting ──────────────────────────────────────────────────────

/// Render a query for logs: up to seven arguments, then an ellipsis.
fn describe_query(query: &Query) -> String {
    let mut out = String::new();
    for (i, arg) in query.iter().enumerate() {
        if i == 7 {
            out.push_str(" ...");
            break;
        }
        if i > 0 {
            out.push(' ');
        }
        out.push('\'');
        out.push_str(&String::from_utf8_lossy(arg));
        out.push('\'');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::AsyncWriteExt;

    use crate::query;
    use crate::transport::{ReadHalf, ScriptedWriter};

    fn reliable_wire() -> WriteHalf {
        WriteHalf::Scripted(ScriptedWriter::reliable())
    }

    async fn reader_with(data: &[u8]) -> (ReplyReader, tokio::io::DuplexStream) {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(data).await.unwrap();
        (ReplyReader::new(ReadHalf::Mem(client)), server)
    }

    // ── Write dispatch ──────────────────────────────────────────────

    #[tokio::test]
    async fn fires_then_asks_coalesce_into_two_actions() {
        let queues = QueueSet::new();
        let mut wire = reliable_wire();
        let mut buf = Vec::new();

        for _ in 0..3 {
            let submission = Submission::FireOne(query(["PING"]));
            write_submission(&queues, &mut wire, &mut buf, submission).await;
        }
        let mut promises = Vec::new();
        for _ in 0..2 {
            let (sink, promise) = oneshot::channel();
            let submission = Submission::AskOne(query(["PING"]), sink);
            write_submission(&queues, &mut wire, &mut buf, submission).await;
            promises.push(promise);
        }

        assert_eq!(
            queues.actions_snapshot(),
            vec![
                ResponseAction {
                    amount: 3,
                    kind: ActionKind::Ignore,
                },
                ResponseAction {
                    amount: 2,
                    kind: ActionKind::Deliver,
                },
            ]
        );
        assert_eq!(wire.frames().len(), 5);
        // The promise queues track the action queue.
        assert_eq!(queues.reply_sinks_len(), queues.deliver_owed());
        assert_eq!(queues.replies_sinks_len(), queues.bulk_entries());
    }

    #[tokio::test]
    async fn batches_pipeline_back_to_back_and_bulk_never_merges() {
        let queues = QueueSet::new();
        let mut wire = reliable_wire();
        let mut buf = Vec::new();

        for _ in 0..2 {
            let (sink, _promise) = oneshot::channel();
            let batch: Queries = vec![query(["SET", "k", "v"]), query(["GET", "k"])];
            let submission = Submission::AskMany(batch, sink);
            write_submission(&queues, &mut wire, &mut buf, submission).await;
        }

        assert_eq!(
            queues.actions_snapshot(),
            vec![
                ResponseAction {
                    amount: 2,
                    kind: ActionKind::DeliverBulk,
                },
                ResponseAction {
                    amount: 2,
                    kind: ActionKind::DeliverBulk,
                },
            ]
        );
        assert_eq!(wire.frames().len(), 4);
        assert_eq!(queues.replies_sinks_len(), queues.bulk_entries());
    }

    #[tokio::test]
    async fn ask_write_failure_fails_the_promise_and_the_drain_continues() {
        let queues = QueueSet::new();
        let mut wire = WriteHalf::Scripted(ScriptedWriter::failing_on(0));
        let mut buf = Vec::new();

        let (sink, promise) = oneshot::channel();
        let submission = Submission::AskOne(query(["PING"]), sink);
        write_submission(&queues, &mut wire, &mut buf, submission).await;

        assert!(queues.actions_snapshot().is_empty());
        assert_eq!(queues.reply_sinks_len(), 0);
        assert!(matches!(promise.await.unwrap(), Err(Error::Io(_))));

        // The failure stays scoped to its submission; the next ask goes
        // out normally.
        let (sink, _promise) = oneshot::channel();
        let submission = Submission::AskOne(query(["PING"]), sink);
        write_submission(&queues, &mut wire, &mut buf, submission).await;
        assert_eq!(
            queues.actions_snapshot(),
            vec![ResponseAction {
                amount: 1,
                kind: ActionKind::Deliver,
            }]
        );
        assert_eq!(queues.reply_sinks_len(), 1);
    }

    #[tokio::test]
    async fn mid_batch_write_failure_invalidates_the_whole_batch_promise() {
        let queues = QueueSet::new();
        let mut wire = WriteHalf::Scripted(ScriptedWriter::failing_on(2));
        let mut buf = Vec::new();

        let batch: Queries = (0..5).map(|_| query(["PING"])).collect();
        let (sink, promise) = oneshot::channel();
        let submission = Submission::AskMany(batch, sink);
        write_submission(&queues, &mut wire, &mut buf, submission).await;

        assert!(queues.actions_snapshot().is_empty());
        assert_eq!(queues.replies_sinks_len(), 0);
        assert_eq!(wire.frames().len(), 2);
        assert!(matches!(promise.await.unwrap(), Err(Error::Io(_))));

        // The connection keeps draining after the failed batch.
        let submission = Submission::FireOne(query(["PING"]));
        write_submission(&queues, &mut wire, &mut buf, submission).await;
        assert_eq!(
            queues.actions_snapshot(),
            vec![ResponseAction {
                amount: 1,
                kind: ActionKind::Ignore,
            }]
        );
    }

    #[tokio::test]
    async fn fire_batch_failure_still_accounts_for_the_transmitted_prefix() {
        let queues = QueueSet::new();
        let mut wire = WriteHalf::Scripted(ScriptedWriter::failing_on(2));
        let mut buf = Vec::new();

        let batch: Queries = (0..5).map(|_| query(["PING"])).collect();
        let submission = Submission::FireMany(batch);
        write_submission(&queues, &mut wire, &mut buf, submission).await;

        assert_eq!(
            queues.actions_snapshot(),
            vec![ResponseAction {
                amount: 2,
                kind: ActionKind::Ignore,
            }]
        );

        // Later fires keep draining and coalesce onto the same entry.
        let submission = Submission::FireOne(query(["PING"]));
        write_submission(&queues, &mut wire, &mut buf, submission).await;
        assert_eq!(
            queues.actions_snapshot(),
            vec![ResponseAction {
                amount: 3,
                kind: ActionKind::Ignore,
            }]
        );
    }

    #[tokio::test]
    async fn fire_one_failure_records_no_action_and_the_drain_continues() {
        let queues = QueueSet::new();
        let mut wire = WriteHalf::Scripted(ScriptedWriter::failing_on(0));
        let mut buf = Vec::new();

        let submission = Submission::FireOne(query(["PING"]));
        write_submission(&queues, &mut wire, &mut buf, submission).await;
        assert!(queues.actions_snapshot().is_empty());

        let submission = Submission::FireOne(query(["PING"]));
        write_submission(&queues, &mut wire, &mut buf, submission).await;
        assert_eq!(
            queues.actions_snapshot(),
            vec![ResponseAction {
                amount: 1,
                kind: ActionKind::Ignore,
            }]
        );
    }

    #[tokio::test]
    async fn written_frames_are_resp_encoded() {
        let queues = QueueSet::new();
        let mut wire = reliable_wire();
        let mut buf = Vec::new();

        let submission = Submission::FireOne(query(["SET", "k", "v"]));
        write_submission(&queues, &mut wire, &mut buf, submission).await;
        assert_eq!(
            wire.frames()[0],
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"
        );
    }

    // ── Read dispatch ───────────────────────────────────────────────

    #[tokio::test]
    async fn deliver_routes_each_reply_to_its_promise_in_order() {
        let queues = QueueSet::new();
        let (mut reader, _server) = reader_with(b"+OK\r\n:42\r\n").await;

        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        queues.push_reply_sink(first_tx);
        queues.push_reply_sink(second_tx);

        let action = ResponseAction {
            amount: 2,
            kind: ActionKind::Deliver,
        };
        assert!(read_action(&queues, &mut reader, action).await);

        assert_eq!(
            first_rx.await.unwrap().unwrap(),
            Reply::simple_string(b"OK")
        );
        assert_eq!(second_rx.await.unwrap().unwrap(), Reply::integer(42));
        assert_eq!(queues.reply_sinks_len(), 0);
    }

    #[tokio::test]
    async fn deliver_bulk_collects_the_whole_run_into_one_promise() {
        let queues = QueueSet::new();
        let (mut reader, _server) = reader_with(b"+OK\r\n$1\r\nv\r\n").await;

        let (sink, promise) = oneshot::channel();
        queues.push_replies_sink(sink);

        let action = ResponseAction {
            amount: 2,
            kind: ActionKind::DeliverBulk,
        };
        assert!(read_action(&queues, &mut reader, action).await);

        let replies = promise.await.unwrap().unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], Reply::simple_string(b"OK"));
        assert_eq!(replies[1], Reply::bulk_string(b"v"));
    }

    #[tokio::test]
    async fn ignore_discards_without_touching_promises() {
        let queues = QueueSet::new();
        let (mut reader, _server) = reader_with(b"+OK\r\n+OK\r\n").await;

        let action = ResponseAction {
            amount: 2,
            kind: ActionKind::Ignore,
        };
        assert!(read_action(&queues, &mut reader, action).await);
        assert_eq!(queues.reply_sinks_len(), 0);
    }

    #[tokio::test]
    async fn decode_failure_fails_the_promise_and_reports_unhealthy() {
        let queues = QueueSet::new();
        let (mut reader, _server) = reader_with(b"@garbage\r\n").await;

        let (sink, promise) = oneshot::channel();
        queues.push_reply_sink(sink);

        let action = ResponseAction {
            amount: 1,
            kind: ActionKind::Deliver,
        };
        assert!(!read_action(&queues, &mut reader, action).await);
        assert!(matches!(promise.await.unwrap(), Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn eof_mid_bulk_fails_the_batch_promise() {
        let queues = QueueSet::new();
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(b"+OK\r\n").await.unwrap();
        drop(server);
        let mut reader = ReplyReader::new(ReadHalf::Mem(client));

        let (sink, promise) = oneshot::channel();
        queues.push_replies_sink(sink);

        let action = ResponseAction {
            amount: 2,
            kind: ActionKind::DeliverBulk,
        };
        assert!(!read_action(&queues, &mut reader, action).await);
        assert!(matches!(
            promise.await.unwrap(),
            Err(Error::ConnectionClosed)
        ));
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    #[tokio::test]
    async fn submissions_after_teardown_fail_fast() {
        let conn = Connection::new(ConnectionConfig::default());
        conn.inner.disconnect();

        assert!(!conn.is_connected());
        assert!(matches!(
            conn.exec(query(["PING"])).await,
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(
            conn.exec_all(vec![query(["PING"])]).await,
            Err(Error::ConnectionClosed)
        ));
        // Fire-class submissions are dropped, not queued.
        conn.fire(query(["PING"]));
        assert!(!conn.inner.queues.writes_pending());
    }

    #[tokio::test]
    async fn write_loop_exit_completes_promises_parked_after_teardown() {
        let conn = Connection::new(ConnectionConfig::default());
        let (transport_tx, transport_rx) = mpsc::channel(1);
        let loop_task = tokio::spawn(write_loop(conn.inner.clone(), transport_rx));
        transport_tx
            .send(WriteHalf::Scripted(ScriptedWriter::reliable()))
            .await
            .unwrap();

        conn.inner.disconnect();

        // Landed after the teardown drain; only the write loop's exit
        // path can complete these.
        let (queued_tx, queued_promise) = oneshot::channel();
        conn.inner
            .queues
            .push_write(Submission::AskOne(query(["PING"]), queued_tx));
        let (parked_tx, parked_promise) = oneshot::channel();
        conn.inner.queues.push_reply_sink(parked_tx);

        assert!(matches!(
            queued_promise.await.unwrap(),
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(
            parked_promise.await.unwrap(),
            Err(Error::ConnectionClosed)
        ));
        loop_task.await.unwrap();
    }

    #[tokio::test]
    async fn teardown_is_idempotent_and_fails_parked_promises() {
        let conn = Connection::new(ConnectionConfig::default());
        let (sink, promise) = oneshot::channel();
        conn.inner.queues.push_reply_sink(sink);

        conn.inner.disconnect();
        conn.inner.disconnect();

        assert!(matches!(
            promise.await.unwrap(),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn long_queries_are_truncated_in_logs() {
        let short = query(["GET", "k"]);
        assert_eq!(describe_query(&short), "'GET' 'k'");

        let long = query(["RPUSH", "k", "1", "2", "3", "4", "5", "6", "7"]);
        assert_eq!(
            describe_query(&long),
            "'RPUSH' 'k' '1' '2' '3' '4' '5' ..."
        );
    }
}
