//! Connection metrics.
//!
//! Process-wide counters for wire traffic and connection lifecycle,
//! registered with metriken. The embedding application decides how to
//! expose them.

use metriken::{Counter, metric};

#[metric(
    name = "redpipe/queries/written",
    description = "Queries encoded and written to the wire"
)]
pub static QUERIES_WRITTEN: Counter = Counter::new();

#[metric(
    name = "redpipe/queries/write_errors",
    description = "Submissions that failed during send"
)]
pub static WRITE_ERRORS: Counter = Counter::new();

#[metric(
    name = "redpipe/replies/delivered",
    description = "Replies delivered to ask-class promises"
)]
pub static REPLIES_DELIVERED: Counter = Counter::new();

#[metric(
    name = "redpipe/replies/discarded",
    description = "Fire-and-forget replies read and discarded"
)]
pub static REPLIES_DISCARDED: Counter = Counter::new();

#[metric(
    name = "redpipe/replies/read_errors",
    description = "Reply reads that failed"
)]
pub static READ_ERRORS: Counter = Counter::new();

#[metric(
    name = "redpipe/connections/established",
    description = "Successful connects"
)]
pub static CONNECTIONS_ESTABLISHED: Counter = Counter::new();

#[metric(
    name = "redpipe/connections/lost",
    description = "Connections torn down after a transport or protocol failure"
)]
pub static CONNECTIONS_LOST: Counter = Counter::new();
