//! redpipe — a pipelined async client connection for Redis-compatible
//! servers.
//!
//! A [`Connection`] multiplexes many producers onto a single duplex
//! socket (TCP or UNIX) and honors the server's ordered request/response
//! contract: commands go out back-to-back, replies come back in wire
//! order, and each submission chooses up front whether its replies are
//! discarded ([`fire`](Connection::fire)), delivered singly
//! ([`exec`](Connection::exec)), or delivered as one batch
//! ([`exec_all`](Connection::exec_all)).
//!
//! The write side records, per submission, how many in-flight replies it
//! owes and what to do with them; the read side consumes replies in that
//! recorded order. Neither side ever blocks the other: awaiting callers
//! park on one-shot promises, not on the loops.
//!
//! # Example
//!
//! ```no_run
//! use redpipe::{Connection, ConnectionConfig, query};
//!
//! # async fn example() -> Result<(), redpipe::Error> {
//! let conn = Connection::new(ConnectionConfig::default());
//! conn.start();
//!
//! conn.fire(query(["SET", "greeting", "hello"]));
//! let reply = conn.exec(query(["GET", "greeting"])).await?;
//! assert_eq!(reply.as_bytes(), Some(&b"hello"[..]));
//! # Ok(())
//! # }
//! ```
//!
//! # Scope
//!
//! TLS, reconnection, and the AUTH/SELECT session handshake are left to
//! the embedding layer. The configuration carries the fields a handshake
//! layer reads, and FIFO submission ordering guarantees that whatever
//! that layer submits first goes onto the wire first.

mod config;
mod connection;
mod error;
mod flag;
pub(crate) mod metrics;
mod queue;
mod transport;

pub use config::{ConnectionConfig, Target};
pub use connection::Connection;
pub use error::Error;
pub use redpipe_proto::{ParseError, Value};

use bytes::Bytes;

/// One command: an ordered argv of byte strings, `argv[0]` the command
/// name. Immutable once submitted.
pub type Query = Vec<Bytes>;

/// An ordered batch of queries; replies come back in the same order.
pub type Queries = Vec<Query>;

/// One decoded reply. A RESP error reply is a successfully delivered
/// `Reply`, not an [`Error`] of this crate.
pub type Reply = Value;

/// One reply per query of the submitting batch.
pub type Replies = Vec<Reply>;

/// Build a [`Query`] from anything convertible to byte strings.
///
/// ```
/// use redpipe::query;
///
/// let q = query(["SET", "k", "v"]);
/// assert_eq!(q.len(), 3);
/// ```
pub fn query<I, A>(args: I) -> Query
where
    I: IntoIterator<Item = A>,
    A: Into<Bytes>,
{
    args.into_iter().map(Into::into).collect()
}
