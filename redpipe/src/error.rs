use std::io;

/// Errors surfaced by the pipelined connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The connection went away before the reply was delivered, or the
    /// submission arrived after teardown.
    #[error("connection closed")]
    ConnectionClosed,

    /// A reply failed to decode. Wire alignment cannot be trusted after
    /// this, so the connection comes down with it.
    #[error("protocol error: {0}")]
    Protocol(#[from] redpipe_proto::ParseError),

    /// I/O error on connect, read, or write.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
