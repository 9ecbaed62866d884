//! Duplex byte transport over TCP or UNIX sockets.
//!
//! A [`Transport`] opens on demand and splits into owned read and write
//! halves, one per pipeline loop. [`ReplyReader`] wraps the read half
//! with an accumulator and decodes exactly one reply per call, refilling
//! from the socket while the codec reports incomplete data.

use std::io;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, tcp};
#[cfg(unix)]
use tokio::net::{UnixStream, unix};

use redpipe_proto::Value;

use crate::Reply;
use crate::config::Target;
use crate::error::Error;

/// Initial capacity of the reply accumulator.
const READ_BUFFER_CAPACITY: usize = 4096;

pub(crate) enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Transport {
    /// Open a transport for `target`. TCP connections get TCP_NODELAY:
    /// the whole point of this client is many small pipelined writes.
    pub(crate) async fn connect(target: &Target) -> io::Result<Self> {
        match target {
            Target::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                Ok(Transport::Tcp(stream))
            }
            #[cfg(unix)]
            Target::Unix { path } => Ok(Transport::Unix(UnixStream::connect(path).await?)),
            #[cfg(not(unix))]
            Target::Unix { .. } => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            )),
        }
    }

    pub(crate) fn split(self) -> (ReadHalf, WriteHalf) {
        match self {
            Transport::Tcp(stream) => {
                let (read, write) = stream.into_split();
                (ReadHalf::Tcp(read), WriteHalf::Tcp(write))
            }
            #[cfg(unix)]
            Transport::Unix(stream) => {
                let (read, write) = stream.into_split();
                (ReadHalf::Unix(read), WriteHalf::Unix(write))
            }
        }
    }
}

pub(crate) enum ReadHalf {
    Tcp(tcp::OwnedReadHalf),
    #[cfg(unix)]
    Unix(unix::OwnedReadHalf),
    #[cfg(test)]
    Mem(tokio::io::DuplexStream),
}

impl ReadHalf {
    async fn fill(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            ReadHalf::Tcp(half) => half.read_buf(buf).await,
            #[cfg(unix)]
            ReadHalf::Unix(half) => half.read_buf(buf).await,
            #[cfg(test)]
            ReadHalf::Mem(stream) => stream.read_buf(buf).await,
        }
    }
}

pub(crate) enum WriteHalf {
    Tcp(tcp::OwnedWriteHalf),
    #[cfg(unix)]
    Unix(unix::OwnedWriteHalf),
    #[cfg(test)]
    Scripted(ScriptedWriter),
}

impl WriteHalf {
    pub(crate) async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            WriteHalf::Tcp(half) => half.write_all(data).await,
            #[cfg(unix)]
            WriteHalf::Unix(half) => half.write_all(data).await,
            #[cfg(test)]
            WriteHalf::Scripted(writer) => writer.write_all(data),
        }
    }

    #[cfg(test)]
    pub(crate) fn frames(&self) -> &[Vec<u8>] {
        match self {
            WriteHalf::Scripted(writer) => &writer.frames,
            _ => panic!("not a scripted writer"),
        }
    }
}

/// Write half that records frames and fails a scripted attempt, for
/// exercising the write pipeline's partial-failure accounting.
#[cfg(test)]
pub(crate) struct ScriptedWriter {
    frames: Vec<Vec<u8>>,
    attempts: usize,
    fail_on: Option<usize>,
}

#[cfg(test)]
impl ScriptedWriter {
    pub(crate) fn reliable() -> Self {
        Self {
            frames: Vec::new(),
            attempts: 0,
            fail_on: None,
        }
    }

    /// Fail the zero-based `attempt`-th write; every other attempt
    /// succeeds.
    pub(crate) fn failing_on(attempt: usize) -> Self {
        Self {
            frames: Vec::new(),
            attempts: 0,
            fail_on: Some(attempt),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let attempt = self.attempts;
        self.attempts += 1;
        if self.fail_on == Some(attempt) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted write failure",
            ));
        }
        self.frames.push(data.to_vec());
        Ok(())
    }
}

/// Buffered reply decoder over the read half.
pub(crate) struct ReplyReader {
    half: ReadHalf,
    buf: BytesMut,
}

impl ReplyReader {
    pub(crate) fn new(half: ReadHalf) -> Self {
        Self {
            half,
            buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        }
    }

    /// Decode the next reply off the wire.
    ///
    /// EOF is a connection loss even when it lands on a clean reply
    /// boundary: this is only called while a reply is owed.
    pub(crate) async fn read_reply(&mut self) -> Result<Reply, Error> {
        loop {
            if !self.buf.is_empty() {
                match Value::parse(&self.buf) {
                    Ok((value, consumed)) => {
                        self.buf.advance(consumed);
                        return Ok(value);
                    }
                    Err(e) if e.is_incomplete() => {}
                    Err(e) => return Err(Error::Protocol(e)),
                }
            }
            if self.half.fill(&mut self.buf).await? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[tokio::test]
    async fn reader_reassembles_a_reply_split_across_reads() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = ReplyReader::new(ReadHalf::Mem(client));

        server.write_all(b"$5\r\nhel").await.unwrap();
        let pending = tokio::spawn(async move { reader.read_reply().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        server.write_all(b"lo\r\n").await.unwrap();

        let reply = pending.await.unwrap().unwrap();
        assert_eq!(reply, Value::bulk_string(b"hello"));
    }

    #[tokio::test]
    async fn reader_returns_consecutive_replies() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = ReplyReader::new(ReadHalf::Mem(client));
        server.write_all(b"+OK\r\n:7\r\n").await.unwrap();

        assert_eq!(
            reader.read_reply().await.unwrap(),
            Value::simple_string(b"OK")
        );
        assert_eq!(reader.read_reply().await.unwrap(), Value::integer(7));
    }

    #[tokio::test]
    async fn reader_reports_eof_as_connection_closed() {
        let (client, server) = tokio::io::duplex(64);
        let mut reader = ReplyReader::new(ReadHalf::Mem(client));
        drop(server);

        assert!(matches!(
            reader.read_reply().await.unwrap_err(),
            Error::ConnectionClosed
        ));
    }

    #[tokio::test]
    async fn reader_rejects_a_malformed_prefix() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = ReplyReader::new(ReadHalf::Mem(client));
        server.write_all(b"@whoops\r\n").await.unwrap();

        assert!(matches!(
            reader.read_reply().await.unwrap_err(),
            Error::Protocol(_)
        ));
    }
}
