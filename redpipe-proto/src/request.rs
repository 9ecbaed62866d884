//! Client-side request encoding.
//!
//! Commands are encoded as RESP arrays of bulk strings. [`Request`]
//! borrows its arguments, so building one costs a small `Vec` of slices
//! and encoding is a single pass over them.

/// A request builder for encoding commands.
///
/// # Example
///
/// ```
/// use redpipe_proto::Request;
///
/// let request = Request::cmd(b"HSET").arg(b"key").arg(b"field").arg(b"value");
/// let mut buf = vec![0u8; request.encoded_len()];
/// request.encode(&mut buf);
/// ```
#[derive(Debug, Clone)]
pub struct Request<'a> {
    args: Vec<&'a [u8]>,
}

impl<'a> Request<'a> {
    /// Create a new request with the given arguments.
    #[inline]
    pub fn new(args: Vec<&'a [u8]>) -> Self {
        Self { args }
    }

    /// Create a custom command with arbitrary arguments.
    #[inline]
    pub fn cmd(name: &'a [u8]) -> Self {
        Self { args: vec![name] }
    }

    /// Add an argument to the command.
    #[inline]
    pub fn arg(mut self, arg: &'a [u8]) -> Self {
        self.args.push(arg);
        self
    }

    /// Create a PING command.
    #[inline]
    pub fn ping() -> Self {
        Self {
            args: vec![b"PING"],
        }
    }

    /// Create a GET command.
    #[inline]
    pub fn get(key: &'a [u8]) -> Self {
        Self {
            args: vec![b"GET", key],
        }
    }

    /// Create a SET command.
    #[inline]
    pub fn set(key: &'a [u8], value: &'a [u8]) -> Self {
        Self {
            args: vec![b"SET", key, value],
        }
    }

    /// Create a DEL command.
    #[inline]
    pub fn del(key: &'a [u8]) -> Self {
        Self {
            args: vec![b"DEL", key],
        }
    }

    /// Create an AUTH command (`AUTH password`).
    #[inline]
    pub fn auth(password: &'a [u8]) -> Self {
        Self {
            args: vec![b"AUTH", password],
        }
    }

    /// Create an AUTH command with a username (`AUTH username password`).
    #[inline]
    pub fn auth_user(username: &'a [u8], password: &'a [u8]) -> Self {
        Self {
            args: vec![b"AUTH", username, password],
        }
    }

    /// Create a SELECT command. `index` is the database index already
    /// rendered as ASCII digits, since SELECT's argv is a byte string on
    /// the wire like any other.
    #[inline]
    pub fn select(index: &'a [u8]) -> Self {
        Self {
            args: vec![b"SELECT", index],
        }
    }

    /// Encode this request into a buffer.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is too small. Use
    /// [`encoded_len`](Request::encoded_len) to size it.
    #[inline]
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        encode_command(buf, &self.args)
    }

    /// Calculate the encoded length of this request.
    pub fn encoded_len(&self) -> usize {
        let mut digits = itoa::Buffer::new();

        // Array header: *<count>\r\n
        let mut len = 1 + digits.format(self.args.len()).len() + 2;

        // Each argument: $<len>\r\n<data>\r\n
        for arg in &self.args {
            len += 1 + digits.format(arg.len()).len() + 2 + arg.len() + 2;
        }

        len
    }
}

/// Encode an argv command as a RESP array of bulk strings.
fn encode_command(buf: &mut [u8], args: &[&[u8]]) -> usize {
    let mut digits = itoa::Buffer::new();

    let count = digits.format(args.len()).as_bytes();
    buf[0] = b'*';
    buf[1..1 + count.len()].copy_from_slice(count);
    let mut pos = 1 + count.len();
    buf[pos..pos + 2].copy_from_slice(b"\r\n");
    pos += 2;

    for arg in args {
        let len = digits.format(arg.len()).as_bytes();
        buf[pos] = b'$';
        pos += 1;
        buf[pos..pos + len.len()].copy_from_slice(len);
        pos += len.len();
        buf[pos..pos + 2].copy_from_slice(b"\r\n");
        pos += 2;
        buf[pos..pos + arg.len()].copy_from_slice(arg);
        pos += arg.len();
        buf[pos..pos + 2].copy_from_slice(b"\r\n");
        pos += 2;
    }

    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_to_vec(request: &Request<'_>) -> Vec<u8> {
        let mut buf = vec![0u8; request.encoded_len()];
        let written = request.encode(&mut buf);
        assert_eq!(written, buf.len());
        buf
    }

    #[test]
    fn encode_ping() {
        assert_eq!(encode_to_vec(&Request::ping()), b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn encode_get() {
        assert_eq!(
            encode_to_vec(&Request::get(b"mykey")),
            b"*2\r\n$3\r\nGET\r\n$5\r\nmykey\r\n"
        );
    }

    #[test]
    fn encode_set() {
        assert_eq!(
            encode_to_vec(&Request::set(b"k", b"v")),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"
        );
    }

    #[test]
    fn encode_custom_command() {
        assert_eq!(
            encode_to_vec(&Request::cmd(b"EXPIRE").arg(b"k").arg(b"60")),
            b"*3\r\n$6\r\nEXPIRE\r\n$1\r\nk\r\n$2\r\n60\r\n"
        );
    }

    #[test]
    fn encode_empty_argument() {
        assert_eq!(
            encode_to_vec(&Request::set(b"k", b"")),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$0\r\n\r\n"
        );
    }

    #[test]
    fn encode_session_setup_commands() {
        assert_eq!(
            encode_to_vec(&Request::auth(b"hunter2")),
            b"*2\r\n$4\r\nAUTH\r\n$7\r\nhunter2\r\n"
        );
        assert_eq!(
            encode_to_vec(&Request::select(b"3")),
            b"*2\r\n$6\r\nSELECT\r\n$1\r\n3\r\n"
        );
    }

    #[test]
    fn encoded_requests_parse_back_as_arrays() {
        use crate::Value;

        let buf = encode_to_vec(&Request::auth_user(b"svc", b"pw"));
        let (value, consumed) = Value::parse(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(
            value,
            Value::array(vec![
                Value::bulk_string(b"AUTH"),
                Value::bulk_string(b"svc"),
                Value::bulk_string(b"pw"),
            ])
        );
    }
}
