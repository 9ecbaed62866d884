//! RESP2 value types and parsing/encoding.
//!
//! RESP2 defines the following value types:
//! - Simple String: `+OK\r\n`
//! - Error: `-ERR message\r\n`
//! - Integer: `:1000\r\n`
//! - Bulk String: `$6\r\nfoobar\r\n`
//! - Null Bulk String: `$-1\r\n`
//! - Array: `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`
//! - Null Array: `*-1\r\n`
//!
//! Both null forms parse to [`Value::Null`]; encoding a null produces the
//! bulk form.

use bytes::Bytes;

use crate::error::ParseError;

/// Default maximum number of elements in a single array.
///
/// This limit prevents a malicious peer from announcing an array with
/// billions of elements and triggering a massive up-front allocation.
pub const DEFAULT_MAX_ARRAY_ELEMENTS: usize = 1024;

/// Default maximum size of a bulk string in bytes (1MB).
pub const DEFAULT_MAX_BULK_LEN: usize = 1024 * 1024;

/// Default maximum nesting depth for arrays.
///
/// Replies rarely exceed 2-3 levels of nesting; the limit keeps a hostile
/// peer from forcing deep recursion.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Default maximum total elements across all arrays in a single parse.
///
/// Without this cap, nested arrays could cost up to
/// `max_array_elements ^ max_depth` cumulative `Vec::with_capacity` calls.
pub const DEFAULT_MAX_TOTAL_ITEMS: usize = 1024;

/// Limits applied while parsing a value.
///
/// More restrictive limits give better protection against resource
/// exhaustion from a misbehaving server.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Maximum number of elements in a single array.
    pub max_array_elements: usize,
    /// Maximum size of a bulk string in bytes.
    pub max_bulk_len: usize,
    /// Maximum nesting depth for arrays.
    pub max_depth: usize,
    /// Maximum total elements across all arrays in a single parse.
    pub max_total_items: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseOptions {
    /// Create parse options with default limits.
    pub const fn new() -> Self {
        Self {
            max_array_elements: DEFAULT_MAX_ARRAY_ELEMENTS,
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
            max_total_items: DEFAULT_MAX_TOTAL_ITEMS,
        }
    }

    /// Set the maximum array element count.
    pub const fn max_array_elements(mut self, count: usize) -> Self {
        self.max_array_elements = count;
        self
    }

    /// Set the maximum bulk string length.
    pub const fn max_bulk_len(mut self, len: usize) -> Self {
        self.max_bulk_len = len;
        self
    }

    /// Set the maximum nesting depth.
    pub const fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the maximum total elements across all arrays.
    pub const fn max_total_items(mut self, count: usize) -> Self {
        self.max_total_items = count;
        self
    }
}

/// A RESP2 protocol value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Simple string: `+OK\r\n`
    SimpleString(Bytes),
    /// Error: `-ERR message\r\n`
    Error(Bytes),
    /// Integer: `:1000\r\n`
    Integer(i64),
    /// Bulk string: `$6\r\nfoobar\r\n`
    BulkString(Bytes),
    /// Null value: `$-1\r\n` or `*-1\r\n`
    Null,
    /// Array: `*2\r\n...`
    Array(Vec<Value>),
}

impl Value {
    // ── Constructors ────────────────────────────────────────────────────

    /// Create a simple string value.
    #[inline]
    pub fn simple_string(s: &[u8]) -> Self {
        Value::SimpleString(Bytes::copy_from_slice(s))
    }

    /// Create an error value.
    #[inline]
    pub fn error(msg: &[u8]) -> Self {
        Value::Error(Bytes::copy_from_slice(msg))
    }

    /// Create an integer value.
    #[inline]
    pub fn integer(n: i64) -> Self {
        Value::Integer(n)
    }

    /// Create a bulk string value.
    #[inline]
    pub fn bulk_string(data: &[u8]) -> Self {
        Value::BulkString(Bytes::copy_from_slice(data))
    }

    /// Create a null value.
    #[inline]
    pub fn null() -> Self {
        Value::Null
    }

    /// Create an array value.
    #[inline]
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(elements)
    }

    // ── Type checks ─────────────────────────────────────────────────────

    /// Returns true if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this is an error value.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Returns the value as bytes if it's a string type (simple, bulk, or error).
    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::SimpleString(s) | Value::BulkString(s) | Value::Error(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an integer.
    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as an array.
    #[inline]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    // ── Parsing ─────────────────────────────────────────────────────────

    /// Parse a RESP value from a byte buffer.
    ///
    /// Returns the parsed value and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Incomplete`] if more data is needed to
    /// complete parsing, and other errors for malformed data.
    #[inline]
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        Self::parse_with_options(data, &ParseOptions::new())
    }

    /// Parse a RESP value with custom limits.
    pub fn parse_with_options(
        data: &[u8],
        options: &ParseOptions,
    ) -> Result<(Self, usize), ParseError> {
        let mut total_items = 0;
        Self::parse_at(data, options, 0, &mut total_items)
    }

    /// Internal parsing function that tracks nesting depth and total items.
    fn parse_at(
        data: &[u8],
        options: &ParseOptions,
        depth: usize,
        total_items: &mut usize,
    ) -> Result<(Self, usize), ParseError> {
        if data.is_empty() {
            return Err(ParseError::Incomplete);
        }

        match data[0] {
            b'+' => {
                let (line, consumed) = parse_line(data)?;
                Ok((Value::SimpleString(Bytes::copy_from_slice(line)), consumed))
            }
            b'-' => {
                let (line, consumed) = parse_line(data)?;
                Ok((Value::Error(Bytes::copy_from_slice(line)), consumed))
            }
            b':' => {
                let (n, consumed) = parse_int_line(data)?;
                Ok((Value::Integer(n), consumed))
            }
            b'$' => parse_bulk_string(data, options),
            b'*' => parse_array(data, options, depth, total_items),
            other => Err(ParseError::InvalidPrefix(other)),
        }
    }

    // ── Encoding ────────────────────────────────────────────────────────

    /// Encode this value into a byte buffer.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is too small. Use [`encoded_len`](Value::encoded_len)
    /// to size it.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        match self {
            Value::SimpleString(s) => encode_line(buf, b'+', s),
            Value::Error(msg) => encode_line(buf, b'-', msg),
            Value::Integer(n) => {
                let mut digits = itoa::Buffer::new();
                encode_line(buf, b':', digits.format(*n).as_bytes())
            }
            Value::BulkString(data) => {
                let mut digits = itoa::Buffer::new();
                let mut pos = encode_line(buf, b'$', digits.format(data.len()).as_bytes());
                buf[pos..pos + data.len()].copy_from_slice(data);
                pos += data.len();
                buf[pos..pos + 2].copy_from_slice(b"\r\n");
                pos + 2
            }
            Value::Null => {
                buf[..5].copy_from_slice(b"$-1\r\n");
                5
            }
            Value::Array(elements) => {
                let mut digits = itoa::Buffer::new();
                let mut pos = encode_line(buf, b'*', digits.format(elements.len()).as_bytes());
                for element in elements {
                    pos += element.encode(&mut buf[pos..]);
                }
                pos
            }
        }
    }

    /// Calculate the encoded length of this value.
    pub fn encoded_len(&self) -> usize {
        let mut digits = itoa::Buffer::new();
        match self {
            Value::SimpleString(s) => 1 + s.len() + 2,
            Value::Error(msg) => 1 + msg.len() + 2,
            Value::Integer(n) => 1 + digits.format(*n).len() + 2,
            Value::BulkString(data) => {
                1 + digits.format(data.len()).len() + 2 + data.len() + 2
            }
            Value::Null => 5,
            Value::Array(elements) => {
                let header = 1 + digits.format(elements.len()).len() + 2;
                header + elements.iter().map(|e| e.encoded_len()).sum::<usize>()
            }
        }
    }
}

// ── Parsing helpers ─────────────────────────────────────────────────────

/// Find the position of \r\n in the data.
#[inline]
fn find_crlf(data: &[u8]) -> Option<usize> {
    memchr::memchr(b'\r', data).and_then(|pos| {
        if pos + 1 < data.len() && data[pos + 1] == b'\n' {
            Some(pos)
        } else {
            None
        }
    })
}

/// Split off one CRLF-terminated line after the prefix byte.
///
/// Returns the line content (prefix and CRLF excluded) and the total
/// bytes consumed including both.
fn parse_line(data: &[u8]) -> Result<(&[u8], usize), ParseError> {
    let end = find_crlf(data).ok_or(ParseError::Incomplete)?;
    Ok((&data[1..end], end + 2))
}

/// Parse a line holding a decimal integer: `:1000\r\n`, `$6\r\n`, `*2\r\n`.
fn parse_int_line(data: &[u8]) -> Result<(i64, usize), ParseError> {
    let (line, consumed) = parse_line(data)?;
    let s =
        std::str::from_utf8(line).map_err(|e| ParseError::InvalidInteger(e.to_string()))?;
    let n: i64 = s
        .parse()
        .map_err(|e: std::num::ParseIntError| ParseError::InvalidInteger(e.to_string()))?;
    Ok((n, consumed))
}

/// Parse a bulk string: $6\r\nfoobar\r\n or $-1\r\n
fn parse_bulk_string(data: &[u8], options: &ParseOptions) -> Result<(Value, usize), ParseError> {
    let (len, header) = parse_int_line(data)?;
    if len < 0 {
        return Ok((Value::Null, header));
    }

    let len = len as usize;
    if len > options.max_bulk_len {
        return Err(ParseError::BulkTooLong {
            len,
            max: options.max_bulk_len,
        });
    }

    let data_end = header + len;
    if data.len() < data_end + 2 {
        return Err(ParseError::Incomplete);
    }
    if data[data_end] != b'\r' || data[data_end + 1] != b'\n' {
        return Err(ParseError::Protocol("missing trailing CRLF".to_string()));
    }

    let content = Bytes::copy_from_slice(&data[header..data_end]);
    Ok((Value::BulkString(content), data_end + 2))
}

/// Parse an array: *2\r\n... or *-1\r\n
fn parse_array(
    data: &[u8],
    options: &ParseOptions,
    depth: usize,
    total_items: &mut usize,
) -> Result<(Value, usize), ParseError> {
    if depth >= options.max_depth {
        return Err(ParseError::NestingTooDeep(depth));
    }

    let (len, header) = parse_int_line(data)?;
    if len < 0 {
        return Ok((Value::Null, header));
    }

    let len = len as usize;
    if len > options.max_array_elements {
        return Err(ParseError::ArrayTooLarge(len));
    }

    *total_items = total_items
        .checked_add(len)
        .ok_or(ParseError::ArrayTooLarge(usize::MAX))?;
    if *total_items > options.max_total_items {
        return Err(ParseError::ArrayTooLarge(*total_items));
    }

    let mut pos = header;
    let mut elements = Vec::with_capacity(len);

    for _ in 0..len {
        if pos >= data.len() {
            return Err(ParseError::Incomplete);
        }
        let (value, consumed) = Value::parse_at(&data[pos..], options, depth + 1, total_items)?;
        elements.push(value);
        pos += consumed;
    }

    Ok((Value::Array(elements), pos))
}

// ── Encoding helpers ────────────────────────────────────────────────────

/// Encode a prefix byte, a payload, and the trailing CRLF.
fn encode_line(buf: &mut [u8], prefix: u8, payload: &[u8]) -> usize {
    buf[0] = prefix;
    buf[1..1 + payload.len()].copy_from_slice(payload);
    buf[1 + payload.len()..3 + payload.len()].copy_from_slice(b"\r\n");
    3 + payload.len()
}
