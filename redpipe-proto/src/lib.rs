//! Client-side RESP2 protocol implementation.
//!
//! This crate provides the two halves of the codec contract a RESP client
//! needs:
//!
//! - **Requests**: encode commands as RESP arrays of bulk strings.
//! - **Values**: parse one reply per call from a byte buffer, reporting
//!   [`ParseError::Incomplete`] when more data is needed so callers can
//!   accumulate and retry.
//!
//! # Example
//!
//! ```
//! use redpipe_proto::{Request, Value};
//!
//! // Encode a GET command.
//! let request = Request::get(b"mykey");
//! let mut buf = vec![0u8; request.encoded_len()];
//! request.encode(&mut buf);
//!
//! // Parse the response.
//! let (value, consumed) = Value::parse(b"+OK\r\n").unwrap();
//! assert_eq!(value, Value::simple_string(b"OK"));
//! assert_eq!(consumed, 5);
//! ```

mod error;
mod request;
mod value;

pub use error::ParseError;
pub use request::Request;
pub use value::{
    DEFAULT_MAX_ARRAY_ELEMENTS, DEFAULT_MAX_BULK_LEN, DEFAULT_MAX_DEPTH, DEFAULT_MAX_TOTAL_ITEMS,
    ParseOptions, Value,
};
