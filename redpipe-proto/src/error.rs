//! Error types for RESP parsing.

/// Error type for RESP parsing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing.
    /// This is not a fatal error - the caller should buffer more data and retry.
    #[error("incomplete data")]
    Incomplete,

    /// Invalid type prefix byte.
    #[error("invalid prefix byte: {0:#04x}")]
    InvalidPrefix(u8),

    /// Invalid integer format.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Protocol violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Array size exceeds the configured limit.
    #[error("array too large: {0} elements exceeds limit")]
    ArrayTooLarge(usize),

    /// Nesting depth exceeds the configured limit.
    #[error("nesting too deep: depth {0} exceeds limit")]
    NestingTooDeep(usize),

    /// Bulk string exceeds the configured size limit.
    #[error("bulk string too long: {len} bytes exceeds {max} byte limit")]
    BulkTooLong { len: usize, max: usize },
}

impl ParseError {
    /// Returns true if this error indicates more data is needed.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_incomplete() {
        assert!(ParseError::Incomplete.is_incomplete());
        assert!(!ParseError::InvalidPrefix(0x00).is_incomplete());
        assert!(!ParseError::InvalidInteger("test".to_string()).is_incomplete());
        assert!(!ParseError::Protocol("test".to_string()).is_incomplete());
        assert!(!ParseError::ArrayTooLarge(100).is_incomplete());
        assert!(!ParseError::NestingTooDeep(9).is_incomplete());
        assert!(!ParseError::BulkTooLong { len: 100, max: 50 }.is_incomplete());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", ParseError::Incomplete), "incomplete data");
        assert_eq!(
            format!("{}", ParseError::InvalidPrefix(0x42)),
            "invalid prefix byte: 0x42"
        );
        assert_eq!(
            format!("{}", ParseError::InvalidInteger("bad".to_string())),
            "invalid integer: bad"
        );
        assert_eq!(
            format!("{}", ParseError::ArrayTooLarge(999999)),
            "array too large: 999999 elements exceeds limit"
        );
        assert_eq!(
            format!("{}", ParseError::BulkTooLong { len: 100, max: 50 }),
            "bulk string too long: 100 bytes exceeds 50 byte limit"
        );
    }
}
