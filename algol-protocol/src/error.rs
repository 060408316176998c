//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur while framing or parsing messages.
///
/// A decoder that simply needs more bytes does not produce an error; it
/// reports `Ok(None)` instead.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("identifier too long: {size} bytes (max {max})")]
    IdentifierTooLong { size: u32, max: u32 },

    #[error("invalid feedback value: {0}")]
    InvalidFeedback(u8),

    #[error("malformed frame: expected separator at offset {offset}, got {found:#04x}")]
    MalformedFrame { offset: usize, found: u8 },

    #[error("invalid frame footer: {0:?}")]
    InvalidFooter([u8; 4]),

    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("invalid property pair count: {0}")]
    OddPropertyCount(usize),

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("missing required property: {0}")]
    MissingField(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns whether this error was produced by a malformed frame on the wire.
    ///
    /// There is no resynchronisation point in the framing, so a connection
    /// that sees one of these must be closed.
    pub fn is_malformed_frame(&self) -> bool {
        !matches!(self, ProtocolError::MissingField(_) | ProtocolError::Io(_))
    }
}
