//! # algol-protocol
//!
//! Wire protocol implementation for the algol admin console.
//!
//! This crate provides:
//! - The `Message` request/response type with key/value properties
//! - Binary framing with length prefixes, CRC32 validation and a fixed footer
//! - A streaming decoder that handles partial and pipelined frames
//! - Error types and protocol constants

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use frame::{FOOTER, MIN_FRAME_SIZE, SEPARATOR};
pub use message::{Feedback, Message, MessageOptions, DATA_PROPERTY, ERROR_PROPERTY, STATUS_PROPERTY};

/// Default port the admin console listens on.
pub const DEFAULT_PORT: u16 = 60400;

/// Default interface the admin console binds to.
pub const DEFAULT_INTERFACE: &str = "127.0.0.1";

/// Maximum serialized property payload size in bytes.
pub const MAX_PAYLOAD_SIZE: u32 = 65563;

/// Maximum identifier length in bytes.
pub const MAX_IDENTIFIER_SIZE: u32 = 1024;
