//! Encoder and streaming decoder for admin message frames.

use crate::error::ProtocolError;
use crate::frame;
use crate::message::Message;
use bytes::{Buf, BytesMut};

/// Encodes messages into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a message into a frame.
    pub fn encode(msg: &Message) -> Result<BytesMut, ProtocolError> {
        frame::encode(msg)
    }

    /// Appends the frame for `msg` to an existing buffer.
    pub fn encode_into(msg: &Message, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        frame::encode_into(msg, buf)
    }
}

/// Accumulates bytes from a stream and yields complete messages.
///
/// A single read may carry several pipelined frames; call
/// [`Decoder::decode_message`] in a loop until it returns `Ok(None)`.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next message from the buffer.
    ///
    /// On success the frame's bytes are consumed. On error the buffer is left
    /// untouched; the caller is expected to drop the stream.
    pub fn decode_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        match frame::decode(&self.buffer)? {
            Some((msg, consumed)) => {
                self.buffer.advance(consumed);
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
