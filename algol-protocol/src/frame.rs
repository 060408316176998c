//! Binary frame format for admin messages.
//!
//! Frame layout (integers are big-endian):
//!
//! ```text
//! +------------+---------+---------+----------+-------------+-----+
//! | uid_length | uid     | options | feedback | payload_len | ' ' |
//! | 4 bytes    | N bytes | 1 byte  | 1 byte   | 4 bytes     | 1 B |
//! +------------+---------+---------+----------+-------------+-----+
//! | [crc32 | ' ' | payload]   (only when payload_len > 0)          |
//! | 4 bytes| 1 B | payload_len bytes                              |
//! +-----------------------------------------------------------------+
//! | footer "\r\n\r\n" (4 bytes)                                     |
//! +-----------------------------------------------------------------+
//! ```

use crate::error::ProtocolError;
use crate::message::{Feedback, Message, MessageOptions};
use crate::{MAX_IDENTIFIER_SIZE, MAX_PAYLOAD_SIZE};
use bytes::{BufMut, BytesMut};
use crc::{Crc, CRC_32_ISO_HDLC};

/// Sequence terminating every frame.
pub const FOOTER: [u8; 4] = *b"\r\n\r\n";

/// Byte separating the payload length, checksum and payload.
pub const SEPARATOR: u8 = b' ';

/// Size of the header without the identifier bytes (4+1+1+4+1 = 11).
pub const HEADER_SIZE: usize = 11;

/// Smallest possible frame: empty identifier, no payload.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + FOOTER.len();

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Computes the CRC32 used to protect frame payloads.
pub fn checksum(payload: &[u8]) -> u32 {
    CRC32.checksum(payload)
}

/// Encodes a message into a new buffer.
pub fn encode(msg: &Message) -> Result<BytesMut, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(msg, &mut buf)?;
    Ok(buf)
}

/// Appends the encoded frame of `msg` to `buf`.
///
/// An unassigned feedback is written as `ok`. Nothing is written on error.
pub fn encode_into(msg: &Message, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload = msg.payload()?;
    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(ProtocolError::FrameTooLarge {
            size: u32::try_from(payload.len()).unwrap_or(u32::MAX),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let uid = msg.identifier.as_bytes();
    if uid.len() > MAX_IDENTIFIER_SIZE as usize {
        return Err(ProtocolError::IdentifierTooLong {
            size: u32::try_from(uid.len()).unwrap_or(u32::MAX),
            max: MAX_IDENTIFIER_SIZE,
        });
    }

    let feedback = match msg.feedback {
        Feedback::Unassigned => Feedback::Ok,
        other => other,
    };

    let crc_len = if payload.is_empty() { 0 } else { 5 };
    buf.reserve(HEADER_SIZE + uid.len() + crc_len + payload.len() + FOOTER.len());

    buf.put_u32(uid.len() as u32);
    buf.put_slice(uid);
    buf.put_u8(msg.options.bits());
    buf.put_u8(feedback.as_u8());
    buf.put_u32(payload.len() as u32);
    buf.put_u8(SEPARATOR);

    if !payload.is_empty() {
        buf.put_u32(checksum(&payload));
        buf.put_u8(SEPARATOR);
        buf.put_slice(&payload);
    }

    buf.put_slice(&FOOTER);
    Ok(())
}

/// Decodes one frame from the start of `buf`.
///
/// Returns `Ok(Some((message, consumed)))` when a complete frame was parsed,
/// `Ok(None)` if more bytes are needed, or `Err` if the frame is malformed.
/// The input is never modified; callers advance by `consumed` themselves.
pub fn decode(buf: &[u8]) -> Result<Option<(Message, usize)>, ProtocolError> {
    if buf.len() < MIN_FRAME_SIZE {
        return Ok(None);
    }

    let uid_len = read_u32(buf, 0);
    if uid_len > MAX_IDENTIFIER_SIZE {
        return Err(ProtocolError::IdentifierTooLong {
            size: uid_len,
            max: MAX_IDENTIFIER_SIZE,
        });
    }
    let uid_len = uid_len as usize;

    if buf.len() < HEADER_SIZE + uid_len + FOOTER.len() {
        return Ok(None);
    }

    let mut pos = 4;
    let identifier = std::str::from_utf8(&buf[pos..pos + uid_len])
        .map_err(|_| ProtocolError::InvalidUtf8("identifier"))?;
    pos += uid_len;

    let options = MessageOptions::from_bits(buf[pos]);
    let feedback = Feedback::try_from(buf[pos + 1])?;
    pos += 2;

    let length = read_u32(buf, pos);
    if length > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    pos += 4;
    expect_separator(buf, pos)?;
    pos += 1;

    let payload_len = length as usize;
    let mut crc = 0;
    let payload = if payload_len > 0 {
        if buf.len() < pos + 5 + payload_len + FOOTER.len() {
            return Ok(None);
        }

        let crc_expected = read_u32(buf, pos);
        pos += 4;
        expect_separator(buf, pos)?;
        pos += 1;

        let payload = &buf[pos..pos + payload_len];
        pos += payload_len;

        let crc_actual = checksum(payload);
        if crc_actual != crc_expected {
            return Err(ProtocolError::CrcMismatch {
                expected: crc_expected,
                actual: crc_actual,
            });
        }
        crc = crc_actual;
        payload
    } else {
        &[][..]
    };

    let mut footer = [0u8; 4];
    footer.copy_from_slice(&buf[pos..pos + FOOTER.len()]);
    if footer != FOOTER {
        return Err(ProtocolError::InvalidFooter(footer));
    }
    pos += FOOTER.len();

    let mut msg = Message::new(identifier)
        .with_options(options)
        .with_feedback(feedback);
    msg.load_payload(payload)?;
    msg.set_wire_info(length, crc);

    Ok(Some((msg, pos)))
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn expect_separator(buf: &[u8], at: usize) -> Result<(), ProtocolError> {
    match buf[at] {
        SEPARATOR => Ok(()),
        found => Err(ProtocolError::MalformedFrame { offset: at, found }),
    }
}
