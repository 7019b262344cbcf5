//! Binary frame format for NCP.
//!
//! Frame layout (6 byte header + payload + 1 checksum byte), multi-byte
//! values little-endian:
//!
//! ```text
//! +-------+---------+----------+--------+---------+---------+---------+----------+
//! | start | command | frame id | status | len low | len high| payload | checksum |
//! | 0xDB  | 1 byte  |  1 byte  | 1 byte | 1 byte  | 1 byte  | n bytes |  1 byte  |
//! +-------+---------+----------+--------+---------+---------+---------+----------+
//! ```
//!
//! The checksum byte is chosen so that the sum of every byte in the frame,
//! modulo 256, equals 0xFF. Replies carry the request's command byte with
//! bit 7 set and echo its frame id.

use crate::command::{Command, Status, REPLY_BIT};
use crate::error::ProtocolError;
use bytes::Bytes;

/// Start marker carried by every frame.
pub const START_BYTE: u8 = 0xDB;

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 6;

/// Size of the trailing checksum in bytes.
pub const CHECKSUM_LEN: usize = 1;

/// The minimal frame: header plus checksum, no payload.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + CHECKSUM_LEN;

/// Maximum payload length the protocol allows.
pub const MAX_DATA_LEN: usize = 1024;

/// The largest frame the protocol allows; bounds every connection buffer.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_DATA_LEN + CHECKSUM_LEN;

pub(crate) const IDX_START: usize = 0;
pub(crate) const IDX_COMMAND: usize = 1;
pub(crate) const IDX_FRAME_ID: usize = 2;
pub(crate) const IDX_STATUS: usize = 3;
pub(crate) const IDX_LEN_LOW: usize = 4;
pub(crate) const IDX_LEN_HIGH: usize = 5;
pub(crate) const IDX_DATA: usize = 6;

/// Computes the checksum byte for `bytes` (start marker through the last
/// payload byte): `0xFF - sum(bytes) mod 256`.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0xFFu8.wrapping_sub(sum)
}

/// Reads the declared data length from a buffered header.
pub(crate) fn declared_data_len(buf: &[u8]) -> usize {
    u16::from_le_bytes([buf[IDX_LEN_LOW], buf[IDX_LEN_HIGH]]) as usize
}

/// Confirms that a buffered frame is internally consistent and returns its
/// total length.
///
/// This is the single trust gate before any payload byte is interpreted:
/// the declared data length must fit the available bytes
/// (`TruncatedFrame` otherwise) and the checksum recomputed over the
/// declared span must hold (`ChecksumMismatch` otherwise).
pub fn validate(buf: &[u8]) -> Result<usize, ProtocolError> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(ProtocolError::TruncatedFrame {
            needed: MIN_FRAME_LEN - buf.len(),
        });
    }
    let data_len = declared_data_len(buf);
    if data_len > MAX_DATA_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            len: data_len,
            max: MAX_DATA_LEN,
        });
    }
    let total = HEADER_LEN + data_len + CHECKSUM_LEN;
    if buf.len() < total {
        return Err(ProtocolError::TruncatedFrame {
            needed: total - buf.len(),
        });
    }
    let expected = checksum(&buf[..total - 1]);
    let actual = buf[total - 1];
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }
    Ok(total)
}

/// Encodes a reply frame into `buf`: the request's command byte with the
/// reply bit set, the echoed frame id, a status, and the reply payload.
///
/// The write is capacity-checked up front; on `BufferTooSmall` nothing has
/// been written. Returns the total number of bytes written.
pub fn encode_reply_into(
    buf: &mut [u8],
    command: Command,
    frame_id: u8,
    status: Status,
    data: &[u8],
) -> Result<usize, ProtocolError> {
    if data.len() > MAX_DATA_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            len: data.len(),
            max: MAX_DATA_LEN,
        });
    }
    let total = HEADER_LEN + data.len() + CHECKSUM_LEN;
    if buf.len() < total {
        return Err(ProtocolError::BufferTooSmall {
            needed: total,
            available: buf.len(),
        });
    }
    // Payload lands before the header fields are stamped.
    buf[IDX_DATA..IDX_DATA + data.len()].copy_from_slice(data);
    buf[IDX_START] = START_BYTE;
    buf[IDX_COMMAND] = command.reply_byte();
    buf[IDX_FRAME_ID] = frame_id;
    buf[IDX_STATUS] = status as u8;
    let len = (data.len() as u16).to_le_bytes();
    buf[IDX_LEN_LOW] = len[0];
    buf[IDX_LEN_HIGH] = len[1];
    buf[total - 1] = checksum(&buf[..total - 1]);
    Ok(total)
}

/// A validated, decoded frame. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    is_reply: bool,
    frame_id: u8,
    status: Status,
    payload: Bytes,
}

impl Frame {
    /// Validates and decodes one complete frame from `bytes`.
    ///
    /// Runs [`validate`] first; trailing bytes beyond the declared frame
    /// length are ignored.
    pub fn from_wire(bytes: Bytes) -> Result<Frame, ProtocolError> {
        let total = validate(&bytes)?;
        let raw_command = bytes[IDX_COMMAND];
        let command = Command::try_from(raw_command & !REPLY_BIT)?;
        let status = Status::try_from(bytes[IDX_STATUS])?;
        Ok(Frame {
            command,
            is_reply: raw_command & REPLY_BIT != 0,
            frame_id: bytes[IDX_FRAME_ID],
            status,
            payload: bytes.slice(IDX_DATA..total - CHECKSUM_LEN),
        })
    }

    /// Validates and decodes one complete frame from a borrowed buffer.
    pub fn parse(buf: &[u8]) -> Result<Frame, ProtocolError> {
        Self::from_wire(Bytes::copy_from_slice(buf))
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn is_reply(&self) -> bool {
        self.is_reply
    }

    pub fn frame_id(&self) -> u8 {
        self.frame_id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Extracts a little-endian unsigned integer of 1 to 4 bytes from the
    /// given payload offset.
    ///
    /// Widths over 4 bytes are a caller error (`ValueTooWide`), not a
    /// silent wraparound.
    pub fn read_value(&self, offset: usize, width: usize) -> Result<u32, ProtocolError> {
        if width == 0 || width > 4 {
            return Err(ProtocolError::ValueTooWide { bytes: width });
        }
        let end = offset + width;
        if end > self.payload.len() {
            return Err(ProtocolError::ShortPayload {
                expected: end,
                actual: self.payload.len(),
            });
        }
        let mut value = 0u32;
        for (i, byte) in self.payload[offset..end].iter().enumerate() {
            value |= (*byte as u32) << (8 * i);
        }
        Ok(value)
    }
}
