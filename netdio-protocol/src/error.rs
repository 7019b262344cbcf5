//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors raised by framing, encoding, and interpretation.
///
/// Only `BufferTooSmall` and `TruncatedFrame` describe retryable
/// conditions (grow the destination buffer, or wait for more bytes from
/// the transport); every other variant is surfaced to the caller for an
/// explicit policy decision.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("destination buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("truncated frame: need {needed} more bytes")]
    TruncatedFrame { needed: usize },

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("unsupported command byte: {0:#04x}")]
    UnsupportedCommand(u8),

    #[error("unsupported status byte: {0:#04x}")]
    UnsupportedStatus(u8),

    #[error("declared data length {len} exceeds protocol maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("scalar fields are at most 4 bytes wide, got {bytes}")]
    ValueTooWide { bytes: usize },

    #[error("invalid memory range: address {address:#06x}, count {count}")]
    InvalidRange { address: u16, count: u16 },

    #[error("payload too short: expected {expected} bytes at least, got {actual}")]
    ShortPayload { expected: usize, actual: usize },

    #[error("malformed discovery reply")]
    InvalidDiscoveryReply,

    #[error("malformed admission reply")]
    InvalidAdmissionReply,
}
