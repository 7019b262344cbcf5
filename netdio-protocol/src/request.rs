//! Request encoding.
//!
//! One [`Request`] variant per logical device command. Encoding writes a
//! complete frame into a caller-provided buffer and advances the
//! caller-owned [`FrameId`] counter, so the reply can later be correlated
//! by its echoed frame id.

use crate::command::{Command, MemoryRegion, Status};
use crate::error::ProtocolError;
use crate::frame::{
    checksum, CHECKSUM_LEN, HEADER_LEN, IDX_COMMAND, IDX_DATA, IDX_FRAME_ID, IDX_LEN_HIGH,
    IDX_LEN_LOW, IDX_START, IDX_STATUS, START_BYTE,
};
use bytes::Bytes;

/// The key pair that arms a reset into the bootloader.
const FIRMWARE_KEY: [u8; 2] = [0xAD, 0xAD];

/// Caller-owned frame-id counter, one per session. Wraps at 256.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameId(u8);

impl FrameId {
    pub fn new(start: u8) -> Self {
        FrameId(start)
    }

    /// The id the next encoded request will carry.
    pub fn current(&self) -> u8 {
        self.0
    }

    /// Returns the current id and advances the counter.
    pub fn next(&mut self) -> u8 {
        let id = self.0;
        self.0 = self.0.wrapping_add(1);
        id
    }
}

/// A request to the device, one variant per logical command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Read the DIO pins (24 bits).
    DigitalIn,
    /// Read the DIO latch value.
    DigitalOutRead,
    /// Write the DIO latch value through a 24-bit mask.
    DigitalOutWrite { mask: u32, value: u32 },
    /// Read the DIO direction configuration.
    DigitalConfRead,
    /// Write the DIO direction configuration through a 24-bit mask.
    DigitalConfWrite { mask: u32, value: u32 },
    /// Read the event counter.
    CounterRead,
    /// Reset the event counter to zero.
    CounterReset,
    /// Blink the device LED `count` times.
    BlinkLed { count: u8 },
    /// Reset the device.
    Reset,
    /// Read the device status word.
    Status,
    /// Read the current IP address, subnet mask, and gateway.
    NetworkConf,
    /// Reset into the bootloader for a firmware upgrade.
    Firmware,
    /// Read `count` bytes at `address` from a memory region. The range is
    /// validated by the device, not at encode time.
    MemRead {
        region: MemoryRegion,
        address: u16,
        count: u16,
    },
    /// Write `data` at `address` into a memory region. The range is
    /// validated at encode time.
    MemWrite {
        region: MemoryRegion,
        address: u16,
        data: Bytes,
    },
}

impl Request {
    /// The wire command this request encodes to.
    pub fn command(&self) -> Command {
        match self {
            Request::DigitalIn => Command::DigitalIn,
            Request::DigitalOutRead => Command::DigitalOutRead,
            Request::DigitalOutWrite { .. } => Command::DigitalOutWrite,
            Request::DigitalConfRead => Command::DigitalConfRead,
            Request::DigitalConfWrite { .. } => Command::DigitalConfWrite,
            Request::CounterRead => Command::CounterRead,
            Request::CounterReset => Command::CounterReset,
            Request::BlinkLed { .. } => Command::BlinkLed,
            Request::Reset => Command::Reset,
            Request::Status => Command::Status,
            Request::NetworkConf => Command::NetworkConf,
            Request::Firmware => Command::Firmware,
            Request::MemRead { region, .. } => region.read_command(),
            Request::MemWrite { region, .. } => region.write_command(),
        }
    }

    /// Payload length of the encoded frame.
    pub fn data_len(&self) -> usize {
        match self {
            Request::DigitalOutWrite { .. } | Request::DigitalConfWrite { .. } => 6,
            Request::BlinkLed { .. } => 1,
            Request::Firmware => 2,
            Request::MemRead { .. } => 4,
            Request::MemWrite { data, .. } => 2 + data.len(),
            _ => 0,
        }
    }

    /// Total length of the encoded frame: header, payload, checksum.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.data_len() + CHECKSUM_LEN
    }

    /// Encodes this request into `buf` using (and advancing) the session's
    /// frame-id counter.
    ///
    /// On any error nothing has been written and the counter is untouched;
    /// on success the counter has advanced exactly once and the total
    /// frame length is returned.
    pub fn encode_into(&self, buf: &mut [u8], id: &mut FrameId) -> Result<usize, ProtocolError> {
        if let Request::MemWrite {
            region,
            address,
            data,
        } = self
        {
            if data.len() > region.max_transfer() as usize {
                return Err(ProtocolError::PayloadTooLarge {
                    len: data.len(),
                    max: region.max_transfer() as usize,
                });
            }
            region.validate_range(*address, data.len() as u16)?;
        }

        let total = self.encoded_len();
        if buf.len() < total {
            return Err(ProtocolError::BufferTooSmall {
                needed: total,
                available: buf.len(),
            });
        }

        // Payload lands before the header fields are stamped.
        match self {
            Request::DigitalOutWrite { mask, value }
            | Request::DigitalConfWrite { mask, value } => {
                let mask = mask.to_le_bytes();
                let value = value.to_le_bytes();
                buf[IDX_DATA..IDX_DATA + 3].copy_from_slice(&mask[..3]);
                buf[IDX_DATA + 3..IDX_DATA + 6].copy_from_slice(&value[..3]);
            }
            Request::BlinkLed { count } => {
                buf[IDX_DATA] = *count;
            }
            Request::Firmware => {
                buf[IDX_DATA..IDX_DATA + 2].copy_from_slice(&FIRMWARE_KEY);
            }
            Request::MemRead { address, count, .. } => {
                buf[IDX_DATA..IDX_DATA + 2].copy_from_slice(&address.to_le_bytes());
                buf[IDX_DATA + 2..IDX_DATA + 4].copy_from_slice(&count.to_le_bytes());
            }
            Request::MemWrite { address, data, .. } => {
                buf[IDX_DATA..IDX_DATA + 2].copy_from_slice(&address.to_le_bytes());
                buf[IDX_DATA + 2..IDX_DATA + 2 + data.len()].copy_from_slice(data);
            }
            _ => {}
        }

        buf[IDX_START] = START_BYTE;
        buf[IDX_COMMAND] = self.command().code();
        buf[IDX_FRAME_ID] = id.next();
        buf[IDX_STATUS] = Status::Success as u8;
        let len = (self.data_len() as u16).to_le_bytes();
        buf[IDX_LEN_LOW] = len[0];
        buf[IDX_LEN_HIGH] = len[1];
        buf[total - 1] = checksum(&buf[..total - 1]);
        Ok(total)
    }
}
