//! Command codes, status codes, and memory regions.

use crate::error::ProtocolError;
use std::fmt;

/// Bit 7 of the command byte marks a reply.
pub const REPLY_BIT: u8 = 0x80;

/// Device commands with their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    // Digital I/O
    /// Read the DIO pins.
    DigitalIn = 0x00,
    /// Read the DIO latch value.
    DigitalOutRead = 0x02,
    /// Write the DIO latch value.
    DigitalOutWrite = 0x03,
    /// Read the DIO direction configuration.
    DigitalConfRead = 0x04,
    /// Write the DIO direction configuration.
    DigitalConfWrite = 0x05,

    // Counter
    /// Read the event counter.
    CounterRead = 0x30,
    /// Reset the event counter to zero.
    CounterReset = 0x31,

    // Memory
    ConfigMemRead = 0x40,
    ConfigMemWrite = 0x41,
    UserMemRead = 0x42,
    UserMemWrite = 0x43,
    SettingsMemRead = 0x44,
    SettingsMemWrite = 0x45,
    BootMemRead = 0x46,
    BootMemWrite = 0x47,

    // Miscellaneous
    /// Blink the device LED.
    BlinkLed = 0x50,
    /// Reset the device.
    Reset = 0x51,
    /// Read the device status word.
    Status = 0x52,
    /// Read the current network configuration.
    NetworkConf = 0x54,
    /// Reset into the bootloader for a firmware upgrade.
    Firmware = 0x60,
}

impl Command {
    /// The raw wire code (reply bit clear).
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The command byte as carried by a reply frame.
    pub fn reply_byte(self) -> u8 {
        self.code() | REPLY_BIT
    }

    /// Fixed reply payload length, if this command has one.
    ///
    /// The four memory reads return `None`: their reply length comes from
    /// the count field of the request itself.
    pub fn fixed_reply_len(self) -> Option<usize> {
        match self {
            Command::DigitalIn | Command::DigitalOutRead | Command::DigitalConfRead => Some(3),
            Command::CounterRead => Some(4),
            Command::Status => Some(2),
            Command::NetworkConf => Some(12),
            Command::ConfigMemRead
            | Command::UserMemRead
            | Command::SettingsMemRead
            | Command::BootMemRead => None,
            _ => Some(0),
        }
    }

    /// Expected request payload length, or `None` for the variable-length
    /// memory writes (address plus at least one data byte).
    pub fn request_data_len(self) -> Option<usize> {
        match self {
            Command::DigitalOutWrite | Command::DigitalConfWrite => Some(6),
            Command::BlinkLed => Some(1),
            Command::Firmware => Some(2),
            Command::ConfigMemRead
            | Command::UserMemRead
            | Command::SettingsMemRead
            | Command::BootMemRead => Some(4),
            Command::ConfigMemWrite
            | Command::UserMemWrite
            | Command::SettingsMemWrite
            | Command::BootMemWrite => None,
            _ => Some(0),
        }
    }

    /// The memory region addressed by this command, if it is a memory
    /// read or write.
    pub fn memory_region(self) -> Option<MemoryRegion> {
        match self {
            Command::ConfigMemRead | Command::ConfigMemWrite => Some(MemoryRegion::FactoryConfig),
            Command::UserMemRead | Command::UserMemWrite => Some(MemoryRegion::User),
            Command::SettingsMemRead | Command::SettingsMemWrite => Some(MemoryRegion::Settings),
            Command::BootMemRead | Command::BootMemWrite => Some(MemoryRegion::Bootloader),
            _ => None,
        }
    }

    /// Whether this command is one of the four memory reads.
    pub fn is_memory_read(self) -> bool {
        matches!(
            self,
            Command::ConfigMemRead
                | Command::UserMemRead
                | Command::SettingsMemRead
                | Command::BootMemRead
        )
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Command::DigitalIn),
            0x02 => Ok(Command::DigitalOutRead),
            0x03 => Ok(Command::DigitalOutWrite),
            0x04 => Ok(Command::DigitalConfRead),
            0x05 => Ok(Command::DigitalConfWrite),
            0x30 => Ok(Command::CounterRead),
            0x31 => Ok(Command::CounterReset),
            0x40 => Ok(Command::ConfigMemRead),
            0x41 => Ok(Command::ConfigMemWrite),
            0x42 => Ok(Command::UserMemRead),
            0x43 => Ok(Command::UserMemWrite),
            0x44 => Ok(Command::SettingsMemRead),
            0x45 => Ok(Command::SettingsMemWrite),
            0x46 => Ok(Command::BootMemRead),
            0x47 => Ok(Command::BootMemWrite),
            0x50 => Ok(Command::BlinkLed),
            0x51 => Ok(Command::Reset),
            0x52 => Ok(Command::Status),
            0x54 => Ok(Command::NetworkConf),
            0x60 => Ok(Command::Firmware),
            other => Err(ProtocolError::UnsupportedCommand(other)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::DigitalIn => "DIN_R",
            Command::DigitalOutRead => "DOUT_R",
            Command::DigitalOutWrite => "DOUT_W",
            Command::DigitalConfRead => "DCONF_R",
            Command::DigitalConfWrite => "DCONF_W",
            Command::CounterRead => "COUNTER_R",
            Command::CounterReset => "COUNTER_W",
            Command::ConfigMemRead => "CONF_MEM_R",
            Command::ConfigMemWrite => "CONF_MEM_W",
            Command::UserMemRead => "USR_MEM_R",
            Command::UserMemWrite => "USR_MEM_W",
            Command::SettingsMemRead => "SET_MEM_R",
            Command::SettingsMemWrite => "SET_MEM_W",
            Command::BootMemRead => "BOOT_MEM_R",
            Command::BootMemWrite => "BOOT_MEM_W",
            Command::BlinkLed => "BLINKLED",
            Command::Reset => "RESET",
            Command::Status => "STATUS",
            Command::NetworkConf => "NETWORK_CONF",
            Command::Firmware => "FIRMWARE",
        };
        f.write_str(name)
    }
}

/// Reply status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// Command succeeded.
    Success = 0,
    /// The number of data bytes did not match the protocol definition.
    Protocol = 1,
    /// The data contents were invalid.
    Parameter = 2,
    /// The resource was busy.
    Busy = 3,
    /// The resource was not ready.
    NotReady = 4,
    /// The resource timed out.
    Timeout = 5,
    /// Some other error.
    Other = 6,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl TryFrom<u8> for Status {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Status::Success),
            1 => Ok(Status::Protocol),
            2 => Ok(Status::Parameter),
            3 => Ok(Status::Busy),
            4 => Ok(Status::NotReady),
            5 => Ok(Status::Timeout),
            6 => Ok(Status::Other),
            other => Err(ProtocolError::UnsupportedStatus(other)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "SUCCESS",
            Status::Protocol => "ERROR_PROTOCOL",
            Status::Parameter => "ERROR_PARAMETER",
            Status::Busy => "ERROR_BUSY",
            Status::NotReady => "ERROR_READY",
            Status::Timeout => "ERROR_TIMEOUT",
            Status::Other => "ERROR_OTHER",
        };
        f.write_str(name)
    }
}

/// The four disjoint address spaces reachable through the memory commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryRegion {
    /// Nonvolatile factory configuration (serial number, MAC), 16 bytes.
    /// Writes require the 0xAA55 unlock code at address 0x10 first.
    FactoryConfig,
    /// Nonvolatile user memory, 3824 bytes.
    User,
    /// Nonvolatile settings memory (network options, connect code,
    /// latch behavior), 256 bytes. Takes effect after a device reset.
    Settings,
    /// Bootloader FLASH, addressed through a 16-bit window.
    Bootloader,
}

impl MemoryRegion {
    /// Region size in bytes; valid addresses are `0..size`.
    pub fn size(self) -> u32 {
        match self {
            MemoryRegion::FactoryConfig => 0x10,
            MemoryRegion::User => 0xEF0,
            MemoryRegion::Settings => 0x100,
            MemoryRegion::Bootloader => 0x1_0000,
        }
    }

    /// Maximum bytes per read or write request.
    pub fn max_transfer(self) -> u16 {
        match self {
            MemoryRegion::FactoryConfig => 16,
            _ => 1024,
        }
    }

    pub fn read_command(self) -> Command {
        match self {
            MemoryRegion::FactoryConfig => Command::ConfigMemRead,
            MemoryRegion::User => Command::UserMemRead,
            MemoryRegion::Settings => Command::SettingsMemRead,
            MemoryRegion::Bootloader => Command::BootMemRead,
        }
    }

    pub fn write_command(self) -> Command {
        match self {
            MemoryRegion::FactoryConfig => Command::ConfigMemWrite,
            MemoryRegion::User => Command::UserMemWrite,
            MemoryRegion::Settings => Command::SettingsMemWrite,
            MemoryRegion::Bootloader => Command::BootMemWrite,
        }
    }

    /// Validates an address/count pair against this region's bounds and
    /// per-request transfer cap. Checked in u32, so `address + count`
    /// cannot wrap.
    pub fn validate_range(self, address: u16, count: u16) -> Result<(), ProtocolError> {
        if count == 0
            || count > self.max_transfer()
            || address as u32 + count as u32 > self.size()
        {
            return Err(ProtocolError::InvalidRange { address, count });
        }
        Ok(())
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryRegion::FactoryConfig => "factory-config",
            MemoryRegion::User => "user",
            MemoryRegion::Settings => "settings",
            MemoryRegion::Bootloader => "bootloader",
        };
        f.write_str(name)
    }
}
