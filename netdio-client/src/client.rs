//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use crate::session::Exchange;
use bytes::Bytes;
use netdio_protocol::{MemoryRegion, Reply, Request};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// High-level client for a netdio device.
///
/// Wraps a [`Connection`]; spawn [`Connection::read_loop`] on the inner
/// connection after [`connect`](Client::connect) so replies are
/// dispatched.
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
        }
    }

    /// Performs admission and opens the command session.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Returns the underlying connection (for the background read loop).
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    /// Issues a request and unwraps a successful reply value.
    async fn expect_success(&self, request: Request) -> Result<Reply, ClientError> {
        let Exchange {
            command,
            status,
            reply,
            ..
        } = self.conn.request(request).await?;
        if !status.is_success() {
            return Err(ClientError::Device { command, status });
        }
        reply.ok_or(ClientError::UnexpectedReply)
    }

    // =========================================================================
    // Digital I/O
    // =========================================================================

    /// Reads the 24 DIO pins.
    pub async fn read_digital_in(&self) -> Result<u32, ClientError> {
        match self.expect_success(Request::DigitalIn).await? {
            Reply::Digital(value) => Ok(value),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Reads the DIO latch value.
    pub async fn read_digital_out(&self) -> Result<u32, ClientError> {
        match self.expect_success(Request::DigitalOutRead).await? {
            Reply::Digital(value) => Ok(value),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Writes the DIO latch value through a 24-bit mask.
    pub async fn write_digital_out(&self, mask: u32, value: u32) -> Result<(), ClientError> {
        self.expect_success(Request::DigitalOutWrite { mask, value })
            .await?;
        Ok(())
    }

    /// Reads the DIO direction configuration.
    pub async fn read_digital_conf(&self) -> Result<u32, ClientError> {
        match self.expect_success(Request::DigitalConfRead).await? {
            Reply::Digital(value) => Ok(value),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Writes the DIO direction configuration through a 24-bit mask.
    pub async fn write_digital_conf(&self, mask: u32, value: u32) -> Result<(), ClientError> {
        self.expect_success(Request::DigitalConfWrite { mask, value })
            .await?;
        Ok(())
    }

    // =========================================================================
    // Counter
    // =========================================================================

    /// Reads the event counter.
    pub async fn read_counter(&self) -> Result<u32, ClientError> {
        match self.expect_success(Request::CounterRead).await? {
            Reply::Counter(value) => Ok(value),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Resets the event counter to zero.
    pub async fn reset_counter(&self) -> Result<(), ClientError> {
        self.expect_success(Request::CounterReset).await?;
        Ok(())
    }

    // =========================================================================
    // Memory
    // =========================================================================

    /// Reads `count` bytes at `address` from a memory region.
    pub async fn read_memory(
        &self,
        region: MemoryRegion,
        address: u16,
        count: u16,
    ) -> Result<Bytes, ClientError> {
        let request = Request::MemRead {
            region,
            address,
            count,
        };
        match self.expect_success(request).await? {
            Reply::Memory(data) => Ok(data),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Writes `data` at `address` into a memory region.
    pub async fn write_memory(
        &self,
        region: MemoryRegion,
        address: u16,
        data: Bytes,
    ) -> Result<(), ClientError> {
        self.expect_success(Request::MemWrite {
            region,
            address,
            data,
        })
        .await?;
        Ok(())
    }

    // =========================================================================
    // Miscellaneous
    // =========================================================================

    /// Blinks the device LED `count` times.
    pub async fn blink_led(&self, count: u8) -> Result<(), ClientError> {
        self.expect_success(Request::BlinkLed { count }).await?;
        Ok(())
    }

    /// Reads the device status word.
    pub async fn read_status(&self) -> Result<u16, ClientError> {
        match self.expect_success(Request::Status).await? {
            Reply::DeviceStatus(value) => Ok(value),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Reads the device's IP address, subnet mask, and gateway.
    pub async fn read_network_conf(
        &self,
    ) -> Result<(Ipv4Addr, Ipv4Addr, Ipv4Addr), ClientError> {
        match self.expect_success(Request::NetworkConf).await? {
            Reply::NetworkConfig {
                ip,
                subnet,
                gateway,
            } => Ok((ip, subnet, gateway)),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Resets the device.
    pub async fn reset(&self) -> Result<(), ClientError> {
        self.expect_success(Request::Reset).await?;
        Ok(())
    }

    /// Resets the device into its bootloader for a firmware upgrade.
    ///
    /// The device erases part of its program memory, so new firmware must
    /// be downloaded before it can be used again.
    pub async fn enter_bootloader(&self) -> Result<(), ClientError> {
        self.expect_success(Request::Firmware).await?;
        Ok(())
    }
}
