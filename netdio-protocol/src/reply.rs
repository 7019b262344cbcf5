//! Typed interpretation of reply payloads.

use crate::command::Command;
use crate::error::ProtocolError;
use crate::frame::Frame;
use bytes::Bytes;
use std::net::Ipv4Addr;

/// A decoded reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// 24-bit digital value (pins, latch, or direction configuration).
    Digital(u32),
    /// 32-bit event counter.
    Counter(u32),
    /// 16-bit device status word.
    DeviceStatus(u16),
    /// Current network configuration.
    NetworkConfig {
        ip: Ipv4Addr,
        subnet: Ipv4Addr,
        gateway: Ipv4Addr,
    },
    /// Memory dump returned by one of the memory reads.
    Memory(Bytes),
    /// Commands whose replies carry no payload.
    Ack,
}

impl Reply {
    /// Interprets a reply frame's payload per its command.
    ///
    /// Expects a success reply; error replies carry no payload and should
    /// be handled before interpretation.
    pub fn interpret(frame: &Frame) -> Result<Reply, ProtocolError> {
        match frame.command() {
            Command::DigitalIn | Command::DigitalOutRead | Command::DigitalConfRead => {
                Ok(Reply::Digital(frame.read_value(0, 3)?))
            }
            Command::CounterRead => Ok(Reply::Counter(frame.read_value(0, 4)?)),
            Command::Status => Ok(Reply::DeviceStatus(frame.read_value(0, 2)? as u16)),
            Command::NetworkConf => {
                let payload = frame.payload();
                if payload.len() < 12 {
                    return Err(ProtocolError::ShortPayload {
                        expected: 12,
                        actual: payload.len(),
                    });
                }
                // Three IPv4 addresses, octets in address order.
                let octets = |at: usize| {
                    Ipv4Addr::new(payload[at], payload[at + 1], payload[at + 2], payload[at + 3])
                };
                Ok(Reply::NetworkConfig {
                    ip: octets(0),
                    subnet: octets(4),
                    gateway: octets(8),
                })
            }
            cmd if cmd.is_memory_read() => Ok(Reply::Memory(frame.payload().clone())),
            _ => Ok(Reply::Ack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Status;
    use crate::frame::{encode_reply_into, MAX_FRAME_LEN};

    fn reply(command: Command, data: &[u8]) -> Frame {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = encode_reply_into(&mut buf, command, 1, Status::Success, data).unwrap();
        Frame::parse(&buf[..n]).unwrap()
    }

    #[test]
    fn test_interpret_digital() {
        let frame = reply(Command::DigitalIn, &[0x03, 0x02, 0x01]);
        assert_eq!(Reply::interpret(&frame).unwrap(), Reply::Digital(0x010203));
    }

    #[test]
    fn test_interpret_counter() {
        let frame = reply(Command::CounterRead, &[0x10, 0x20, 0x30, 0x40]);
        assert_eq!(Reply::interpret(&frame).unwrap(), Reply::Counter(0x40302010));
    }

    #[test]
    fn test_interpret_status() {
        let frame = reply(Command::Status, &[0x34, 0x12]);
        assert_eq!(
            Reply::interpret(&frame).unwrap(),
            Reply::DeviceStatus(0x1234)
        );
    }

    #[test]
    fn test_interpret_network_conf() {
        let frame = reply(
            Command::NetworkConf,
            &[192, 168, 0, 101, 255, 255, 255, 0, 192, 168, 0, 1],
        );
        assert_eq!(
            Reply::interpret(&frame).unwrap(),
            Reply::NetworkConfig {
                ip: Ipv4Addr::new(192, 168, 0, 101),
                subnet: Ipv4Addr::new(255, 255, 255, 0),
                gateway: Ipv4Addr::new(192, 168, 0, 1),
            }
        );
    }

    #[test]
    fn test_interpret_memory() {
        let data = [0xAA; 16];
        let frame = reply(Command::ConfigMemRead, &data);
        match Reply::interpret(&frame).unwrap() {
            Reply::Memory(bytes) => assert_eq!(bytes.as_ref(), &data),
            other => panic!("expected memory dump, got {:?}", other),
        }
    }

    #[test]
    fn test_interpret_ack() {
        let frame = reply(Command::DigitalOutWrite, &[]);
        assert_eq!(Reply::interpret(&frame).unwrap(), Reply::Ack);
    }

    #[test]
    fn test_short_payload_rejected() {
        let frame = reply(Command::CounterRead, &[1, 2]);
        assert_eq!(
            Reply::interpret(&frame),
            Err(ProtocolError::ShortPayload {
                expected: 4,
                actual: 2,
            })
        );
    }
}
