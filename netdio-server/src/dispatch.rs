//! Command dispatch.
//!
//! For each frame the demultiplexer extracts, the dispatcher determines
//! the reply status and payload, then builds the reply through the
//! capacity-checked encoder: the request's frame id is echoed and the
//! reply bit set on the command byte.

use crate::config::IdentityConfig;
use crate::fault::FaultInjector;
use netdio_protocol::frame::encode_reply_into;
use netdio_protocol::{Command, Frame, ProtocolError, Status};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Builds replies for extracted request frames.
pub struct Dispatcher {
    ip: Ipv4Addr,
    subnet: Ipv4Addr,
    gateway: Ipv4Addr,
    fault: Option<Arc<FaultInjector>>,
}

impl Dispatcher {
    pub fn new(identity: &IdentityConfig) -> Self {
        Self {
            ip: identity.ip,
            subnet: identity.subnet,
            gateway: identity.gateway,
            fault: None,
        }
    }

    /// Attaches a fault injector. Off the injected path, behavior is
    /// unchanged.
    pub fn with_fault(mut self, injector: Arc<FaultInjector>) -> Self {
        self.fault = Some(injector);
        self
    }

    /// Determines the reply status and payload for one request frame.
    fn evaluate(&self, frame: &Frame) -> (Status, Vec<u8>) {
        if let Some(fault) = &self.fault {
            if fault.fire() {
                return (fault.random_status(), Vec::new());
            }
        }

        let command = frame.command();
        let payload_len = frame.payload().len();

        // The data byte count must match the protocol definition for the
        // command; memory writes carry an address plus at least one byte.
        match command.request_data_len() {
            Some(expected) if payload_len != expected => {
                return (Status::Protocol, Vec::new());
            }
            None if payload_len < 3 => {
                return (Status::Protocol, Vec::new());
            }
            _ => {}
        }

        if let Some(region) = command.memory_region() {
            // Payload length was checked above, so this read holds.
            let address = frame.read_value(0, 2).unwrap_or(0) as u16;
            // For writes the data length is inferred from the frame count
            // minus the address field.
            let count = if command.is_memory_read() {
                frame.read_value(2, 2).unwrap_or(0) as u16
            } else {
                (payload_len - 2) as u16
            };
            return match region.validate_range(address, count) {
                Ok(()) if command.is_memory_read() => (Status::Success, pattern(count as usize)),
                Ok(()) => (Status::Success, Vec::new()),
                Err(_) => (Status::Parameter, Vec::new()),
            };
        }

        match command {
            Command::DigitalIn | Command::DigitalOutRead | Command::DigitalConfRead => {
                (Status::Success, pattern(3))
            }
            Command::CounterRead => (Status::Success, pattern(4)),
            Command::Status => (Status::Success, pattern(2)),
            Command::NetworkConf => {
                let mut data = Vec::with_capacity(12);
                data.extend_from_slice(&self.ip.octets());
                data.extend_from_slice(&self.subnet.octets());
                data.extend_from_slice(&self.gateway.octets());
                (Status::Success, data)
            }
            // Writes and one-shot commands acknowledge with an empty
            // payload.
            _ => (Status::Success, Vec::new()),
        }
    }

    /// Builds the reply for `frame` into `out` and returns its length.
    pub fn respond_into(&self, frame: &Frame, out: &mut [u8]) -> Result<usize, ProtocolError> {
        let (status, data) = self.evaluate(frame);
        encode_reply_into(out, frame.command(), frame.frame_id(), status, &data)
    }
}

/// Builds the protocol-error reply sent for a frame that failed checksum
/// validation, echoing the buffered header's command byte and frame id.
pub fn protocol_error_reply_into(
    out: &mut [u8],
    raw_command: u8,
    frame_id: u8,
) -> Result<usize, ProtocolError> {
    let command = Command::try_from(raw_command)?;
    encode_reply_into(out, command, frame_id, Status::Protocol, &[])
}

/// Deterministic fill for read replies: byte i carries `(i + 1) & 0xFF`.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i + 1) & 0xFF) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdio_protocol::frame::{checksum, MAX_FRAME_LEN};
    use netdio_protocol::{FrameId, MemoryRegion, Reply, Request};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&IdentityConfig::default())
    }

    fn request_frame(request: &Request) -> Frame {
        let mut id = FrameId::new(0x21);
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = request.encode_into(&mut buf, &mut id).unwrap();
        Frame::parse(&buf[..n]).unwrap()
    }

    fn dispatch(request: &Request) -> Frame {
        let frame = request_frame(request);
        let mut out = [0u8; MAX_FRAME_LEN];
        let n = dispatcher().respond_into(&frame, &mut out).unwrap();
        Frame::parse(&out[..n]).unwrap()
    }

    #[test]
    fn test_reply_echoes_id_and_sets_reply_bit() {
        let reply = dispatch(&Request::DigitalIn);
        assert!(reply.is_reply());
        assert_eq!(reply.frame_id(), 0x21);
        assert_eq!(reply.command(), Command::DigitalIn);
        assert_eq!(reply.status(), Status::Success);
    }

    #[test]
    fn test_fixed_reply_lengths() {
        assert_eq!(dispatch(&Request::DigitalIn).payload().len(), 3);
        assert_eq!(dispatch(&Request::DigitalOutRead).payload().len(), 3);
        assert_eq!(dispatch(&Request::DigitalConfRead).payload().len(), 3);
        assert_eq!(dispatch(&Request::CounterRead).payload().len(), 4);
        assert_eq!(dispatch(&Request::Status).payload().len(), 2);
        assert_eq!(dispatch(&Request::NetworkConf).payload().len(), 12);
        assert_eq!(
            dispatch(&Request::DigitalOutWrite { mask: 1, value: 1 })
                .payload()
                .len(),
            0
        );
        assert_eq!(dispatch(&Request::Reset).payload().len(), 0);
        assert_eq!(dispatch(&Request::Firmware).payload().len(), 0);
    }

    #[test]
    fn test_memory_read_pattern() {
        let reply = dispatch(&Request::MemRead {
            region: MemoryRegion::Settings,
            address: 0,
            count: 5,
        });
        assert_eq!(reply.status(), Status::Success);
        assert_eq!(reply.payload().as_ref(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_out_of_range_read_rejected() {
        // address + count exceeds the user region.
        let reply = dispatch(&Request::MemRead {
            region: MemoryRegion::User,
            address: 0x0EEF,
            count: 2,
        });
        assert_eq!(reply.status(), Status::Parameter);
        assert!(reply.payload().is_empty());

        // Zero-length read.
        let reply = dispatch(&Request::MemRead {
            region: MemoryRegion::Settings,
            address: 0,
            count: 0,
        });
        assert_eq!(reply.status(), Status::Parameter);
        assert!(reply.payload().is_empty());

        // Over the per-request cap.
        let reply = dispatch(&Request::MemRead {
            region: MemoryRegion::Bootloader,
            address: 0,
            count: 1025,
        });
        assert_eq!(reply.status(), Status::Parameter);
        assert!(reply.payload().is_empty());
    }

    #[test]
    fn test_full_factory_config_readable() {
        let reply = dispatch(&Request::MemRead {
            region: MemoryRegion::FactoryConfig,
            address: 0,
            count: 16,
        });
        assert_eq!(reply.status(), Status::Success);
        assert_eq!(reply.payload().len(), 16);
    }

    #[test]
    fn test_network_conf_reports_identity() {
        let reply = dispatch(&Request::NetworkConf);
        match Reply::interpret(&reply).unwrap() {
            Reply::NetworkConfig { ip, subnet, gateway } => {
                let identity = IdentityConfig::default();
                assert_eq!(ip, identity.ip);
                assert_eq!(subnet, identity.subnet);
                assert_eq!(gateway, identity.gateway);
            }
            other => panic!("expected network config, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_payload_length_is_protocol_error() {
        // A DIN_R request carrying two unexpected data bytes.
        let mut raw = vec![0xDB, 0x00, 0x07, 0x00, 0x02, 0x00, 0xAA, 0xBB];
        raw.push(checksum(&raw));
        let frame = Frame::parse(&raw).unwrap();

        let mut out = [0u8; MAX_FRAME_LEN];
        let n = dispatcher().respond_into(&frame, &mut out).unwrap();
        let reply = Frame::parse(&out[..n]).unwrap();
        assert_eq!(reply.status(), Status::Protocol);
        assert!(reply.payload().is_empty());
    }

    #[test]
    fn test_fault_injection_substitutes_errors() {
        let injector = Arc::new(FaultInjector::new(1.0, Some(3)));
        let dispatcher = Dispatcher::new(&IdentityConfig::default()).with_fault(injector);

        let frame = request_frame(&Request::DigitalIn);
        let mut out = [0u8; MAX_FRAME_LEN];
        for _ in 0..16 {
            let n = dispatcher.respond_into(&frame, &mut out).unwrap();
            let reply = Frame::parse(&out[..n]).unwrap();
            assert!(!reply.status().is_success());
            assert!(reply.payload().is_empty());
        }
    }

    #[test]
    fn test_protocol_error_reply() {
        let mut out = [0u8; MAX_FRAME_LEN];
        let n = protocol_error_reply_into(&mut out, Command::Status.code(), 0x33).unwrap();
        let reply = Frame::parse(&out[..n]).unwrap();
        assert_eq!(reply.command(), Command::Status);
        assert_eq!(reply.frame_id(), 0x33);
        assert_eq!(reply.status(), Status::Protocol);
    }
}
