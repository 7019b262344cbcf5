//! UDP discovery and admission exchanges.
//!
//! Two independent fixed-size exchanges precede the TCP session. Neither
//! is length-prefixed; both are parsed by fixed offsets only.
//!
//! - Discovery: the client sends the single byte `'D'`; the device answers
//!   with a fixed 64-byte identity block.
//! - Admission: the client sends `'C'` plus a 4-byte little-endian connect
//!   code; the device answers with the echoed sentinel and a status byte
//!   (0 = granted). Only on a grant does the client open the TCP command
//!   session.

use crate::error::ProtocolError;
use std::net::Ipv4Addr;

/// Sentinel byte opening a discovery exchange.
pub const DISCOVERY_SENTINEL: u8 = b'D';

/// Sentinel byte opening an admission exchange.
pub const ADMISSION_SENTINEL: u8 = b'C';

/// Length of the discovery reply datagram.
pub const DISCOVERY_REPLY_LEN: usize = 64;

/// Length of the admission request datagram.
pub const ADMISSION_REQUEST_LEN: usize = 5;

/// Length of the admission reply datagram.
pub const ADMISSION_REPLY_LEN: usize = 2;

const NAME_OFFSET: usize = 11;
const NAME_LEN: usize = 16;

/// The 1-byte discovery request datagram.
pub fn discovery_request() -> [u8; 1] {
    [DISCOVERY_SENTINEL]
}

/// The 5-byte admission request datagram carrying the connect code.
pub fn admission_request(connect_code: u32) -> [u8; ADMISSION_REQUEST_LEN] {
    let mut buf = [0u8; ADMISSION_REQUEST_LEN];
    buf[0] = ADMISSION_SENTINEL;
    buf[1..5].copy_from_slice(&connect_code.to_le_bytes());
    buf
}

/// Reads the connect code out of an admission request datagram.
pub fn parse_admission_request(buf: &[u8]) -> Option<u32> {
    if buf.len() != ADMISSION_REQUEST_LEN || buf[0] != ADMISSION_SENTINEL {
        return None;
    }
    Some(u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]))
}

/// The fixed 64-byte identity block a device answers discovery with.
///
/// Field offsets: 0 sentinel, 1 MAC (6), 7 product id (u16 LE),
/// 9 firmware version (u16 LE), 11 NUL-padded name (16), 27 command port
/// (u16 LE), 33 status (u16 LE), 35 peer IPv4 (octets), 39 bootloader
/// version (u16 LE); the remainder is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReply {
    pub mac: [u8; 6],
    pub product_id: u16,
    pub firmware_version: u16,
    pub name: String,
    pub command_port: u16,
    pub status: u16,
    pub peer_address: Ipv4Addr,
    pub bootloader_version: u16,
}

impl DiscoveryReply {
    /// Parses a discovery reply datagram. Any reply whose length is not
    /// exactly 64 or whose first byte is not `'D'` is rejected.
    pub fn parse(buf: &[u8]) -> Result<DiscoveryReply, ProtocolError> {
        if buf.len() != DISCOVERY_REPLY_LEN || buf[0] != DISCOVERY_SENTINEL {
            return Err(ProtocolError::InvalidDiscoveryReply);
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&buf[1..7]);

        let name_bytes = &buf[NAME_OFFSET..NAME_OFFSET + NAME_LEN];
        let name_end = name_bytes.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);
        let name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

        Ok(DiscoveryReply {
            mac,
            product_id: u16::from_le_bytes([buf[7], buf[8]]),
            firmware_version: u16::from_le_bytes([buf[9], buf[10]]),
            name,
            command_port: u16::from_le_bytes([buf[27], buf[28]]),
            status: u16::from_le_bytes([buf[33], buf[34]]),
            peer_address: Ipv4Addr::new(buf[35], buf[36], buf[37], buf[38]),
            bootloader_version: u16::from_le_bytes([buf[39], buf[40]]),
        })
    }

    /// Encodes the 64-byte reply datagram. Names longer than 15 bytes are
    /// truncated to leave room for the NUL terminator.
    pub fn encode(&self) -> [u8; DISCOVERY_REPLY_LEN] {
        let mut buf = [0u8; DISCOVERY_REPLY_LEN];
        buf[0] = DISCOVERY_SENTINEL;
        buf[1..7].copy_from_slice(&self.mac);
        buf[7..9].copy_from_slice(&self.product_id.to_le_bytes());
        buf[9..11].copy_from_slice(&self.firmware_version.to_le_bytes());
        let name = self.name.as_bytes();
        let name_len = name.len().min(NAME_LEN - 1);
        buf[NAME_OFFSET..NAME_OFFSET + name_len].copy_from_slice(&name[..name_len]);
        buf[27..29].copy_from_slice(&self.command_port.to_le_bytes());
        buf[33..35].copy_from_slice(&self.status.to_le_bytes());
        buf[35..39].copy_from_slice(&self.peer_address.octets());
        buf[39..41].copy_from_slice(&self.bootloader_version.to_le_bytes());
        buf
    }
}

/// The 2-byte admission reply: echoed sentinel plus status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionReply {
    pub status: u8,
}

impl AdmissionReply {
    pub fn granted() -> Self {
        AdmissionReply { status: 0 }
    }

    pub fn denied(status: u8) -> Self {
        AdmissionReply {
            status: if status == 0 { 1 } else { status },
        }
    }

    pub fn is_granted(&self) -> bool {
        self.status == 0
    }

    /// Parses an admission reply datagram; wrong length or sentinel is
    /// rejected.
    pub fn parse(buf: &[u8]) -> Result<AdmissionReply, ProtocolError> {
        if buf.len() != ADMISSION_REPLY_LEN || buf[0] != ADMISSION_SENTINEL {
            return Err(ProtocolError::InvalidAdmissionReply);
        }
        Ok(AdmissionReply { status: buf[1] })
    }

    pub fn encode(&self) -> [u8; ADMISSION_REPLY_LEN] {
        [ADMISSION_SENTINEL, self.status]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_reply() -> DiscoveryReply {
        DiscoveryReply {
            mac: [0x02, 0x11, 0x22, 0x33, 0x44, 0x55],
            product_id: 0x0144,
            firmware_version: 0x0103,
            name: "netdio-sim".to_string(),
            command_port: crate::DEFAULT_PORT,
            status: 0,
            peer_address: Ipv4Addr::new(192, 168, 0, 50),
            bootloader_version: 0x0021,
        }
    }

    #[test]
    fn test_discovery_roundtrip() {
        let reply = sample_reply();
        let wire = reply.encode();
        assert_eq!(wire.len(), 64);
        assert_eq!(wire[0], b'D');
        assert_eq!(DiscoveryReply::parse(&wire).unwrap(), reply);
    }

    #[test]
    fn test_discovery_rejects_bad_replies() {
        let wire = sample_reply().encode();

        // Wrong length.
        assert_eq!(
            DiscoveryReply::parse(&wire[..63]),
            Err(ProtocolError::InvalidDiscoveryReply)
        );
        let mut long = wire.to_vec();
        long.push(0);
        assert_eq!(
            DiscoveryReply::parse(&long),
            Err(ProtocolError::InvalidDiscoveryReply)
        );

        // Wrong leading byte.
        let mut bad = wire;
        bad[0] = b'X';
        assert_eq!(
            DiscoveryReply::parse(&bad),
            Err(ProtocolError::InvalidDiscoveryReply)
        );
    }

    #[test]
    fn test_long_name_truncated() {
        let mut reply = sample_reply();
        reply.name = "a-device-name-well-past-the-field".to_string();
        let wire = reply.encode();
        let parsed = DiscoveryReply::parse(&wire).unwrap();
        assert_eq!(parsed.name.len(), 15);
        assert!(reply.name.starts_with(&parsed.name));
    }

    #[test]
    fn test_admission_request_roundtrip() {
        let wire = admission_request(0xDEADBEEF);
        assert_eq!(wire[0], b'C');
        assert_eq!(parse_admission_request(&wire), Some(0xDEADBEEF));
        assert_eq!(parse_admission_request(&wire[..4]), None);
        assert_eq!(parse_admission_request(&[b'D', 0, 0, 0, 0]), None);
    }

    #[test]
    fn test_admission_reply() {
        assert!(AdmissionReply::granted().is_granted());
        assert!(!AdmissionReply::denied(3).is_granted());
        // Denied never reads back as granted.
        assert!(!AdmissionReply::denied(0).is_granted());

        let wire = AdmissionReply::granted().encode();
        assert_eq!(wire, [b'C', 0]);
        assert!(AdmissionReply::parse(&wire).unwrap().is_granted());
        assert!(AdmissionReply::parse(&[b'C']).is_err());
        assert!(AdmissionReply::parse(&[b'X', 0]).is_err());
    }
}
