//! # netdio-protocol
//!
//! Wire protocol implementation for netdio (NCP - netdio Command Protocol).
//!
//! This crate provides:
//! - Binary framing with a one-byte additive checksum and little-endian
//!   length prefix
//! - Request encoding for every device command, driven by a caller-owned
//!   frame-id counter
//! - A frame validator and a stream demultiplexer that tolerates arbitrary
//!   TCP segmentation
//! - Typed reply interpretation (digital values, counters, status words,
//!   network configuration, memory dumps)
//! - The fixed-size UDP discovery and admission exchanges
//!
//! Everything here is synchronous and transport-agnostic: callers feed
//! received bytes in and take encoded frames out.

pub mod codec;
pub mod command;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod reply;
pub mod request;

pub use codec::{Decoded, FrameDecoder};
pub use command::{Command, MemoryRegion, Status};
pub use discovery::{AdmissionReply, DiscoveryReply};
pub use error::ProtocolError;
pub use frame::Frame;
pub use reply::Reply;
pub use request::{FrameId, Request};

/// Default port for both UDP discovery/admission and the TCP command channel.
pub const DEFAULT_PORT: u16 = 54211;
