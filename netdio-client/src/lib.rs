//! # netdio-client
//!
//! Client library for netdio devices.
//!
//! This crate provides:
//! - UDP discovery of devices on the local network
//! - The admission handshake gating the TCP command session
//! - An async connection correlating replies to requests by echoed
//!   frame id
//! - A sans-I/O session driver usable with any byte transport
//! - A high-level typed API for every device command

pub mod client;
pub mod connection;
pub mod error;
pub mod session;

pub use client::Client;
pub use connection::{discover, Connection, ConnectionConfig};
pub use error::ClientError;
pub use session::{Exchange, Session, SessionState};
