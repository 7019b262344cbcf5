//! # netdio-server
//!
//! Conformance simulator playing the device role of the netdio protocol.
//!
//! This crate provides:
//! - UDP discovery/admission service (stateless per datagram)
//! - Single-client TCP command server with a busy flag
//! - Command dispatch with per-command and per-region validation
//! - Opt-in random fault injection for exercising client error paths
//! - YAML/environment configuration

pub mod config;
pub mod dispatch;
pub mod error;
pub mod fault;
pub mod server;
pub mod udp;

pub use config::{AdmissionConfig, Config, FaultConfig, IdentityConfig, NetworkConfig};
pub use dispatch::Dispatcher;
pub use error::ServerError;
pub use fault::FaultInjector;
pub use server::{Server, ServerStats};
pub use udp::DiscoveryService;
