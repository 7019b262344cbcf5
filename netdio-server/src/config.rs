//! Simulator configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via NETDIO_CONFIG)
//! 3. Environment variables

use crate::error::ServerError;
use netdio_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Simulator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Device identity reported by discovery and NETWORK_CONF.
    pub identity: IdentityConfig,
    /// Admission policy.
    pub admission: AdmissionConfig,
    /// Fault injection (off unless explicitly enabled).
    pub fault: FaultConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable
    /// overrides.
    pub fn load() -> Result<Self, ServerError> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("NETDIO_CONFIG") {
            config = Self::from_file(&path)?;
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::ConfigIo(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ServerError::ConfigParse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.fault.apply_env_overrides();
    }

    /// Validates field ranges.
    pub fn validate(&self) -> Result<(), ServerError> {
        if !(0.0..=1.0).contains(&self.fault.probability) {
            return Err(ServerError::ConfigInvalid(format!(
                "fault.probability must be within 0.0..=1.0, got {}",
                self.fault.probability
            )));
        }
        if self.network.port == 0 {
            return Err(ServerError::ConfigInvalid(
                "network.port must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind both the UDP and TCP sockets to.
    pub bind_addr: IpAddr,
    /// Port for UDP discovery/admission and the TCP command channel.
    pub port: u16,
    /// Idle connection timeout in seconds.
    pub idle_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            idle_timeout_secs: 300,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("NETDIO_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }
        if let Ok(port) = std::env::var("NETDIO_PORT") {
            if let Ok(parsed) = port.parse() {
                self.port = parsed;
            }
        }
        if let Ok(timeout) = std::env::var("NETDIO_IDLE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.idle_timeout_secs = secs;
            }
        }
    }

    /// The socket address both services bind to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Returns the idle timeout as a Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Device identity reported by discovery replies and NETWORK_CONF.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Device name (at most 15 bytes on the wire).
    pub name: String,
    /// MAC address.
    pub mac: [u8; 6],
    pub product_id: u16,
    pub firmware_version: u16,
    pub bootloader_version: u16,
    /// Device status word.
    pub status: u16,
    /// Addresses reported by NETWORK_CONF.
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "netdio-sim".to_string(),
            // Locally administered address.
            mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            product_id: 0x0144,
            firmware_version: 0x0103,
            bootloader_version: 0x0021,
            status: 0,
            ip: Ipv4Addr::new(192, 168, 0, 101),
            subnet: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 0, 1),
        }
    }
}

/// Admission policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Expected connect code. When unset, every code is granted.
    pub connect_code: Option<u32>,
}

/// Fault injection configuration. Strictly opt-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Whether replies are randomly replaced by error statuses.
    pub enabled: bool,
    /// Per-request probability of an injected fault.
    pub probability: f64,
    /// RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            probability: 0.5,
            seed: None,
        }
    }
}

impl FaultConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("NETDIO_FAULT_INJECTION") {
            if let Ok(parsed) = enabled.parse() {
                self.enabled = parsed;
            }
        }
    }
}
