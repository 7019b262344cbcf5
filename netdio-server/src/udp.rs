//! UDP discovery/admission service.
//!
//! Stateless per datagram: every request is answered (or dropped) on its
//! own, with no coordination against the TCP side.

use crate::config::{AdmissionConfig, IdentityConfig};
use crate::error::ServerError;
use crate::fault::FaultInjector;
use netdio_protocol::discovery::{
    parse_admission_request, AdmissionReply, DiscoveryReply, ADMISSION_SENTINEL,
    DISCOVERY_SENTINEL,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Answers discovery and admission datagrams.
pub struct DiscoveryService {
    socket: UdpSocket,
    identity: IdentityConfig,
    command_port: u16,
    connect_code: Option<u32>,
    fault: Option<Arc<FaultInjector>>,
}

impl DiscoveryService {
    /// Binds the service to `addr`. The advertised command port is carried
    /// in discovery replies.
    pub async fn bind(
        addr: SocketAddr,
        identity: IdentityConfig,
        admission: &AdmissionConfig,
        command_port: u16,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::info!("Discovery service listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            identity,
            command_port,
            connect_code: admission.connect_code,
            fault: None,
        })
    }

    /// Attaches a fault injector: faulted discovery requests are dropped,
    /// faulted admissions denied.
    pub fn with_fault(mut self, injector: Arc<FaultInjector>) -> Self {
        self.fault = Some(injector);
        self
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Serves datagrams until the task is cancelled.
    pub async fn run(&self) -> Result<(), ServerError> {
        // Largest request is the 5-byte admission datagram; anything
        // longer is malformed and ignored.
        let mut buf = [0u8; 16];
        loop {
            let (n, peer) = self.socket.recv_from(&mut buf).await?;
            let faulted = self.fault.as_ref().is_some_and(|f| f.fire());
            match buf[..n].first() {
                Some(&DISCOVERY_SENTINEL) if n == 1 => {
                    if faulted {
                        tracing::debug!("[{}] Dropping discovery request (fault)", peer);
                        continue;
                    }
                    let reply = self.discovery_reply(peer);
                    self.socket.send_to(&reply.encode(), peer).await?;
                    tracing::debug!("[{}] Answered discovery", peer);
                }
                Some(&ADMISSION_SENTINEL) => {
                    let Some(code) = parse_admission_request(&buf[..n]) else {
                        tracing::debug!("[{}] Malformed admission request", peer);
                        continue;
                    };
                    let reply = if faulted {
                        AdmissionReply::denied(1)
                    } else {
                        self.admit(code)
                    };
                    self.socket.send_to(&reply.encode(), peer).await?;
                    tracing::debug!(
                        "[{}] Admission code {:#010x}: {}",
                        peer,
                        code,
                        if reply.is_granted() { "granted" } else { "denied" }
                    );
                }
                _ => {
                    tracing::debug!("[{}] Ignoring unknown datagram ({} bytes)", peer, n);
                }
            }
        }
    }

    fn admit(&self, code: u32) -> AdmissionReply {
        match self.connect_code {
            Some(expected) if code != expected => AdmissionReply::denied(1),
            _ => AdmissionReply::granted(),
        }
    }

    fn discovery_reply(&self, peer: SocketAddr) -> DiscoveryReply {
        let peer_address = match peer.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        };
        DiscoveryReply {
            mac: self.identity.mac,
            product_id: self.identity.product_id,
            firmware_version: self.identity.firmware_version,
            name: self.identity.name.clone(),
            command_port: self.command_port,
            status: self.identity.status,
            peer_address,
            bootloader_version: self.identity.bootloader_version,
        }
    }
}
