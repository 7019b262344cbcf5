//! TCP command server.
//!
//! The device grants at most one concurrent TCP client, enforced by a
//! single busy flag set at accept time and cleared at close; additional
//! connection attempts are refused immediately. Each connection owns its
//! receive buffer exclusively, so frame processing needs no locking.

use crate::config::Config;
use crate::dispatch::{protocol_error_reply_into, Dispatcher};
use crate::error::ServerError;
use crate::fault::FaultInjector;
use netdio_protocol::frame::MAX_FRAME_LEN;
use netdio_protocol::{Decoded, FrameDecoder, ProtocolError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_refused: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP command server for the simulator.
pub struct Server {
    bind_addr: SocketAddr,
    idle_timeout: Duration,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    busy: Arc<AtomicBool>,
}

impl Server {
    /// Creates a server from the simulator configuration. When fault
    /// injection is enabled, the provided injector is shared with the
    /// dispatcher.
    pub fn new(config: &Config, fault: Option<Arc<FaultInjector>>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut dispatcher = Dispatcher::new(&config.identity);
        if let Some(injector) = fault {
            dispatcher = dispatcher.with_fault(injector);
        }
        Self {
            bind_addr: config.network.socket_addr(),
            idle_timeout: config.network.idle_timeout(),
            dispatcher: Arc::new(dispatcher),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        tracing::info!("Command server listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => tracing::error!("Accept error: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Command server shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        // One client at a time; losers are dropped without a reply, which
        // closes the socket immediately.
        if self.busy.swap(true, Ordering::AcqRel) {
            tracing::warn!("[{}] Device busy, refusing connection", addr);
            self.stats.connections_refused.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);

        let dispatcher = self.dispatcher.clone();
        let stats = self.stats.clone();
        let busy = self.busy.clone();
        let idle_timeout = self.idle_timeout;
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            tracing::info!("Client connected: {}", addr);
            let result =
                handle_connection(stream, addr, dispatcher, &stats, idle_timeout, &mut shutdown)
                    .await;
            if let Err(e) = result {
                tracing::debug!("[{}] Connection error: {}", addr, e);
                stats.errors_total.fetch_add(1, Ordering::Relaxed);
            }
            busy.store(false, Ordering::Release);
            tracing::info!("Client disconnected: {}", addr);
        });
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

/// Handles a single connection: reads feed the connection's demultiplexer,
/// every extracted frame is dispatched, and the reply is written back. A
/// partially buffered frame at close time is discarded with no side
/// effects.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    stats: &ServerStats,
    idle_timeout: Duration,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let mut decoder = FrameDecoder::new();
    let mut read_buf = [0u8; 2048];
    let mut out = [0u8; MAX_FRAME_LEN];

    loop {
        tokio::select! {
            result = stream.read(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        tracing::debug!("[{}] Connection closed by client", addr);
                        return Ok(());
                    }
                    Ok(n) => decoder.extend(&read_buf[..n]),
                    Err(e) => return Err(ServerError::Io(e)),
                }
            }
            _ = tokio::time::sleep(idle_timeout) => {
                tracing::debug!("[{}] Idle timeout", addr);
                return Ok(());
            }
            _ = shutdown.recv() => {
                tracing::debug!("[{}] Shutdown signal received", addr);
                return Err(ServerError::ShuttingDown);
            }
        }

        // Drain every complete frame delivered by this read.
        loop {
            match decoder.decode() {
                Ok(Decoded::Frame(frame)) => {
                    stats.requests_total.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        "[{}] Request {} (id={}, {} data bytes)",
                        addr,
                        frame.command(),
                        frame.frame_id(),
                        frame.payload().len()
                    );
                    let n = dispatcher.respond_into(&frame, &mut out)?;
                    stream.write_all(&out[..n]).await?;
                }
                Ok(Decoded::NeedMore(_)) => break,
                Err(e @ ProtocolError::ChecksumMismatch { .. }) => {
                    // One protocol-error reply echoing the peer's frame id,
                    // then the connection is dropped: the buffered bytes
                    // cannot be trusted for resynchronization.
                    tracing::warn!("[{}] Checksum failure, dropping connection", addr);
                    if let Some((raw_command, frame_id)) = decoder.peek_header() {
                        if let Ok(n) = protocol_error_reply_into(&mut out, raw_command, frame_id) {
                            let _ = stream.write_all(&out[..n]).await;
                        }
                    }
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::warn!("[{}] Fatal protocol error: {}", addr, e);
                    return Err(e.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdio_protocol::frame::checksum;
    use netdio_protocol::{Command, Frame, FrameId, MemoryRegion, Request, Status};

    async fn spawn_server(config: Config) -> (Arc<Server>, SocketAddr) {
        let fault = config
            .fault
            .enabled
            .then(|| Arc::new(FaultInjector::new(config.fault.probability, config.fault.seed)));
        let server = Arc::new(Server::new(&config, fault));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let runner = server.clone();
        tokio::spawn(async move {
            let _ = runner.serve(listener).await;
        });
        (server, addr)
    }

    async fn roundtrip(stream: &mut TcpStream, request: &Request, id: &mut FrameId) -> Frame {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = request.encode_into(&mut buf, id).unwrap();
        stream.write_all(&buf[..n]).await.unwrap();

        let mut decoder = FrameDecoder::new();
        let mut read_buf = [0u8; 2048];
        loop {
            match decoder.decode().unwrap() {
                Decoded::Frame(frame) => return frame,
                Decoded::NeedMore(_) => {
                    let n = stream.read(&mut read_buf).await.unwrap();
                    assert!(n > 0, "server closed connection");
                    decoder.extend(&read_buf[..n]);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_command_session() {
        let (server, addr) = spawn_server(Config::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut id = FrameId::default();

        let reply = roundtrip(&mut stream, &Request::DigitalIn, &mut id).await;
        assert!(reply.is_reply());
        assert_eq!(reply.command(), Command::DigitalIn);
        assert_eq!(reply.frame_id(), 0);
        assert_eq!(reply.payload().len(), 3);

        let reply = roundtrip(
            &mut stream,
            &Request::MemRead {
                region: MemoryRegion::User,
                address: 0,
                count: 8,
            },
            &mut id,
        )
        .await;
        assert_eq!(reply.status(), Status::Success);
        assert_eq!(reply.payload().as_ref(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(reply.frame_id(), 1);

        assert_eq!(server.stats().requests_total.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_busy_flag_refuses_second_client() {
        let (server, addr) = spawn_server(Config::default()).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        let mut id = FrameId::default();
        // Complete one exchange so the first connection is fully accepted.
        roundtrip(&mut first, &Request::Status, &mut id).await;

        // The second client is dropped without a reply.
        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let n = second.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(
            server.stats().connections_refused.load(Ordering::Relaxed),
            1
        );

        // Once the first client leaves, the device is free again.
        drop(first);
        loop {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if !server.busy.load(Ordering::Acquire) {
                break;
            }
        }
        let mut third = TcpStream::connect(addr).await.unwrap();
        roundtrip(&mut third, &Request::Status, &mut id).await;
    }

    #[tokio::test]
    async fn test_checksum_failure_gets_protocol_error_then_close() {
        let (_server, addr) = spawn_server(Config::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let mut id = FrameId::new(5);
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = Request::CounterRead.encode_into(&mut buf, &mut id).unwrap();
        buf[n - 1] ^= 0xFF; // corrupt the checksum
        stream.write_all(&buf[..n]).await.unwrap();

        let mut wire = Vec::new();
        let mut read_buf = [0u8; 256];
        loop {
            let n = stream.read(&mut read_buf).await.unwrap();
            if n == 0 {
                break;
            }
            wire.extend_from_slice(&read_buf[..n]);
        }
        let reply = Frame::parse(&wire).unwrap();
        assert_eq!(reply.command(), Command::CounterRead);
        assert_eq!(reply.frame_id(), 5);
        assert_eq!(reply.status(), Status::Protocol);
    }

    #[tokio::test]
    async fn test_pipelined_requests_in_one_write() {
        let (_server, addr) = spawn_server(Config::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let mut id = FrameId::default();
        let mut wire = Vec::new();
        for request in [Request::DigitalIn, Request::CounterRead, Request::Status] {
            let mut buf = [0u8; MAX_FRAME_LEN];
            let n = request.encode_into(&mut buf, &mut id).unwrap();
            wire.extend_from_slice(&buf[..n]);
        }
        stream.write_all(&wire).await.unwrap();

        let mut decoder = FrameDecoder::new();
        let mut read_buf = [0u8; 2048];
        let mut replies = Vec::new();
        while replies.len() < 3 {
            match decoder.decode().unwrap() {
                Decoded::Frame(frame) => replies.push(frame),
                Decoded::NeedMore(_) => {
                    let n = stream.read(&mut read_buf).await.unwrap();
                    assert!(n > 0);
                    decoder.extend(&read_buf[..n]);
                }
            }
        }
        let ids: Vec<u8> = replies.iter().map(|f| f.frame_id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_unknown_command_is_fatal() {
        let (_server, addr) = spawn_server(Config::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // A checksum-valid frame with an unassigned command byte.
        let mut raw = vec![0xDB, 0x7E, 0x00, 0x00, 0x00, 0x00];
        raw.push(checksum(&raw));
        stream.write_all(&raw).await.unwrap();

        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_fault_injection_over_tcp() {
        let mut config = Config::default();
        config.fault.enabled = true;
        config.fault.probability = 1.0;
        config.fault.seed = Some(11);
        let (_server, addr) = spawn_server(config).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut id = FrameId::default();
        let reply = roundtrip(&mut stream, &Request::DigitalIn, &mut id).await;
        assert!(!reply.status().is_success());
        assert!(reply.payload().is_empty());
    }
}
