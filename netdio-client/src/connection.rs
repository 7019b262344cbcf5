//! Connection management.
//!
//! A [`Connection`] performs the UDP admission handshake, opens the TCP
//! command session, and correlates replies to in-flight requests by their
//! echoed frame id. Socket reads happen in a background
//! [`read_loop`](Connection::read_loop); each completed exchange resolves
//! the oneshot channel registered when its request was sent.

use crate::error::ClientError;
use crate::session::{Exchange, Session};
use netdio_protocol::discovery::{admission_request, discovery_request, AdmissionReply};
use netdio_protocol::{DiscoveryReply, Request, DEFAULT_PORT};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{oneshot, Mutex};

/// Default read buffer size (8 KiB).
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Sends a 1-byte discovery request to `target` (unicast or broadcast)
/// and parses the first 64-byte reply.
pub async fn discover(
    target: SocketAddr,
    timeout: Duration,
) -> Result<DiscoveryReply, ClientError> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;
    socket.send_to(&discovery_request(), target).await?;

    let mut buf = [0u8; 128];
    let (n, peer) = tokio::time::timeout(timeout, socket.recv_from(&mut buf))
        .await
        .map_err(|_| ClientError::Timeout)??;
    let reply = DiscoveryReply::parse(&buf[..n])?;
    tracing::debug!("Discovered {} at {}", reply.name, peer);
    Ok(reply)
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Device address.
    pub host: IpAddr,
    /// UDP discovery/admission port.
    pub udp_port: u16,
    /// TCP command port.
    pub tcp_port: u16,
    /// Connect code presented during admission.
    pub connect_code: u32,
    /// Timeout covering admission and the TCP connect.
    pub connect_timeout: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Session idle timeout, if any.
    pub idle_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(host: IpAddr) -> Self {
        Self {
            host,
            udp_port: DEFAULT_PORT,
            tcp_port: DEFAULT_PORT,
            connect_code: 0,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            idle_timeout: None,
        }
    }

    pub fn with_connect_code(mut self, code: u32) -> Self {
        self.connect_code = code;
        self
    }

    pub fn with_ports(mut self, udp_port: u16, tcp_port: u16) -> Self {
        self.udp_port = udp_port;
        self.tcp_port = tcp_port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.udp_port)
    }

    fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.tcp_port)
    }
}

/// A connection to a netdio device.
pub struct Connection {
    config: ConnectionConfig,
    /// Write half of the stream (for sending requests).
    writer: Mutex<Option<WriteHalf<TcpStream>>>,
    /// Read half of the stream (for receiving replies).
    reader: Mutex<Option<ReadHalf<TcpStream>>>,
    /// Protocol state: frame ids, counts, demultiplexer, correlation.
    session: Mutex<Session>,
    /// In-flight requests waiting for their echoed frame id.
    pending: Mutex<HashMap<u8, oneshot::Sender<Exchange>>>,
    /// Is the connection established?
    connected: AtomicBool,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        let session = Session::new(config.idle_timeout);
        Self {
            config,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            session: Mutex::new(session),
            pending: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(false),
        }
    }

    /// Performs the admission handshake and opens the TCP command
    /// session. Only a granted admission proceeds to TCP.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.admit().await?;

        tracing::debug!("Admission granted, connecting to {}", self.config.tcp_addr());
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.tcp_addr()),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = tokio::io::split(stream);
        *self.reader.lock().await = Some(read_half);
        *self.writer.lock().await = Some(write_half);
        self.session.lock().await.admitted();
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// The 5-byte admission exchange over UDP.
    async fn admit(&self) -> Result<(), ClientError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.config.udp_addr()).await?;
        socket
            .send(&admission_request(self.config.connect_code))
            .await?;
        self.session.lock().await.admission_sent();

        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(self.config.connect_timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| ClientError::Timeout)??;
        let reply = AdmissionReply::parse(&buf[..n])?;
        if !reply.is_granted() {
            return Err(ClientError::AdmissionDenied(reply.status));
        }
        Ok(())
    }

    /// Sends a request and waits for the exchange carrying its frame id.
    pub async fn request(&self, request: Request) -> Result<Exchange, ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }

        let mut buf = vec![0u8; request.encoded_len()];
        let (frame_id, n) = self
            .session
            .lock()
            .await
            .encode_request(&request, &mut buf)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(frame_id, tx);

        {
            let mut writer_guard = self.writer.lock().await;
            let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
            writer.write_all(&buf[..n]).await?;
        }
        tracing::debug!("Request {} sent (id={})", request.command(), frame_id);

        let exchange = tokio::time::timeout(self.config.request_timeout, rx)
            .await
            .map_err(|_| {
                // Forget the in-flight request on timeout.
                if let Ok(mut pending) = self.pending.try_lock() {
                    pending.remove(&frame_id);
                }
                ClientError::Timeout
            })?
            .map_err(|_| ClientError::ConnectionClosed)?;
        Ok(exchange)
    }

    /// Reads and dispatches replies (call this in a background task).
    pub async fn read_loop(&self) -> Result<(), ClientError> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = {
                let mut reader_guard = self.reader.lock().await;
                let reader = reader_guard.as_mut().ok_or(ClientError::NotConnected)?;
                reader.read(&mut buf).await?
            };
            if n == 0 {
                tracing::debug!("Connection closed by device");
                self.teardown().await;
                return Err(ClientError::ConnectionClosed);
            }

            let exchanges = match self.session.lock().await.bytes_arrived(&buf[..n]) {
                Ok(exchanges) => exchanges,
                Err(e) => {
                    tracing::warn!("Dropping connection: {}", e);
                    self.teardown().await;
                    return Err(e);
                }
            };

            let mut pending = self.pending.lock().await;
            for exchange in exchanges {
                match pending.remove(&exchange.frame_id) {
                    Some(tx) => {
                        let _ = tx.send(exchange);
                    }
                    None => {
                        tracing::debug!(
                            "No waiter for reply id={} ({})",
                            exchange.frame_id,
                            exchange.command
                        );
                    }
                }
            }
        }
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether every issued request has been answered.
    pub async fn is_complete(&self) -> bool {
        self.session.lock().await.is_complete()
    }

    /// Closes the connection and cancels in-flight requests.
    pub async fn close(&self) -> Result<(), ClientError> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.teardown().await;
        Ok(())
    }

    async fn teardown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.reader.lock().await.take();
        self.session.lock().await.close();
        // Dropping the senders wakes every waiter with ConnectionClosed.
        self.pending.lock().await.clear();
    }
}
