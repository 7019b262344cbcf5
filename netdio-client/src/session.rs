//! Sans-I/O session driver.
//!
//! [`Session`] holds everything a command session needs that is not a
//! socket: the caller-owned frame-id counter, request/response counts, the
//! per-connection stream demultiplexer, the outstanding-request table, and
//! deadline bookkeeping. The async connection drives it; tests can drive
//! it with plain byte slices.
//!
//! Replies are matched to requests by their echoed frame id, never by
//! arrival order, so the driver stays correct when requests are
//! pipelined.

use crate::error::ClientError;
use netdio_protocol::{Command, Decoded, FrameDecoder, FrameId, Reply, Request, Status};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lifecycle of one command session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not yet established.
    Connecting,
    /// Admission request sent, grant not yet received.
    AwaitingAdmission,
    /// Admitted; requests may be issued.
    Active,
    /// Terminal: transport error, timeout, or completion.
    Closed,
}

/// One completed request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub frame_id: u8,
    pub command: Command,
    pub status: Status,
    /// Interpreted reply value; `None` when the device reported an error
    /// status (error replies carry no payload).
    pub reply: Option<Reply>,
}

/// Per-session protocol state.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    frame_id: FrameId,
    requests_sent: u64,
    responses_received: u64,
    decoder: FrameDecoder,
    outstanding: HashMap<u8, Command>,
    started_at: Instant,
    idle_timeout: Option<Duration>,
    last_activity: Instant,
}

impl Session {
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            state: SessionState::Connecting,
            frame_id: FrameId::default(),
            requests_sent: 0,
            responses_received: 0,
            decoder: FrameDecoder::new(),
            outstanding: HashMap::new(),
            started_at: now,
            idle_timeout,
            last_activity: now,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Records that the admission request went out.
    pub fn admission_sent(&mut self) {
        self.state = SessionState::AwaitingAdmission;
    }

    /// Records the admission grant; requests may now be issued.
    pub fn admitted(&mut self) {
        self.state = SessionState::Active;
    }

    /// Moves to the terminal state; buffered bytes are discarded.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.decoder.clear();
        self.outstanding.clear();
    }

    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    pub fn responses_received(&self) -> u64 {
        self.responses_received
    }

    /// The session is complete once every issued request has been
    /// answered.
    pub fn is_complete(&self) -> bool {
        self.responses_received >= self.requests_sent
    }

    /// Time since the session started.
    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether the idle timeout has expired.
    pub fn deadline_expired(&self) -> bool {
        match self.idle_timeout {
            Some(timeout) => self.last_activity.elapsed() > timeout,
            None => false,
        }
    }

    /// Encodes `request` into `buf`, records it as outstanding, and
    /// returns its frame id and encoded length.
    pub fn encode_request(
        &mut self,
        request: &Request,
        buf: &mut [u8],
    ) -> Result<(u8, usize), ClientError> {
        if self.state != SessionState::Active {
            return Err(ClientError::NotConnected);
        }
        let frame_id = self.frame_id.current();
        let n = request.encode_into(buf, &mut self.frame_id)?;
        self.outstanding.insert(frame_id, request.command());
        self.requests_sent += 1;
        self.last_activity = Instant::now();
        Ok((frame_id, n))
    }

    /// Feeds newly arrived transport bytes through the demultiplexer and
    /// returns every exchange completed by them, in arrival order.
    pub fn bytes_arrived(&mut self, data: &[u8]) -> Result<Vec<Exchange>, ClientError> {
        self.decoder.extend(data);
        self.last_activity = Instant::now();

        let mut completed = Vec::new();
        loop {
            match self.decoder.decode()? {
                Decoded::Frame(frame) => {
                    if !frame.is_reply() {
                        return Err(ClientError::UnexpectedFrame);
                    }
                    let frame_id = frame.frame_id();
                    let command = self
                        .outstanding
                        .remove(&frame_id)
                        .ok_or(ClientError::UnknownFrameId(frame_id))?;
                    if command != frame.command() {
                        return Err(ClientError::CommandMismatch {
                            frame_id,
                            expected: command,
                            actual: frame.command(),
                        });
                    }
                    self.responses_received += 1;
                    let reply = if frame.status().is_success() {
                        Some(Reply::interpret(&frame)?)
                    } else {
                        None
                    };
                    completed.push(Exchange {
                        frame_id,
                        command,
                        status: frame.status(),
                        reply,
                    });
                }
                Decoded::NeedMore(_) => break,
            }
        }
        Ok(completed)
    }
}
