//! Stream demultiplexer.
//!
//! One algorithm, two call sites: both the client and the server feed
//! every chunk of newly arrived bytes into a per-connection
//! [`FrameDecoder`] and loop [`FrameDecoder::decode`] until it reports
//! [`Decoded::NeedMore`]. Reassembly is strictly length-prefix driven, so
//! arbitrary transport segmentation is tolerated: several frames delivered
//! in one read all drain, and a frame split across reads waits.

use crate::command::REPLY_BIT;
use crate::error::ProtocolError;
use crate::frame::{
    self, declared_data_len, Frame, CHECKSUM_LEN, HEADER_LEN, IDX_COMMAND, IDX_FRAME_ID,
    MAX_DATA_LEN, MAX_FRAME_LEN, MIN_FRAME_LEN,
};
use bytes::BytesMut;

/// Outcome of one demultiplexer step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame was extracted and consumed from the buffer.
    Frame(Frame),
    /// The transport has not delivered enough bytes yet; the buffer is
    /// untouched. The payload is the number of bytes still missing.
    NeedMore(usize),
}

/// Per-connection stream reassembler over received-but-unconsumed bytes.
///
/// The buffer grows on [`extend`](FrameDecoder::extend) and shrinks from
/// the front when [`decode`](FrameDecoder::decode) consumes a complete
/// frame. A declared data length beyond the protocol maximum is rejected
/// before any payload byte is trusted.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Appends newly arrived bytes to the connection buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Discards all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// The command byte and frame id of the buffered header, if one is
    /// complete. Available even when the frame itself later fails
    /// validation, so error replies can echo the peer's frame id.
    pub fn peek_header(&self) -> Option<(u8, u8)> {
        if self.buffer.len() < HEADER_LEN {
            return None;
        }
        Some((
            self.buffer[IDX_COMMAND] & !REPLY_BIT,
            self.buffer[IDX_FRAME_ID],
        ))
    }

    /// Attempts to extract the next complete frame.
    ///
    /// - Fewer than 7 buffered bytes: `NeedMore(7 - buffered)`, buffer
    ///   untouched.
    /// - Header buffered but the declared frame incomplete:
    ///   `NeedMore(remaining)`, buffer untouched.
    /// - Complete and valid: consumes exactly `6 + data_len + 1` bytes
    ///   from the front and returns the frame.
    /// - Checksum failure: `Err(ChecksumMismatch)`, nothing consumed; the
    ///   caller decides whether to drop the connection or reply with a
    ///   protocol error.
    pub fn decode(&mut self) -> Result<Decoded, ProtocolError> {
        if self.buffer.len() < MIN_FRAME_LEN {
            return Ok(Decoded::NeedMore(MIN_FRAME_LEN - self.buffer.len()));
        }
        let data_len = declared_data_len(&self.buffer);
        if data_len > MAX_DATA_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                len: data_len,
                max: MAX_DATA_LEN,
            });
        }
        let total = HEADER_LEN + data_len + CHECKSUM_LEN;
        if self.buffer.len() < total {
            return Ok(Decoded::NeedMore(total - self.buffer.len()));
        }
        frame::validate(&self.buffer[..total])?;
        let bytes = self.buffer.split_to(total).freeze();
        Ok(Decoded::Frame(Frame::from_wire(bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, MemoryRegion, Status};
    use crate::frame::encode_reply_into;
    use crate::request::{FrameId, Request};
    use proptest::prelude::*;

    fn encoded_request(request: &Request, id: &mut FrameId) -> Vec<u8> {
        let mut buf = vec![0u8; MAX_FRAME_LEN];
        let n = request.encode_into(&mut buf, id).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn test_split_delivery() {
        let mut id = FrameId::default();
        let wire = encoded_request(
            &Request::DigitalOutWrite {
                mask: 0x010203,
                value: 0x040506,
            },
            &mut id,
        );
        assert_eq!(wire.len(), 13);

        let single = {
            let mut decoder = FrameDecoder::new();
            decoder.extend(&wire);
            match decoder.decode().unwrap() {
                Decoded::Frame(frame) => frame,
                other => panic!("expected frame, got {:?}", other),
            }
        };

        // Delivered as 5 then 8 bytes: the length prefix is incomplete
        // after the first read, so the decoder reports the minimum-frame
        // shortfall, then decodes a frame equal to the single-read one.
        let mut decoder = FrameDecoder::new();
        decoder.extend(&wire[..5]);
        assert_eq!(decoder.decode().unwrap(), Decoded::NeedMore(2));
        decoder.extend(&wire[5..]);
        match decoder.decode().unwrap() {
            Decoded::Frame(frame) => assert_eq!(frame, single),
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(decoder.decode().unwrap(), Decoded::NeedMore(7));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_exact_need_once_header_known() {
        let mut id = FrameId::default();
        let wire = encoded_request(&Request::Firmware, &mut id);
        assert_eq!(wire.len(), 9);

        let mut decoder = FrameDecoder::new();
        decoder.extend(&wire[..7]);
        assert_eq!(decoder.decode().unwrap(), Decoded::NeedMore(2));
        assert_eq!(decoder.buffered(), 7);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut id = FrameId::default();
        let mut wire = Vec::new();
        wire.extend_from_slice(&encoded_request(&Request::DigitalIn, &mut id));
        wire.extend_from_slice(&encoded_request(&Request::CounterRead, &mut id));
        wire.extend_from_slice(&encoded_request(&Request::BlinkLed { count: 2 }, &mut id));

        let mut decoder = FrameDecoder::new();
        decoder.extend(&wire);

        let mut commands = Vec::new();
        loop {
            match decoder.decode().unwrap() {
                Decoded::Frame(frame) => commands.push(frame.command()),
                Decoded::NeedMore(_) => break,
            }
        }
        assert_eq!(
            commands,
            vec![Command::DigitalIn, Command::CounterRead, Command::BlinkLed]
        );
    }

    #[test]
    fn test_checksum_failure_consumes_nothing() {
        let mut id = FrameId::default();
        let mut wire = encoded_request(&Request::Status, &mut id);
        wire[3] ^= 0x40;

        let mut decoder = FrameDecoder::new();
        decoder.extend(&wire);
        assert!(matches!(
            decoder.decode(),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
        assert_eq!(decoder.buffered(), wire.len());
        assert_eq!(decoder.peek_header(), Some((Command::Status.code(), 0)));
    }

    #[test]
    fn test_oversized_declared_length_rejected() {
        let mut decoder = FrameDecoder::new();
        // Header declaring a 0x0500-byte payload.
        decoder.extend(&[0xDB, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00]);
        assert!(matches!(
            decoder.decode(),
            Err(ProtocolError::PayloadTooLarge { len: 0x0500, .. })
        ));
    }

    #[test]
    fn test_reply_frames_decode() {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = encode_reply_into(&mut buf, Command::CounterRead, 9, Status::Success, &[1, 2, 3, 4])
            .unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.extend(&buf[..n]);
        match decoder.decode().unwrap() {
            Decoded::Frame(frame) => {
                assert!(frame.is_reply());
                assert_eq!(frame.frame_id(), 9);
                assert_eq!(frame.command(), Command::CounterRead);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    proptest! {
        /// A byte stream containing N frames produces the same ordered
        /// frame sequence no matter how it is segmented.
        #[test]
        fn prop_reassembly_idempotent(
            counts in proptest::collection::vec(1u16..32, 1..8),
            split_points in proptest::collection::vec(0usize..512, 0..16),
        ) {
            let mut id = FrameId::default();
            let mut wire = Vec::new();
            for count in &counts {
                let request = Request::MemRead {
                    region: MemoryRegion::Settings,
                    address: 0,
                    count: *count,
                };
                wire.extend_from_slice(&encoded_request(&request, &mut id));
            }

            let drain = |decoder: &mut FrameDecoder| {
                let mut frames = Vec::new();
                loop {
                    match decoder.decode().unwrap() {
                        Decoded::Frame(frame) => frames.push(frame),
                        Decoded::NeedMore(_) => break,
                    }
                }
                frames
            };

            let mut whole = FrameDecoder::new();
            whole.extend(&wire);
            let expected = drain(&mut whole);
            prop_assert_eq!(expected.len(), counts.len());

            let mut cuts: Vec<usize> = split_points
                .iter()
                .map(|p| p % (wire.len() + 1))
                .collect();
            cuts.push(0);
            cuts.push(wire.len());
            cuts.sort_unstable();

            let mut split = FrameDecoder::new();
            let mut collected = Vec::new();
            for window in cuts.windows(2) {
                split.extend(&wire[window[0]..window[1]]);
                collected.extend(drain(&mut split));
            }
            prop_assert_eq!(collected, expected);
        }
    }
}
