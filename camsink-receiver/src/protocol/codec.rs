//! Streaming frame codec for the sender link.
//!
//! The serial transport delivers an unframed, lossy byte stream: reads can
//! split a frame anywhere, senders reset mid-frame, and line noise can look
//! like the beginning of an envelope. The decoder therefore treats its
//! input as untrusted and resynchronizes on the start marker whenever a
//! candidate frame turns out to be malformed.
//!
//! Resync discipline: on any structural rejection the decoder advances
//! exactly one byte past the current start-marker occurrence before
//! searching again. Every rejection consumes at least one byte, so the
//! parser always makes forward progress, even on adversarial input such as
//! a start marker embedded inside a bogus length field.

use std::io;
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use tokio::time::Instant;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use super::crc::crc32;
use super::{END_MARKER, Frame, FrameKind, MAX_PAYLOAD, Mac, START_MARKER};

/// How long a candidate frame may sit partially parsed before the decoder
/// gives up on it and hunts for the next start marker.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

// Offsets within a frame, from the start marker.
const MAC_OFFSET: usize = START_MARKER.len();
const KIND_OFFSET: usize = MAC_OFFSET + Mac::LEN;
const SEQ_OFFSET: usize = KIND_OFFSET + 1;
const LEN_OFFSET: usize = SEQ_OFFSET + 4;
const HEADER_END: usize = LEN_OFFSET + 4;
const CHECKSUM_LEN: usize = 4;

/// Counters for everything the decoder has seen on this connection.
///
/// Rejections are recovered in place rather than surfaced as stream
/// errors, so these counters are the only record of how noisy the link
/// has been.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecStats {
    /// Well-formed frames emitted.
    pub frames: u64,

    /// Bytes discarded hunting for a start marker.
    pub resync_bytes: u64,

    /// Frames rejected for a DATA_LEN above [`MAX_PAYLOAD`].
    pub bad_length: u64,

    /// Frames rejected for a wrong end marker.
    pub bad_end_marker: u64,

    /// Frames rejected for a checksum mismatch.
    pub bad_checksum: u64,

    /// Structurally valid frames dropped for an unassigned KIND byte.
    pub unknown_kind: u64,

    /// Partial frames abandoned after [`FRAME_TIMEOUT`].
    pub timeouts: u64,
}

/// Decoder/encoder for sender-link frames.
///
/// Decoding is non-blocking: each call either emits one frame, consumes at
/// least one byte recovering from a structural error, or reports that more
/// data is needed. Malformed input never errors the stream; transport
/// failures are the only fatal condition, and those belong to the caller.
#[derive(Debug)]
pub struct FrameCodec {
    /// When the current candidate frame started arriving, if one is in
    /// progress.
    frame_started_at: Option<Instant>,
    stats: CodecStats,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            frame_started_at: None,
            stats: CodecStats::default(),
        }
    }

    /// Snapshot of the decode counters.
    pub fn stats(&self) -> CodecStats {
        self.stats
    }

    /// Advance past the current start marker to the next occurrence, or
    /// drop the whole buffer if there is none.
    ///
    /// Searching from one byte past the current marker guarantees at least
    /// one byte of progress per rejection.
    fn skip_past_marker(&mut self, src: &mut BytesMut) {
        match find_marker(&src[1..]) {
            Some(pos) => {
                self.stats.resync_bytes += (pos + 1) as u64;
                src.advance(pos + 1);
            }
            None => {
                self.stats.resync_bytes += src.len() as u64;
                src.clear();
            }
        }
        self.frame_started_at = None;
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(START_MARKER.len())
        .position(|window| window == START_MARKER)
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        loop {
            // A frame that has sat partially parsed for too long is never
            // going to complete; abandon it so one stuck sender cannot
            // stall demultiplexing for everyone else.
            if let Some(started) = self.frame_started_at {
                if started.elapsed() > FRAME_TIMEOUT {
                    warn!(
                        stalled_for = ?started.elapsed(),
                        buffered = src.len(),
                        "Partial frame timed out; discarding"
                    );
                    self.stats.timeouts += 1;
                    self.skip_past_marker(src);
                }
            }

            let Some(start) = find_marker(src) else {
                // Keep a tail shorter than the marker so a marker split
                // across two reads is still found.
                if src.len() >= START_MARKER.len() {
                    let garbage = src.len() - (START_MARKER.len() - 1);
                    self.stats.resync_bytes += garbage as u64;
                    src.advance(garbage);
                }
                return Ok(None);
            };

            if start > 0 {
                debug!(discarded = start, "Discarding bytes before start marker");
                self.stats.resync_bytes += start as u64;
                src.advance(start);
                self.frame_started_at = Some(Instant::now());
                continue;
            }

            if self.frame_started_at.is_none() {
                self.frame_started_at = Some(Instant::now());
            }

            if src.len() < HEADER_END {
                return Ok(None);
            }

            let mac = Mac::new(src[MAC_OFFSET..MAC_OFFSET + Mac::LEN].try_into().unwrap());
            let kind_raw = src[KIND_OFFSET];
            let sequence = u32::from_be_bytes(src[SEQ_OFFSET..SEQ_OFFSET + 4].try_into().unwrap());
            let data_len =
                u32::from_be_bytes(src[LEN_OFFSET..LEN_OFFSET + 4].try_into().unwrap()) as usize;

            if data_len > MAX_PAYLOAD {
                warn!(%mac, data_len, "Unreasonable payload length; resyncing");
                self.stats.bad_length += 1;
                self.skip_past_marker(src);
                continue;
            }

            let frame_len = HEADER_END + data_len + CHECKSUM_LEN + END_MARKER.len();
            if src.len() < frame_len {
                return Ok(None);
            }

            let end_offset = frame_len - END_MARKER.len();
            if src[end_offset..frame_len] != END_MARKER {
                warn!(%mac, "Invalid end marker; resyncing");
                self.stats.bad_end_marker += 1;
                self.skip_past_marker(src);
                continue;
            }

            let checksum_offset = HEADER_END + data_len;
            let wire_checksum = u32::from_be_bytes(
                src[checksum_offset..checksum_offset + CHECKSUM_LEN]
                    .try_into()
                    .unwrap(),
            );
            let computed = crc32(&src[MAC_OFFSET..checksum_offset]);
            if wire_checksum != computed {
                warn!(
                    %mac,
                    wire = format!("{wire_checksum:#010x}"),
                    computed = format!("{computed:#010x}"),
                    "Frame checksum mismatch; resyncing"
                );
                self.stats.bad_checksum += 1;
                self.skip_past_marker(src);
                continue;
            }

            let frame_bytes = src.split_to(frame_len).freeze();
            self.frame_started_at = None;

            let Some(kind) = FrameKind::from_repr(kind_raw) else {
                warn!(%mac, kind = kind_raw, sequence, "Unknown frame kind; dropping frame");
                self.stats.unknown_kind += 1;
                continue;
            };

            self.stats.frames += 1;
            return Ok(Some(Frame {
                mac,
                kind,
                sequence,
                payload: frame_bytes.slice(HEADER_END..HEADER_END + data_len),
            }));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // Transport loss mid-frame is an expected, recoverable
                // event; the partial data dies with the connection.
                if !src.is_empty() {
                    debug!(
                        remaining = src.len(),
                        "Transport closed mid-frame; discarding partial data"
                    );
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), io::Error> {
        if frame.payload.len() > MAX_PAYLOAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("payload of {} bytes exceeds {MAX_PAYLOAD}", frame.payload.len()),
            ));
        }

        dst.reserve(HEADER_END + frame.payload.len() + CHECKSUM_LEN + END_MARKER.len());
        let covered_from = dst.len() + START_MARKER.len();
        dst.put_slice(&START_MARKER);
        dst.put_slice(&frame.mac.octets());
        dst.put_u8(frame.kind as u8);
        dst.put_u32(frame.sequence);
        dst.put_u32(frame.payload.len() as u32);
        dst.put_slice(&frame.payload);
        let checksum = crc32(&dst[covered_from..]);
        dst.put_u32(checksum);
        dst.put_slice(&END_MARKER);
        Ok(())
    }
}
