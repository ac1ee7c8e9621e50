//! Counters for transmitters and receivers
//!
//! Counters are lock-free atomics shared behind an `Arc` between the
//! pipeline and whoever observes it. `snapshot()` copies them into a plain
//! struct.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[inline]
fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

#[inline]
fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

fn bitrate(bytes: u64, duration: Duration) -> u64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        ((bytes * 8) as f64 / secs) as u64
    } else {
        0
    }
}

/// Live transmit-side counters
#[derive(Debug)]
pub struct TransmitStats {
    started_at: Instant,
    frames_in: AtomicU64,
    rejected_frames: AtomicU64,
    frames_encoded: AtomicU64,
    codec_errors: AtomicU64,
    units_sent: AtomicU64,
    chunks_sent: AtomicU64,
    chunks_dropped: AtomicU64,
    bytes_sent: AtomicU64,
}

impl Default for TransmitStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TransmitStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_in: AtomicU64::new(0),
            rejected_frames: AtomicU64::new(0),
            frames_encoded: AtomicU64::new(0),
            codec_errors: AtomicU64::new(0),
            units_sent: AtomicU64::new(0),
            chunks_sent: AtomicU64::new(0),
            chunks_dropped: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    pub(crate) fn frame_in(&self) {
        bump(&self.frames_in, 1);
    }

    pub(crate) fn frame_rejected(&self) {
        bump(&self.rejected_frames, 1);
    }

    pub(crate) fn frame_encoded(&self) {
        bump(&self.frames_encoded, 1);
    }

    pub(crate) fn codec_error(&self) {
        bump(&self.codec_errors, 1);
    }

    pub(crate) fn unit_sent(&self) {
        bump(&self.units_sent, 1);
    }

    pub(crate) fn chunk_sent(&self, bytes: usize) {
        bump(&self.chunks_sent, 1);
        bump(&self.bytes_sent, bytes as u64);
    }

    pub(crate) fn chunk_dropped(&self) {
        bump(&self.chunks_dropped, 1);
    }

    pub fn snapshot(&self) -> TransmitSnapshot {
        TransmitSnapshot {
            duration: self.started_at.elapsed(),
            frames_in: load(&self.frames_in),
            rejected_frames: load(&self.rejected_frames),
            frames_encoded: load(&self.frames_encoded),
            codec_errors: load(&self.codec_errors),
            units_sent: load(&self.units_sent),
            chunks_sent: load(&self.chunks_sent),
            chunks_dropped: load(&self.chunks_dropped),
            bytes_sent: load(&self.bytes_sent),
        }
    }
}

/// Point-in-time copy of [`TransmitStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransmitSnapshot {
    /// Time since the transmitter was created
    pub duration: Duration,
    /// Frames handed to `encode_frame`
    pub frames_in: u64,
    /// Frames refused (geometry or layout mismatch)
    pub rejected_frames: u64,
    /// Access units produced by the encoder
    pub frames_encoded: u64,
    /// Failed encoder submits
    pub codec_errors: u64,
    /// Access units fully handed to the transport
    pub units_sent: u64,
    /// Chunks accepted by the transport
    pub chunks_sent: u64,
    /// Chunks dropped at the high-water-mark
    pub chunks_dropped: u64,
    /// Envelope bytes accepted by the transport
    pub bytes_sent: u64,
}

impl TransmitSnapshot {
    /// Average bits per second since start
    pub fn bitrate(&self) -> u64 {
        bitrate(self.bytes_sent, self.duration)
    }
}

/// Live receive-side counters
#[derive(Debug)]
pub struct ReceiveStats {
    started_at: Instant,
    chunks_received: AtomicU64,
    bytes_received: AtomicU64,
    cycles_skipped: AtomicU64,
    units_parsed: AtomicU64,
    parse_errors: AtomicU64,
    frames_decoded: AtomicU64,
    decode_errors: AtomicU64,
    frames_dropped: AtomicU64,
}

impl Default for ReceiveStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            chunks_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
            units_parsed: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn chunk_received(&self, bytes: usize) {
        bump(&self.chunks_received, 1);
        bump(&self.bytes_received, bytes as u64);
    }

    pub(crate) fn cycles_skipped(&self, n: u64) {
        bump(&self.cycles_skipped, n);
    }

    pub(crate) fn unit_parsed(&self) {
        bump(&self.units_parsed, 1);
    }

    pub(crate) fn parse_error(&self) {
        bump(&self.parse_errors, 1);
    }

    pub(crate) fn frame_decoded(&self) {
        bump(&self.frames_decoded, 1);
    }

    pub(crate) fn decode_error(&self) {
        bump(&self.decode_errors, 1);
    }

    pub(crate) fn frame_dropped(&self) {
        bump(&self.frames_dropped, 1);
    }

    pub fn snapshot(&self) -> ReceiveSnapshot {
        ReceiveSnapshot {
            duration: self.started_at.elapsed(),
            chunks_received: load(&self.chunks_received),
            bytes_received: load(&self.bytes_received),
            cycles_skipped: load(&self.cycles_skipped),
            units_parsed: load(&self.units_parsed),
            parse_errors: load(&self.parse_errors),
            frames_decoded: load(&self.frames_decoded),
            decode_errors: load(&self.decode_errors),
            frames_dropped: load(&self.frames_dropped),
        }
    }
}

/// Point-in-time copy of [`ReceiveStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveSnapshot {
    pub duration: Duration,
    pub chunks_received: u64,
    /// Envelope payload bytes received
    pub bytes_received: u64,
    /// Encode cycles that never arrived (sequence gaps)
    pub cycles_skipped: u64,
    pub units_parsed: u64,
    /// Parser overflows
    pub parse_errors: u64,
    pub frames_decoded: u64,
    pub decode_errors: u64,
    /// Decoded frames dropped because the delivery queue was full
    pub frames_dropped: u64,
}

impl ReceiveSnapshot {
    /// Average bits per second since start
    pub fn bitrate(&self) -> u64 {
        bitrate(self.bytes_received, self.duration)
    }
}
