//! Per-cycle framing of access units into wire chunks
//!
//! One encode cycle is sent as
//!
//! ```text
//! Marker(seq, pts)  Data ... Data  [Data(AUD)]  Terminator
//! ```
//!
//! The receive side treats the marker as the load-bearing boundary: a new
//! marker closes whatever the previous cycle left open, so a lost
//! terminator costs nothing. The terminator only lets the receiver close
//! the cycle without waiting for the next marker.

use bytes::Bytes;

use crate::codec::unit::AccessUnit;
use crate::media::h264::ACCESS_UNIT_DELIMITER;
use crate::protocol::chunk::{WireChunk, MAX_DATA_PAYLOAD};

/// Transmit-side phase within one encode cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerPhase {
    /// Between cycles
    Idle,
    /// Marker sent, no data yet
    MarkerSent,
    /// Marker and `k` data chunks sent
    DataSent(usize),
    /// Terminator sent
    Terminated,
}

/// Splits access units into `[marker, data+, terminator]` sequences
#[derive(Debug)]
pub struct TransmitFramer {
    phase: FramerPhase,
    sequence: u64,
    max_chunk_size: usize,
    access_unit_delimiter: bool,
}

impl TransmitFramer {
    pub fn new(max_chunk_size: usize, access_unit_delimiter: bool) -> Self {
        Self {
            phase: FramerPhase::Idle,
            sequence: 0,
            max_chunk_size: max_chunk_size.clamp(1, MAX_DATA_PAYLOAD),
            access_unit_delimiter,
        }
    }

    pub fn phase(&self) -> FramerPhase {
        self.phase
    }

    /// Sequence number the next cycle will carry
    pub fn next_sequence(&self) -> u64 {
        self.sequence
    }

    /// Open a cycle. Any unfinished cycle is abandoned.
    pub fn begin(&mut self, pts: i64) -> WireChunk {
        if !matches!(self.phase, FramerPhase::Idle | FramerPhase::Terminated) {
            tracing::debug!(sequence = self.sequence, "Abandoning unterminated cycle");
        }
        let chunk = WireChunk::Marker {
            sequence: self.sequence,
            pts,
        };
        self.sequence = self.sequence.wrapping_add(1);
        self.phase = FramerPhase::MarkerSent;
        chunk
    }

    /// Split `data` into data chunks of at most `max_chunk_size` bytes
    pub fn data(&mut self, data: &Bytes) -> Vec<WireChunk> {
        let mut chunks = Vec::with_capacity(data.len().div_ceil(self.max_chunk_size));
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + self.max_chunk_size).min(data.len());
            chunks.push(WireChunk::Data(data.slice(offset..end)));
            offset = end;
        }
        self.advance(chunks.len());
        chunks
    }

    /// Close the cycle
    pub fn end(&mut self) -> WireChunk {
        self.phase = FramerPhase::Terminated;
        WireChunk::Terminator
    }

    /// Complete chunk sequence for one access unit. Leaves the framer idle.
    pub fn frame(&mut self, unit: &AccessUnit) -> Vec<WireChunk> {
        let mut chunks = vec![self.begin(unit.pts().unwrap_or(0))];
        chunks.extend(self.data(unit.data()));
        if self.access_unit_delimiter {
            chunks.push(WireChunk::Data(Bytes::from_static(&ACCESS_UNIT_DELIMITER)));
            self.advance(1);
        }
        chunks.push(self.end());
        self.phase = FramerPhase::Idle;
        chunks
    }

    fn advance(&mut self, sent: usize) {
        self.phase = match self.phase {
            FramerPhase::DataSent(k) => FramerPhase::DataSent(k + sent),
            _ => FramerPhase::DataSent(sent),
        };
    }
}

/// What the receiver should do with an inbound chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerEvent {
    /// A new cycle starts: close anything still pending
    Boundary {
        sequence: u64,
        pts: i64,
        /// Cycles missing between the previous marker and this one
        skipped: u64,
        /// The previous cycle never saw its terminator
        unterminated: bool,
    },
    /// Bitstream bytes to feed to the parser right away
    Data(Bytes),
    /// The current cycle is complete
    Complete,
}

/// Receive-side inverse of [`TransmitFramer`]
#[derive(Debug, Default)]
pub struct ReceiveFramer {
    in_cycle: bool,
    pts: Option<i64>,
    expected: Option<u64>,
    orphan_chunks: u64,
}

impl ReceiveFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, chunk: WireChunk) -> FramerEvent {
        match chunk {
            WireChunk::Marker { sequence, pts } => {
                let skipped = match self.expected {
                    Some(expected) if sequence >= expected => sequence - expected,
                    Some(expected) => {
                        tracing::debug!(sequence, expected, "Sequence restarted");
                        0
                    }
                    None => 0,
                };
                if skipped > 0 {
                    tracing::debug!(sequence, skipped, "Cycles skipped");
                }
                let unterminated = self.in_cycle;
                self.in_cycle = true;
                self.pts = Some(pts);
                self.expected = Some(sequence.wrapping_add(1));
                FramerEvent::Boundary {
                    sequence,
                    pts,
                    skipped,
                    unterminated,
                }
            }
            WireChunk::Data(data) => {
                if !self.in_cycle {
                    self.orphan_chunks += 1;
                    tracing::trace!(len = data.len(), "Data outside a cycle");
                }
                FramerEvent::Data(data)
            }
            WireChunk::Terminator => {
                self.in_cycle = false;
                FramerEvent::Complete
            }
        }
    }

    /// Presentation timestamp of the current (or last) cycle
    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn in_cycle(&self) -> bool {
        self.in_cycle
    }

    /// Data chunks that arrived with no open cycle (lost marker)
    pub fn orphan_chunks(&self) -> u64 {
        self.orphan_chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(len: usize, pts: i64) -> AccessUnit {
        AccessUnit::new(Bytes::from(vec![0xAB; len]), false).with_pts(Some(pts))
    }

    #[test]
    fn test_transmit_phases() {
        let mut framer = TransmitFramer::new(4, false);
        assert_eq!(framer.phase(), FramerPhase::Idle);

        framer.begin(0);
        assert_eq!(framer.phase(), FramerPhase::MarkerSent);

        let chunks = framer.data(&Bytes::from_static(&[1, 2, 3, 4, 5, 6]));
        assert_eq!(chunks.len(), 2);
        assert_eq!(framer.phase(), FramerPhase::DataSent(2));

        framer.data(&Bytes::from_static(&[7]));
        assert_eq!(framer.phase(), FramerPhase::DataSent(3));

        assert_eq!(framer.end(), WireChunk::Terminator);
        assert_eq!(framer.phase(), FramerPhase::Terminated);
    }

    #[test]
    fn test_frame_layout() {
        let mut framer = TransmitFramer::new(4, true);
        let chunks = framer.frame(&unit(10, 3000));

        assert_eq!(chunks.len(), 1 + 3 + 1 + 1);
        assert_eq!(
            chunks[0],
            WireChunk::Marker {
                sequence: 0,
                pts: 3000
            }
        );
        assert_eq!(chunks[1].payload_len(), 4);
        assert_eq!(chunks[3].payload_len(), 2);
        assert_eq!(
            chunks[4],
            WireChunk::Data(Bytes::from_static(&ACCESS_UNIT_DELIMITER))
        );
        assert_eq!(chunks[5], WireChunk::Terminator);
        assert_eq!(framer.phase(), FramerPhase::Idle);
        assert_eq!(framer.next_sequence(), 1);
    }

    #[test]
    fn test_oversized_chunk_size_still_decodes() {
        let mut framer = TransmitFramer::new(2 * MAX_DATA_PAYLOAD, false);
        let chunks = framer.frame(&unit(MAX_DATA_PAYLOAD + 10, 0));

        assert_eq!(chunks.len(), 1 + 2 + 1);
        assert_eq!(chunks[1].payload_len(), MAX_DATA_PAYLOAD);
        assert_eq!(chunks[2].payload_len(), 10);

        let mut buf = bytes::BytesMut::new();
        chunks[1].encode(&mut buf);
        let decoded = WireChunk::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.payload_len(), MAX_DATA_PAYLOAD);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_frame_without_delimiter() {
        let mut framer = TransmitFramer::new(64 * 1024, false);
        let chunks = framer.frame(&unit(100, 0));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].payload_len(), 100);
    }

    #[test]
    fn test_receive_cycle() {
        let mut framer = ReceiveFramer::new();
        assert_eq!(
            framer.accept(WireChunk::Marker { sequence: 0, pts: 0 }),
            FramerEvent::Boundary {
                sequence: 0,
                pts: 0,
                skipped: 0,
                unterminated: false
            }
        );
        assert!(framer.in_cycle());
        assert_eq!(
            framer.accept(WireChunk::Data(Bytes::from_static(&[1]))),
            FramerEvent::Data(Bytes::from_static(&[1]))
        );
        assert_eq!(framer.accept(WireChunk::Terminator), FramerEvent::Complete);
        assert!(!framer.in_cycle());
        assert_eq!(framer.orphan_chunks(), 0);
    }

    #[test]
    fn test_receive_lost_terminator_and_gap() {
        let mut framer = ReceiveFramer::new();
        framer.accept(WireChunk::Marker { sequence: 4, pts: 100 });
        framer.accept(WireChunk::Data(Bytes::from_static(&[1])));

        // terminator of 4 lost, cycles 5 and 6 lost entirely
        let event = framer.accept(WireChunk::Marker { sequence: 7, pts: 400 });
        assert_eq!(
            event,
            FramerEvent::Boundary {
                sequence: 7,
                pts: 400,
                skipped: 2,
                unterminated: true
            }
        );
        assert_eq!(framer.pts(), Some(400));
    }

    #[test]
    fn test_receive_orphan_data() {
        let mut framer = ReceiveFramer::new();
        framer.accept(WireChunk::Data(Bytes::from_static(&[9])));
        assert_eq!(framer.orphan_chunks(), 1);
    }

    #[test]
    fn test_round_trip_through_both_framers() {
        let mut tx = TransmitFramer::new(3, false);
        let mut rx = ReceiveFramer::new();

        let mut bytes = Vec::new();
        for chunk in tx.frame(&unit(8, 0)) {
            if let FramerEvent::Data(data) = rx.accept(chunk) {
                bytes.extend_from_slice(&data);
            }
        }
        assert_eq!(bytes, vec![0xAB; 8]);
    }
}
