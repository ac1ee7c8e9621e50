//! End-to-end transmitter -> transport -> receiver tests over the in-process
//! channel, with the real H.264 codec.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use avlink::protocol::WireChunk;
use avlink::transport::memory::{self, MemorySink};
use avlink::{
    ChunkSink, CodecConfig, Frame, Geometry, PixelFormat, Receiver, ReceiverConfig, Result,
    SendOutcome, Transmitter, TransmitterConfig,
};

const GEOMETRY: Geometry = Geometry::new(64, 64);

/// Sink that silently loses the chunks `keep` rejects
struct LossySink<F> {
    inner: MemorySink,
    index: usize,
    keep: F,
}

impl<F> LossySink<F>
where
    F: FnMut(usize, &WireChunk) -> bool + Send,
{
    fn new(inner: MemorySink, keep: F) -> Self {
        Self {
            inner,
            index: 0,
            keep,
        }
    }
}

impl<F> ChunkSink for LossySink<F>
where
    F: FnMut(usize, &WireChunk) -> bool + Send,
{
    fn send(&mut self, chunk: WireChunk) -> Result<SendOutcome> {
        let index = self.index;
        self.index += 1;
        if (self.keep)(index, &chunk) {
            self.inner.send(chunk)
        } else {
            Ok(SendOutcome::Delivered)
        }
    }

    fn peer_count(&self) -> usize {
        self.inner.peer_count()
    }
}

fn receiver_config() -> ReceiverConfig {
    ReceiverConfig::default()
        .queue_capacity(32)
        .poll_interval(Duration::from_millis(5))
}

fn collect(receiver: &Receiver, max: usize, timeout: Duration) -> Vec<Frame> {
    let mut frames = Vec::new();
    while frames.len() < max {
        match receiver.get_timeout(timeout) {
            Some(frame) => frames.push(frame),
            None => break,
        }
    }
    frames
}

#[test]
fn test_lossless_transport_delivers_every_frame_in_order() {
    const N: usize = 10;
    let (sink, source) = memory::channel(4096);
    let mut tx = Transmitter::with_sink(TransmitterConfig::default(), sink);
    let rx = Receiver::with_source(receiver_config(), source).unwrap();

    for i in 0..N {
        tx.encode_frame(&Frame::pattern(GEOMETRY, (i * 20) as u8, PixelFormat::Bgr24))
            .unwrap();
    }

    let frames = collect(&rx, N, Duration::from_secs(2));
    assert_eq!(frames.len(), N);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.geometry(), GEOMETRY);
        assert_eq!(frame.format(), PixelFormat::Bgr24);
        assert_eq!(frame.pts(), Some(i as i64 * 3000));
    }

    let snap = rx.stats().snapshot();
    assert_eq!(snap.frames_decoded, N as u64);
    assert_eq!(snap.decode_errors, 0);
    assert_eq!(snap.cycles_skipped, 0);
}

#[test]
fn test_lost_terminators_are_closed_by_next_marker() {
    const N: usize = 6;
    let (sink, source) = memory::channel(4096);
    let lossy = LossySink::new(sink, |_, chunk: &WireChunk| *chunk != WireChunk::Terminator);
    let config = TransmitterConfig::default().codec(CodecConfig::default().access_unit_delimiter(false));
    let mut tx = Transmitter::with_sink(config, lossy);
    let rx = Receiver::with_source(receiver_config(), source).unwrap();

    for i in 0..N {
        tx.encode_frame(&Frame::pattern(GEOMETRY, (i * 40) as u8, PixelFormat::Rgb24))
            .unwrap();
    }

    // every cycle but the last is closed by the marker that follows it
    let frames = collect(&rx, N, Duration::from_millis(500));
    assert_eq!(frames.len(), N - 1);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.pts(), Some(i as i64 * 3000));
    }

    tx.encode_frame(&Frame::pattern(GEOMETRY, 250, PixelFormat::Rgb24)).unwrap();
    let last = rx.get_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(last.pts(), Some((N as i64 - 1) * 3000));
}

#[test]
fn test_access_unit_delimiter_closes_pictures_without_terminators() {
    const N: usize = 4;
    let (sink, source) = memory::channel(4096);
    let lossy = LossySink::new(sink, |_, chunk: &WireChunk| *chunk != WireChunk::Terminator);
    let mut tx = Transmitter::with_sink(TransmitterConfig::default(), lossy);
    let rx = Receiver::with_source(receiver_config(), source).unwrap();

    for i in 0..N {
        tx.encode_frame(&Frame::pattern(GEOMETRY, (i * 60) as u8, PixelFormat::Bgr24))
            .unwrap();
    }

    let frames = collect(&rx, N, Duration::from_secs(2));
    assert_eq!(frames.len(), N);
}

#[test]
fn test_lost_data_chunk_costs_at_most_one_picture() {
    const N: usize = 6;
    const DAMAGED: usize = 3;
    let (sink, source) = memory::channel(4096);

    // drop the second data chunk of cycle DAMAGED
    let lost = Arc::new(AtomicUsize::new(0));
    let lost_in_sink = Arc::clone(&lost);
    let mut cycle = 0usize;
    let mut data_in_cycle = 0usize;
    let lossy = LossySink::new(sink, move |_, chunk: &WireChunk| match chunk {
        WireChunk::Marker { sequence, .. } => {
            cycle = *sequence as usize;
            data_in_cycle = 0;
            true
        }
        WireChunk::Data(_) => {
            data_in_cycle += 1;
            let keep = !(cycle == DAMAGED && data_in_cycle == 2);
            if !keep {
                lost_in_sink.fetch_add(1, Ordering::SeqCst);
            }
            keep
        }
        WireChunk::Terminator => true,
    });
    let config = TransmitterConfig::default()
        .max_chunk_size(128)
        .codec(CodecConfig::default().gop_size(1));
    let mut tx = Transmitter::with_sink(config, lossy);
    let rx = Receiver::with_source(receiver_config(), source).unwrap();

    for i in 0..N {
        tx.encode_frame(&Frame::pattern(GEOMETRY, (i * 40) as u8, PixelFormat::Bgr24))
            .unwrap();
    }

    let frames = collect(&rx, N, Duration::from_millis(500));
    assert_eq!(lost.load(Ordering::SeqCst), 1);
    assert!(frames.len() >= N - 1, "only {} frames", frames.len());

    let pts: Vec<i64> = frames.iter().filter_map(|f| f.pts()).collect();
    assert_eq!(pts.len(), frames.len());
    assert!(pts.windows(2).all(|w| w[0] < w[1]), "pts out of order: {:?}", pts);

    // pictures before and after the damaged cycle are unaffected
    for i in (0..N).filter(|&i| i != DAMAGED) {
        assert!(pts.contains(&(i as i64 * 3000)), "pts {} missing from {:?}", i * 3000, pts);
    }
    let after: Vec<i64> = pts.iter().copied().filter(|&p| p > DAMAGED as i64 * 3000).collect();
    let expected: Vec<i64> = ((DAMAGED + 1)..N).map(|i| i as i64 * 3000).collect();
    assert_eq!(after, expected);
}

#[test]
fn test_solid_color_survives_round_trip() {
    let (sink, source) = memory::channel(4096);
    let mut tx = Transmitter::with_sink(TransmitterConfig::default(), sink);
    let rx = Receiver::with_source(receiver_config().output_format(PixelFormat::Rgb24), source)
        .unwrap();

    let color = [40u8, 160, 220];
    for _ in 0..3 {
        tx.encode_frame(&Frame::solid(GEOMETRY, color, PixelFormat::Bgr24)).unwrap();
    }

    let frames = collect(&rx, 3, Duration::from_secs(2));
    assert_eq!(frames.len(), 3);
    let mean = frames[2].mean_rgb().unwrap();
    for c in 0..3 {
        assert!(
            (mean[c] - color[c] as f64).abs() < 10.0,
            "channel {}: {} vs {}",
            c,
            mean[c],
            color[c]
        );
    }
}

#[test]
fn test_i420_output() {
    let (sink, source) = memory::channel(4096);
    let mut tx = Transmitter::with_sink(TransmitterConfig::default(), sink);
    let rx = Receiver::with_source(receiver_config().output_format(PixelFormat::I420), source)
        .unwrap();

    tx.encode_frame(&Frame::solid(GEOMETRY, [0, 0, 0], PixelFormat::I420)).unwrap();
    let frame = rx.get_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(frame.format(), PixelFormat::I420);
    assert_eq!(frame.data().len(), PixelFormat::I420.packed_size(GEOMETRY));
}

#[test]
fn test_construct_and_drop_releases_everything() {
    let (sink, source) = memory::channel(8);
    let mut observer = sink.clone();

    let tx = Transmitter::with_sink(TransmitterConfig::default(), sink);
    let rx = Receiver::with_source(receiver_config(), source).unwrap();
    let tx_stats = tx.stats();
    let rx_stats = rx.stats();
    assert_eq!(observer.peer_count(), 1);

    drop(tx);
    drop(rx);

    assert_eq!(Arc::strong_count(&tx_stats), 1);
    assert_eq!(Arc::strong_count(&rx_stats), 1);
    // the receive thread dropped its source
    assert_eq!(observer.peer_count(), 0);
    assert_eq!(observer.send(WireChunk::Terminator).unwrap(), SendOutcome::NoPeers);
    assert_eq!(rx_stats.snapshot().frames_decoded, 0);
}
