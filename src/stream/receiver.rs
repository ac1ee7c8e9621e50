//! Decode side of the pipeline
//!
//! ```text
//! ChunkSource -> ReceiveFramer -> AccessUnitParser -> DecoderSession
//!             -> ColorConverter -> BoundedQueue<Frame> -> get()
//! ```
//!
//! A [`Receiver`] owns one thread that blocks on the transport and runs the
//! whole decode path synchronously. Decoded frames are handed to the caller
//! through a small drop-newest queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::codec::decoder::DecoderSession;
use crate::codec::unit::AccessUnit;
use crate::config::ReceiverConfig;
use crate::error::{InitError, Result};
use crate::media::convert::{ColorConverter, YuvPlanes};
use crate::media::frame::{Frame, PixelFormat};
use crate::media::h264::AccessUnitParser;
use crate::protocol::chunk::WireChunk;
use crate::protocol::framer::{FramerEvent, ReceiveFramer};
use crate::stats::metrics::ReceiveStats;
use crate::stream::queue::BoundedQueue;
use crate::transport::{ChunkSource, TcpSubscriber};

/// Single-threaded receive path, driven by [`ReceivePipeline::poll`].
///
/// Fields drop in declaration order: decoder, converter, parser, then the
/// transport.
pub struct ReceivePipeline<S: ChunkSource> {
    decoder: DecoderSession,
    /// Built from the first decoded picture, rebuilt if its size changes
    converter: Option<ColorConverter>,
    parser: AccessUnitParser,
    framer: ReceiveFramer,
    source: S,
    output_format: PixelFormat,
    queue: BoundedQueue<Frame>,
    stats: Arc<ReceiveStats>,
}

impl<S: ChunkSource> ReceivePipeline<S> {
    pub fn new(
        config: &ReceiverConfig,
        source: S,
        queue: BoundedQueue<Frame>,
        stats: Arc<ReceiveStats>,
    ) -> Result<Self> {
        Ok(Self {
            decoder: DecoderSession::new()?,
            converter: None,
            parser: AccessUnitParser::new(),
            framer: ReceiveFramer::new(),
            source,
            output_format: config.output_format,
            queue,
            stats,
        })
    }

    /// Wait up to `timeout` for one chunk and process it.
    ///
    /// Returns `Ok(false)` if nothing arrived. Errors are fatal: the
    /// transport is gone or the output converter could not be built.
    pub fn poll(&mut self, timeout: Duration) -> Result<bool> {
        match self.source.recv_timeout(timeout)? {
            Some(chunk) => {
                self.handle_chunk(chunk)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run one inbound chunk through framer, parser and decoder
    pub fn handle_chunk(&mut self, chunk: WireChunk) -> Result<()> {
        self.stats.chunk_received(chunk.payload_len());
        let previous_pts = self.framer.pts();

        match self.framer.accept(chunk) {
            FramerEvent::Boundary {
                sequence,
                skipped,
                unterminated,
                ..
            } => {
                if skipped > 0 {
                    self.stats.cycles_skipped(skipped);
                }
                if unterminated {
                    tracing::debug!(sequence, "Previous cycle closed by marker");
                }
                // whatever is pending belongs to the previous cycle
                for unit in self.parser.flush() {
                    self.decode(unit.with_pts(previous_pts))?;
                }
            }
            FramerEvent::Data(data) => {
                let units = match self.parser.feed(&data) {
                    Ok(units) => units,
                    Err(e) => {
                        self.stats.parse_error();
                        tracing::warn!(error = %e, "Bitstream discarded");
                        return Ok(());
                    }
                };
                let pts = self.framer.pts();
                for unit in units {
                    self.decode(unit.with_pts(pts))?;
                }
            }
            FramerEvent::Complete => {
                let pts = self.framer.pts();
                for unit in self.parser.flush() {
                    self.decode(unit.with_pts(pts))?;
                }
            }
        }
        Ok(())
    }

    fn decode(&mut self, unit: AccessUnit) -> Result<()> {
        self.stats.unit_parsed();

        let converter = &mut self.converter;
        let format = self.output_format;
        let output = match self
            .decoder
            .submit(&unit, |planes| output_frame(converter, format, planes))
        {
            Ok(Some(output)) => output,
            Ok(None) => return Ok(()),
            Err(e) => {
                self.stats.decode_error();
                tracing::warn!(error = %e, len = unit.len(), "Access unit dropped");
                return Ok(());
            }
        };
        self.stats.frame_decoded();

        let frame = match output? {
            Some(frame) => frame.with_pts(unit.pts()),
            None => return Ok(()),
        };
        tracing::trace!(pts = frame.pts(), "Frame decoded");

        if !self.queue.push(frame) {
            self.stats.frame_dropped();
            tracing::debug!("Delivery queue full, frame dropped");
        }
        Ok(())
    }

    /// Frames waiting for the consumer
    pub fn queue(&self) -> &BoundedQueue<Frame> {
        &self.queue
    }

    pub fn stats(&self) -> &Arc<ReceiveStats> {
        &self.stats
    }
}

/// Pack decoded planes into an owned frame in `format`.
///
/// `Ok(None)` means the picture was unusable and is skipped; an error means
/// no converter could be built.
fn output_frame(
    converter: &mut Option<ColorConverter>,
    format: PixelFormat,
    planes: &YuvPlanes<'_>,
) -> Result<Option<Frame>> {
    if format == PixelFormat::I420 {
        return Ok(match planes.to_frame() {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!(error = %e, "Decoded picture unusable");
                None
            }
        });
    }

    let mut conv = match converter.take() {
        Some(conv) if conv.geometry() == planes.geometry => conv,
        _ => ColorConverter::new(planes.geometry, PixelFormat::I420, format)?,
    };
    let frame = conv
        .from_planar(planes)
        .and_then(|packed| Frame::new(planes.geometry, format, packed.to_vec()));
    *converter = Some(conv);

    Ok(match frame {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!(error = %e, "Decoded picture unusable");
            None
        }
    })
}

/// Threaded H.264 receiver
pub struct Receiver {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    queue: BoundedQueue<Frame>,
    stats: Arc<ReceiveStats>,
}

impl Receiver {
    /// Subscribe to the TCP publisher at `config.connect_addr`
    pub fn connect(config: ReceiverConfig) -> Result<Self> {
        let subscriber = TcpSubscriber::connect(&config)?;
        Self::with_source(config, subscriber)
    }

    /// Receive from an already opened source
    pub fn with_source<S>(config: ReceiverConfig, source: S) -> Result<Self>
    where
        S: ChunkSource + 'static,
    {
        let queue = BoundedQueue::new(config.queue_capacity);
        let stats = Arc::new(ReceiveStats::new());
        let pipeline = ReceivePipeline::new(&config, source, queue.clone(), Arc::clone(&stats))?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread = std::thread::Builder::new()
            .name("avlink-receiver".into())
            .spawn({
                let stop = Arc::clone(&stop);
                let poll_interval = config.poll_interval;
                move || run(pipeline, stop, poll_interval)
            })
            .map_err(InitError::Runtime)?;

        tracing::info!(
            format = ?config.output_format,
            capacity = config.queue_capacity,
            "Receiver started"
        );

        Ok(Self {
            stop,
            thread: Some(thread),
            queue,
            stats,
        })
    }

    /// Next decoded frame, or `None` if none is ready yet
    pub fn get(&self) -> Option<Frame> {
        self.queue.try_pop()
    }

    /// Wait up to `timeout` for the next decoded frame
    pub fn get_timeout(&self, timeout: Duration) -> Option<Frame> {
        self.queue.pop_timeout(timeout)
    }

    /// Stop the receive thread and wait for it. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Receive thread panicked");
            }
            let snap = self.stats.snapshot();
            tracing::info!(
                frames = snap.frames_decoded,
                dropped = snap.frames_dropped,
                kbytes = snap.bytes_received / 1024,
                "Receiver stopped"
            );
        }
    }

    /// Whether the receive thread is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stats(&self) -> Arc<ReceiveStats> {
        Arc::clone(&self.stats)
    }

    /// Frames waiting for `get()`
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("running", &self.is_running())
            .field("pending", &self.queue.len())
            .finish()
    }
}

fn run<S: ChunkSource>(mut pipeline: ReceivePipeline<S>, stop: Arc<AtomicBool>, poll_interval: Duration) {
    while !stop.load(Ordering::Acquire) {
        if let Err(e) = pipeline.poll(poll_interval) {
            if e.is_fatal() {
                tracing::error!(error = %e, "Receive loop stopped");
                break;
            }
            tracing::warn!(error = %e, "Receive error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encoder::EncoderSession;
    use crate::config::CodecConfig;
    use crate::media::frame::Geometry;
    use crate::protocol::framer::TransmitFramer;
    use crate::transport::memory::{self, MemorySource};

    /// Encode `count` frames and frame them into wire chunks
    fn encoded_chunks(g: Geometry, count: u8, aud: bool) -> Vec<Vec<WireChunk>> {
        let codec = CodecConfig::default().fps(10);
        let mut encoder = EncoderSession::new(g, &codec).unwrap();
        let mut conv = ColorConverter::new(g, PixelFormat::Rgb24, PixelFormat::I420).unwrap();
        let mut framer = TransmitFramer::new(512, aud);

        let mut cycles = Vec::new();
        for i in 0..count {
            let frame = Frame::pattern(g, i * 30, PixelFormat::Rgb24);
            let planes = conv.to_planar(&frame).unwrap();
            for unit in encoder.submit(&planes).unwrap() {
                cycles.push(framer.frame(&unit));
            }
        }
        cycles
    }

    fn pipeline(format: PixelFormat) -> ReceivePipeline<MemorySource> {
        let (_sink, source) = memory::channel(1);
        let config = ReceiverConfig::default().output_format(format).queue_capacity(8);
        ReceivePipeline::new(
            &config,
            source,
            BoundedQueue::new(config.queue_capacity),
            Arc::new(ReceiveStats::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_pipeline_decodes_every_cycle() {
        let g = Geometry::new(64, 64);
        let mut rx = pipeline(PixelFormat::Bgr24);

        for cycle in encoded_chunks(g, 3, true) {
            for chunk in cycle {
                rx.handle_chunk(chunk).unwrap();
            }
        }

        let mut pts = Vec::new();
        while let Some(frame) = rx.queue().try_pop() {
            assert_eq!(frame.geometry(), g);
            assert_eq!(frame.format(), PixelFormat::Bgr24);
            pts.push(frame.pts());
        }
        assert_eq!(pts, vec![Some(0), Some(9000), Some(18000)]);

        let snap = rx.stats().snapshot();
        assert_eq!(snap.frames_decoded, 3);
        assert_eq!(snap.decode_errors, 0);
        assert_eq!(snap.cycles_skipped, 0);
    }

    #[test]
    fn test_terminator_loss_closes_at_next_marker() {
        let g = Geometry::new(64, 64);
        let mut rx = pipeline(PixelFormat::I420);

        for cycle in encoded_chunks(g, 3, false) {
            for chunk in cycle {
                if chunk != WireChunk::Terminator {
                    rx.handle_chunk(chunk).unwrap();
                }
            }
        }
        // the last cycle is closed by the next marker
        rx.handle_chunk(WireChunk::Marker { sequence: 3, pts: 27000 }).unwrap();

        let mut count = 0;
        while let Some(frame) = rx.queue().try_pop() {
            assert_eq!(frame.format(), PixelFormat::I420);
            assert_eq!(frame.pts(), Some(count * 9000));
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn test_sequence_gap_counted() {
        let mut rx = pipeline(PixelFormat::Rgb24);
        rx.handle_chunk(WireChunk::Marker { sequence: 0, pts: 0 }).unwrap();
        rx.handle_chunk(WireChunk::Terminator).unwrap();
        rx.handle_chunk(WireChunk::Marker { sequence: 4, pts: 0 }).unwrap();
        assert_eq!(rx.stats().snapshot().cycles_skipped, 3);
        assert!(rx.queue().is_empty());
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let g = Geometry::new(32, 32);
        let (_sink, source) = memory::channel(1);
        let config = ReceiverConfig::default().queue_capacity(1);
        let mut rx = ReceivePipeline::new(
            &config,
            source,
            BoundedQueue::new(1),
            Arc::new(ReceiveStats::new()),
        )
        .unwrap();

        for cycle in encoded_chunks(g, 3, true) {
            for chunk in cycle {
                rx.handle_chunk(chunk).unwrap();
            }
        }

        let first = rx.queue().try_pop().unwrap();
        assert_eq!(first.pts(), Some(0));
        assert_eq!(rx.stats().snapshot().frames_dropped, 2);
    }

    #[test]
    fn test_receiver_thread_over_memory() {
        let g = Geometry::new(64, 64);
        let (mut sink, source) = memory::channel(256);
        let mut receiver = Receiver::with_source(
            ReceiverConfig::default().poll_interval(Duration::from_millis(5)),
            source,
        )
        .unwrap();
        assert!(receiver.is_running());
        assert!(receiver.get().is_none());

        use crate::transport::ChunkSink;
        for cycle in encoded_chunks(g, 2, true) {
            for chunk in cycle {
                sink.send(chunk).unwrap();
            }
        }

        let a = receiver.get_timeout(Duration::from_secs(2)).unwrap();
        let b = receiver.get_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(a.pts(), Some(0));
        assert_eq!(b.pts(), Some(9000));

        receiver.stop();
        assert!(!receiver.is_running());
        receiver.stop();
    }

    #[test]
    fn test_closed_source_ends_thread() {
        let (sink, source) = memory::channel(4);
        let receiver = Receiver::with_source(
            ReceiverConfig::default().poll_interval(Duration::from_millis(5)),
            source,
        )
        .unwrap();
        drop(sink);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while receiver.is_running() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!receiver.is_running());
    }
}
