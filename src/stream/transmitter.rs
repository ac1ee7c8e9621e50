//! Encode side of the pipeline
//!
//! ```text
//! Frame -> ColorConverter -> EncoderSession -> TransmitFramer -> ChunkSink
//! ```
//!
//! The transmitter runs on the caller's thread. Geometry and pixel layout
//! are captured from the first frame, which also opens the converter and
//! the encoder. Later frames must match both.

use std::sync::Arc;

use crate::codec::encoder::EncoderSession;
use crate::codec::unit::AccessUnit;
use crate::config::{CodecConfig, TransmitterConfig};
use crate::error::{FrameError, Result};
use crate::media::convert::{ColorConverter, YuvPlanes};
use crate::media::frame::{Frame, Geometry, PixelFormat};
use crate::protocol::framer::TransmitFramer;
use crate::stats::metrics::TransmitStats;
use crate::stream::sdp::SessionDescriptor;
use crate::transport::{ChunkSink, SendOutcome, TcpPublisher};

/// Converter and encoder opened on the first frame
struct EncodeState {
    geometry: Geometry,
    format: PixelFormat,
    /// None when frames already arrive as I420
    converter: Option<ColorConverter>,
    encoder: EncoderSession,
}

impl EncodeState {
    fn open(frame: &Frame, codec: &CodecConfig) -> Result<Self> {
        let geometry = frame.geometry();
        let format = frame.format();
        let converter = match format {
            PixelFormat::I420 => None,
            _ => Some(ColorConverter::new(geometry, format, PixelFormat::I420)?),
        };
        let encoder = EncoderSession::new(geometry, codec)?;
        Ok(Self {
            geometry,
            format,
            converter,
            encoder,
        })
    }

    fn check(&self, frame: &Frame) -> std::result::Result<(), FrameError> {
        if frame.geometry() != self.geometry {
            return Err(FrameError::GeometryMismatch {
                expected: self.geometry,
                actual: frame.geometry(),
            });
        }
        if frame.format() != self.format {
            return Err(FrameError::FormatMismatch {
                expected: self.format,
                actual: frame.format(),
            });
        }
        Ok(())
    }
}

/// Frame-driven H.264 transmitter
pub struct Transmitter<S: ChunkSink = TcpPublisher> {
    // dropped first: encoder and scaler go before the transport
    state: Option<EncodeState>,
    framer: TransmitFramer,
    config: TransmitterConfig,
    stats: Arc<TransmitStats>,
    sink: S,
}

impl Transmitter<TcpPublisher> {
    /// Bind a TCP publisher on `config.bind_addr`
    pub fn bind(config: TransmitterConfig) -> Result<Self> {
        let publisher = TcpPublisher::bind(&config)?;
        Ok(Self::with_sink(config, publisher))
    }
}

impl<S: ChunkSink> Transmitter<S> {
    /// Transmit over an already opened sink
    pub fn with_sink(config: TransmitterConfig, sink: S) -> Self {
        Self {
            state: None,
            framer: TransmitFramer::new(config.max_chunk_size, config.codec.access_unit_delimiter),
            config,
            stats: Arc::new(TransmitStats::new()),
            sink,
        }
    }

    /// Encode one frame and send every access unit it produced.
    ///
    /// Frames that do not match the first frame's geometry or layout are
    /// rejected without touching encoder state. An encoder failure drops
    /// the frame and is returned; the session stays usable. Chunks refused
    /// by a full transport queue are counted, not reported.
    pub fn encode_frame(&mut self, frame: &Frame) -> Result<()> {
        self.stats.frame_in();

        if self.state.is_none() {
            let state = EncodeState::open(frame, &self.config.codec)?;
            tracing::info!(
                geometry = %state.geometry,
                format = ?state.format,
                "Transmitter started"
            );
            self.state = Some(state);
        }
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };

        if let Err(e) = state.check(frame) {
            self.stats.frame_rejected();
            tracing::debug!(error = %e, "Frame rejected");
            return Err(e.into());
        }

        let planes = match state.converter.as_mut() {
            Some(converter) => converter.to_planar(frame),
            None => YuvPlanes::from_frame(frame).ok_or(FrameError::FormatMismatch {
                expected: PixelFormat::I420,
                actual: frame.format(),
            }),
        };
        let planes = match planes {
            Ok(planes) => planes,
            Err(e) => {
                self.stats.frame_rejected();
                return Err(e.into());
            }
        };

        let units = match state.encoder.submit(&planes) {
            Ok(units) => units,
            Err(e) => {
                self.stats.codec_error();
                tracing::warn!(error = %e, "Frame dropped");
                return Err(e.into());
            }
        };

        for unit in &units {
            self.stats.frame_encoded();
            self.send_unit(unit)?;
        }
        Ok(())
    }

    fn send_unit(&mut self, unit: &AccessUnit) -> Result<()> {
        for chunk in self.framer.frame(unit) {
            let len = chunk.encoded_len();
            match self.sink.send(chunk)? {
                SendOutcome::Delivered => self.stats.chunk_sent(len),
                SendOutcome::Dropped | SendOutcome::NoPeers => self.stats.chunk_dropped(),
            }
        }
        self.stats.unit_sent();
        Ok(())
    }

    /// SDP for out-of-band receivers, available once geometry is known
    pub fn session_descriptor(&self) -> Option<SessionDescriptor> {
        let geometry = self.geometry()?;
        let addr = self.sink.local_addr().unwrap_or(self.config.bind_addr);
        Some(SessionDescriptor::from_parts(addr, &self.config.codec, geometry))
    }

    /// Geometry captured from the first frame
    pub fn geometry(&self) -> Option<Geometry> {
        self.state.as_ref().map(|s| s.geometry)
    }

    pub fn config(&self) -> &TransmitterConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<TransmitStats> {
        Arc::clone(&self.stats)
    }

    /// Peers attached to the transport
    pub fn peer_count(&self) -> usize {
        self.sink.peer_count()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: ChunkSink> Drop for Transmitter<S> {
    fn drop(&mut self) {
        let snap = self.stats.snapshot();
        tracing::info!(
            frames = snap.frames_encoded,
            dropped_chunks = snap.chunks_dropped,
            kbytes = snap.bytes_sent / 1024,
            "Transmitter closed"
        );
    }
}

impl<S: ChunkSink> std::fmt::Debug for Transmitter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("geometry", &self.geometry())
            .field("phase", &self.framer.phase())
            .field("peers", &self.sink.peer_count())
            .finish()
    }
}
