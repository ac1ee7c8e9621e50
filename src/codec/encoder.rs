//! H.264 encoder session

use bytes::Bytes;
use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate, UsageType};
use openh264::formats::YUVSource;
use openh264::OpenH264API;

use crate::codec::unit::{rescale, AccessUnit, Rational, STREAM_TIME_BASE};
use crate::config::CodecConfig;
use crate::error::{CodecError, InitError};
use crate::media::convert::YuvPlanes;
use crate::media::frame::Geometry;
use crate::media::h264::contains_idr;

impl YUVSource for YuvPlanes<'_> {
    fn dimensions(&self) -> (usize, usize) {
        (self.geometry.width as usize, self.geometry.height as usize)
    }

    fn strides(&self) -> (usize, usize, usize) {
        (self.strides[0], self.strides[1], self.strides[2])
    }

    fn y(&self) -> &[u8] {
        self.y
    }

    fn u(&self) -> &[u8] {
        self.u
    }

    fn v(&self) -> &[u8] {
        self.v
    }
}

/// Real-time, single-threaded H.264 encoder bound to one geometry.
///
/// Every submitted picture is encoded immediately (no lookahead, no frame
/// skipping), so one submit yields at most one access unit. An IDR is
/// forced every `gop_size` pictures.
pub struct EncoderSession {
    encoder: Encoder,
    geometry: Geometry,
    gop_size: u32,
    codec_time_base: Rational,
    frame_duration: i64,
    next_pts: i64,
    submitted: u64,
    produced: u64,
    bytes_out: u64,
}

impl EncoderSession {
    pub fn new(geometry: Geometry, config: &CodecConfig) -> Result<Self, InitError> {
        if !geometry.is_yuv420_compatible() {
            return Err(InitError::InvalidGeometry(geometry));
        }

        let encoder_config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(config.bitrate_bps))
            .max_frame_rate(FrameRate::from_hz(config.fps as f32))
            .usage_type(UsageType::CameraVideoRealTime)
            .skip_frames(false)
            .num_threads(1);

        let encoder = Encoder::with_api_config(OpenH264API::from_source(), encoder_config)
            .map_err(|e| InitError::Encoder(e.to_string()))?;

        let codec_time_base = Rational::new(1, config.fps.max(1) as i64);
        let frame_duration = rescale(1, codec_time_base, STREAM_TIME_BASE);

        tracing::info!(
            geometry = %geometry,
            fps = config.fps,
            bitrate = config.bitrate_bps,
            gop = config.gop_size,
            "Encoder session opened"
        );

        Ok(Self {
            encoder,
            geometry,
            gop_size: config.gop_size.max(1),
            codec_time_base,
            frame_duration,
            next_pts: 0,
            submitted: 0,
            produced: 0,
            bytes_out: 0,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn codec_time_base(&self) -> Rational {
        self.codec_time_base
    }

    /// Duration of one picture in the stream time base
    pub fn frame_duration(&self) -> i64 {
        self.frame_duration
    }

    /// Encode one picture and drain every access unit it produced.
    ///
    /// Each drained unit carries the running pts, which then advances by
    /// one frame duration.
    pub fn submit(&mut self, picture: &YuvPlanes<'_>) -> Result<Vec<AccessUnit>, CodecError> {
        if picture.geometry != self.geometry {
            return Err(CodecError::Encode(format!(
                "picture is {}, session is {}",
                picture.geometry, self.geometry
            )));
        }

        if self.submitted % self.gop_size as u64 == 0 {
            self.encoder.force_intra_frame();
        }
        self.submitted += 1;

        let data = self
            .encoder
            .encode(picture)
            .map_err(|e| CodecError::Encode(e.to_string()))?
            .to_vec();

        if data.is_empty() {
            tracing::trace!(frame = self.submitted, "Encoder produced no output");
            return Ok(Vec::new());
        }

        let keyframe = contains_idr(&data);
        let unit = AccessUnit::new(Bytes::from(data), keyframe).with_pts(Some(self.next_pts));
        self.next_pts += self.frame_duration;
        self.produced += 1;
        self.bytes_out += unit.len() as u64;

        tracing::trace!(
            pts = unit.pts(),
            len = unit.len(),
            keyframe,
            "Access unit encoded"
        );
        Ok(vec![unit])
    }

    /// Pictures submitted so far
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Access units produced so far
    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        tracing::info!(
            frames = self.produced,
            kbytes = self.bytes_out / 1024,
            "Encoder session closed"
        );
    }
}

impl std::fmt::Debug for EncoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderSession")
            .field("geometry", &self.geometry)
            .field("gop_size", &self.gop_size)
            .field("next_pts", &self.next_pts)
            .field("submitted", &self.submitted)
            .finish()
    }
}
