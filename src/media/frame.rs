//! Raw picture buffers
//!
//! A [`Frame`] is a rectangular pixel buffer in one of the layouts the
//! pipeline understands: interleaved 8-bit RGB/BGR on the application side,
//! planar YUV 4:2:0 (I420) on the codec side.
//!
//! Planes are stored back to back in a single `Bytes` allocation, so frames
//! are cheap to clone and to hand across the delivery queue.

use std::fmt;

use bytes::Bytes;

use crate::error::FrameError;
use crate::media::convert::rgb_to_yuv;

/// Picture dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    /// Create a new geometry
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of luma samples
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Chroma plane dimensions for 4:2:0 subsampling
    pub fn chroma(&self) -> (usize, usize) {
        (
            (self.width as usize).div_ceil(2),
            (self.height as usize).div_ceil(2),
        )
    }

    /// Whether a 4:2:0 encoder can take this geometry (non-zero, even)
    pub fn is_yuv420_compatible(&self) -> bool {
        self.width > 0 && self.height > 0 && self.width % 2 == 0 && self.height % 2 == 0
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel layout of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Interleaved 8-bit R, G, B
    Rgb24,
    /// Interleaved 8-bit B, G, R
    Bgr24,
    /// Planar Y, U, V with 2x2 chroma subsampling
    I420,
}

impl PixelFormat {
    /// Number of planes
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 1,
            PixelFormat::I420 => 3,
        }
    }

    /// Whether this is a single-plane 3-channel layout
    pub fn is_interleaved(&self) -> bool {
        self.plane_count() == 1
    }

    /// Minimal (tightly packed) stride per plane; unused planes are 0
    pub fn packed_strides(&self, geometry: Geometry) -> [usize; 3] {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => [geometry.width as usize * 3, 0, 0],
            PixelFormat::I420 => {
                let (cw, _) = geometry.chroma();
                [geometry.width as usize, cw, cw]
            }
        }
    }

    /// Rows in the given plane
    pub fn plane_rows(&self, plane: usize, geometry: Geometry) -> usize {
        match (self, plane) {
            (_, 0) => geometry.height as usize,
            (PixelFormat::I420, 1 | 2) => geometry.chroma().1,
            _ => 0,
        }
    }

    /// Size of a tightly packed buffer
    pub fn packed_size(&self, geometry: Geometry) -> usize {
        let strides = self.packed_strides(geometry);
        (0..self.plane_count())
            .map(|p| strides[p] * self.plane_rows(p, geometry))
            .sum()
    }
}

/// A decoded or to-be-encoded picture
#[derive(Debug, Clone)]
pub struct Frame {
    geometry: Geometry,
    format: PixelFormat,
    strides: [usize; 3],
    data: Bytes,
    pts: Option<i64>,
}

impl Frame {
    /// Create a frame from a tightly packed buffer
    pub fn new(
        geometry: Geometry,
        format: PixelFormat,
        data: impl Into<Bytes>,
    ) -> Result<Self, FrameError> {
        Self::with_strides(geometry, format, format.packed_strides(geometry), data)
    }

    /// Create a frame with explicit per-plane strides (row padding allowed)
    pub fn with_strides(
        geometry: Geometry,
        format: PixelFormat,
        strides: [usize; 3],
        data: impl Into<Bytes>,
    ) -> Result<Self, FrameError> {
        let data = data.into();
        let packed = format.packed_strides(geometry);

        let mut needed = 0;
        for plane in 0..format.plane_count() {
            if strides[plane] < packed[plane] {
                return Err(FrameError::InvalidStride {
                    plane,
                    stride: strides[plane],
                });
            }
            needed += strides[plane] * format.plane_rows(plane, geometry);
        }
        if data.len() < needed {
            return Err(FrameError::BufferTooSmall {
                needed,
                actual: data.len(),
            });
        }

        Ok(Self {
            geometry,
            format,
            strides,
            data,
            pts: None,
        })
    }

    /// Solid color frame. `rgb` is given in R, G, B order regardless of layout.
    pub fn solid(geometry: Geometry, rgb: [u8; 3], format: PixelFormat) -> Self {
        Self::paint(geometry, format, |_, _| rgb)
    }

    /// White canvas crossed by one black row and one black column placed at
    /// `step / 255` of the height and width. Stepping `step` animates the cross.
    pub fn pattern(geometry: Geometry, step: u8, format: PixelFormat) -> Self {
        let row = (geometry.height as usize * step as usize / 255)
            .min(geometry.height.saturating_sub(1) as usize);
        let col = (geometry.width as usize * step as usize / 255)
            .min(geometry.width.saturating_sub(1) as usize);
        Self::paint(geometry, format, |x, y| {
            if x == col || y == row {
                [0, 0, 0]
            } else {
                [255, 255, 255]
            }
        })
    }

    fn paint(geometry: Geometry, format: PixelFormat, color: impl Fn(usize, usize) -> [u8; 3]) -> Self {
        let width = geometry.width as usize;
        let height = geometry.height as usize;
        let mut data = vec![0u8; format.packed_size(geometry)];

        match format {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => {
                for y in 0..height {
                    for x in 0..width {
                        let [r, g, b] = color(x, y);
                        let px = (y * width + x) * 3;
                        let ordered = if format == PixelFormat::Rgb24 {
                            [r, g, b]
                        } else {
                            [b, g, r]
                        };
                        data[px..px + 3].copy_from_slice(&ordered);
                    }
                }
            }
            PixelFormat::I420 => {
                let (cw, ch) = geometry.chroma();
                let (luma, chroma) = data.split_at_mut(width * height);
                let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);
                for y in 0..height {
                    for x in 0..width {
                        let [r, g, b] = color(x, y);
                        let (luma_value, u, v) = rgb_to_yuv(r, g, b);
                        luma[y * width + x] = luma_value;
                        if x % 2 == 0 && y % 2 == 0 {
                            u_plane[(y / 2) * cw + x / 2] = u;
                            v_plane[(y / 2) * cw + x / 2] = v;
                        }
                    }
                }
            }
        }

        Self {
            geometry,
            format,
            strides: format.packed_strides(geometry),
            data: Bytes::from(data),
            pts: None,
        }
    }

    /// Attach a presentation timestamp (stream time base)
    pub fn with_pts(mut self, pts: Option<i64>) -> Self {
        self.pts = pts;
        self
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Stride of a plane in bytes
    pub fn stride(&self, plane: usize) -> usize {
        self.strides[plane]
    }

    /// Presentation timestamp, if the frame came out of a decoder
    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    /// Whole backing buffer
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Bytes of one plane, including row padding
    pub fn plane(&self, index: usize) -> &[u8] {
        let mut offset = 0;
        for p in 0..index {
            offset += self.strides[p] * self.format.plane_rows(p, self.geometry);
        }
        let len = self.strides[index] * self.format.plane_rows(index, self.geometry);
        &self.data[offset..offset + len]
    }

    /// RGB value of one pixel of an interleaved frame
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if !self.format.is_interleaved() || x >= self.width() || y >= self.height() {
            return None;
        }
        let px = y as usize * self.strides[0] + x as usize * 3;
        let p = &self.data[px..px + 3];
        Some(match self.format {
            PixelFormat::Rgb24 => [p[0], p[1], p[2]],
            _ => [p[2], p[1], p[0]],
        })
    }

    /// Mean R, G, B over an interleaved frame
    pub fn mean_rgb(&self) -> Option<[f64; 3]> {
        if !self.format.is_interleaved() {
            return None;
        }
        let mut sum = [0u64; 3];
        for y in 0..self.height() {
            for x in 0..self.width() {
                let rgb = self.rgb_at(x, y)?;
                for c in 0..3 {
                    sum[c] += rgb[c] as u64;
                }
            }
        }
        let n = self.geometry.pixel_count().max(1) as f64;
        Some([sum[0] as f64 / n, sum[1] as f64 / n, sum[2] as f64 / n])
    }
}
