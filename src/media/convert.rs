//! Colorspace conversion between interleaved RGB/BGR and planar I420
//!
//! Conversion uses BT.601 limited-range coefficients in 8.8 fixed point,
//! which is what H.264 decoders assume when no VUI colour description is
//! present. Geometry never changes: width and height on both sides are the
//! ones the converter was built with.
//!
//! A converter owns one scratch buffer of `width * height * 3 + padding`
//! bytes allocated at construction and reused for every frame. Results are
//! returned as borrows into that buffer, so callers copy out only when they
//! need to keep the data.

use crate::error::{FrameError, InitError};
use crate::media::frame::{Frame, Geometry, PixelFormat};

/// Extra bytes at the end of the scratch buffer
pub const SCRATCH_PADDING: usize = 16;

/// Convert one RGB pixel to limited-range Y, U, V
#[inline]
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (clamp(y), clamp(u), clamp(v))
}

/// Convert one limited-range Y, U, V sample to R, G, B
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [clamp(r), clamp(g), clamp(b)]
}

#[inline]
fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Borrowed planar 4:2:0 picture
#[derive(Debug, Clone, Copy)]
pub struct YuvPlanes<'a> {
    pub geometry: Geometry,
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    /// Row stride of the Y, U and V planes
    pub strides: [usize; 3],
}

impl<'a> YuvPlanes<'a> {
    /// View the planes of an I420 frame
    pub fn from_frame(frame: &'a Frame) -> Option<Self> {
        if frame.format() != PixelFormat::I420 {
            return None;
        }
        Some(Self {
            geometry: frame.geometry(),
            y: frame.plane(0),
            u: frame.plane(1),
            v: frame.plane(2),
            strides: [frame.stride(0), frame.stride(1), frame.stride(2)],
        })
    }

    /// Copy the planes into an owned, tightly packed I420 frame
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        self.check()?;
        let geometry = self.geometry;
        let (cw, ch) = geometry.chroma();
        let width = geometry.width as usize;
        let height = geometry.height as usize;

        let mut out = Vec::with_capacity(PixelFormat::I420.packed_size(geometry));
        for (plane, stride, w, rows) in [
            (self.y, self.strides[0], width, height),
            (self.u, self.strides[1], cw, ch),
            (self.v, self.strides[2], cw, ch),
        ] {
            for row in 0..rows {
                out.extend_from_slice(&plane[row * stride..row * stride + w]);
            }
        }
        Frame::new(geometry, PixelFormat::I420, out)
    }

    fn check(&self) -> Result<(), FrameError> {
        let (cw, ch) = self.geometry.chroma();
        let rows = [self.geometry.height as usize, ch, ch];
        let widths = [self.geometry.width as usize, cw, cw];
        let planes = [self.y, self.u, self.v];
        for p in 0..3 {
            if self.strides[p] < widths[p] {
                return Err(FrameError::InvalidStride {
                    plane: p,
                    stride: self.strides[p],
                });
            }
            // last row need not be padded out to the full stride
            let needed = self.strides[p] * rows[p].saturating_sub(1) + widths[p];
            if planes[p].len() < needed {
                return Err(FrameError::BufferTooSmall {
                    needed,
                    actual: planes[p].len(),
                });
            }
        }
        Ok(())
    }
}

/// Fixed-geometry converter between two pixel layouts
#[derive(Debug)]
pub struct ColorConverter {
    geometry: Geometry,
    from: PixelFormat,
    to: PixelFormat,
    scratch: Vec<u8>,
}

impl ColorConverter {
    /// Build a converter for frames of `geometry`.
    ///
    /// Supported pairs: interleaved RGB/BGR to I420, I420 to interleaved
    /// RGB/BGR, and RGB to BGR (or back). Planar conversions need even,
    /// non-zero dimensions.
    pub fn new(geometry: Geometry, from: PixelFormat, to: PixelFormat) -> Result<Self, InitError> {
        let supported = from.is_interleaved() != to.is_interleaved()
            || (from.is_interleaved() && to.is_interleaved() && from != to);
        if !supported {
            return Err(InitError::UnsupportedConversion { from, to });
        }
        let planar = from == PixelFormat::I420 || to == PixelFormat::I420;
        if planar && !geometry.is_yuv420_compatible() {
            return Err(InitError::InvalidGeometry(geometry));
        }
        if geometry.pixel_count() == 0 {
            return Err(InitError::InvalidGeometry(geometry));
        }

        tracing::debug!(
            geometry = %geometry,
            from = ?from,
            to = ?to,
            "Color converter created"
        );

        Ok(Self {
            geometry,
            from,
            to,
            scratch: vec![0u8; geometry.pixel_count() * 3 + SCRATCH_PADDING],
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn source_format(&self) -> PixelFormat {
        self.from
    }

    pub fn target_format(&self) -> PixelFormat {
        self.to
    }

    /// Size of the persistent scratch buffer
    pub fn scratch_capacity(&self) -> usize {
        self.scratch.len()
    }

    /// Convert an interleaved frame to I420, returning a view into scratch
    pub fn to_planar(&mut self, frame: &Frame) -> Result<YuvPlanes<'_>, FrameError> {
        self.check_frame(frame)?;
        if self.to != PixelFormat::I420 {
            return Err(FrameError::FormatMismatch {
                expected: PixelFormat::I420,
                actual: self.to,
            });
        }

        let geometry = self.geometry;
        let (cw, ch) = geometry.chroma();
        let luma_len = geometry.pixel_count();
        let chroma_len = cw * ch;

        interleaved_to_i420(
            frame.plane(0),
            frame.stride(0),
            geometry,
            frame.format() == PixelFormat::Bgr24,
            &mut self.scratch[..luma_len + 2 * chroma_len],
        );

        let (y, rest) = self.scratch.split_at(luma_len);
        let (u, rest) = rest.split_at(chroma_len);
        let v = &rest[..chroma_len];
        Ok(YuvPlanes {
            geometry,
            y,
            u,
            v,
            strides: [geometry.width as usize, cw, cw],
        })
    }

    /// Convert planar 4:2:0 data to the interleaved target layout.
    /// Returns the packed pixels, borrowed from scratch.
    pub fn from_planar(&mut self, planes: &YuvPlanes<'_>) -> Result<&[u8], FrameError> {
        if planes.geometry != self.geometry {
            return Err(FrameError::GeometryMismatch {
                expected: self.geometry,
                actual: planes.geometry,
            });
        }
        if self.from != PixelFormat::I420 {
            return Err(FrameError::FormatMismatch {
                expected: self.from,
                actual: PixelFormat::I420,
            });
        }
        planes.check()?;

        let len = self.geometry.pixel_count() * 3;
        i420_to_interleaved(
            planes,
            self.to == PixelFormat::Bgr24,
            &mut self.scratch[..len],
        );
        Ok(&self.scratch[..len])
    }

    /// Convert a frame into a new, owned frame in the target layout
    pub fn convert(&mut self, frame: &Frame) -> Result<Frame, FrameError> {
        self.check_frame(frame)?;
        let geometry = self.geometry;
        let to = self.to;

        let packed: Vec<u8> = if to == PixelFormat::I420 {
            let planes = self.to_planar(frame)?;
            let mut out = Vec::with_capacity(to.packed_size(geometry));
            out.extend_from_slice(planes.y);
            out.extend_from_slice(planes.u);
            out.extend_from_slice(planes.v);
            out
        } else if self.from == PixelFormat::I420 {
            let planes = YuvPlanes::from_frame(frame).ok_or(FrameError::FormatMismatch {
                expected: PixelFormat::I420,
                actual: frame.format(),
            })?;
            self.from_planar(&planes)?.to_vec()
        } else {
            let len = geometry.pixel_count() * 3;
            swap_red_blue(frame.plane(0), frame.stride(0), geometry, &mut self.scratch[..len]);
            self.scratch[..len].to_vec()
        };

        Frame::new(geometry, to, packed).map(|f| f.with_pts(frame.pts()))
    }

    fn check_frame(&self, frame: &Frame) -> Result<(), FrameError> {
        if frame.geometry() != self.geometry {
            return Err(FrameError::GeometryMismatch {
                expected: self.geometry,
                actual: frame.geometry(),
            });
        }
        if frame.format() != self.from {
            return Err(FrameError::FormatMismatch {
                expected: self.from,
                actual: frame.format(),
            });
        }
        Ok(())
    }
}

fn interleaved_to_i420(src: &[u8], stride: usize, geometry: Geometry, bgr: bool, dst: &mut [u8]) {
    let width = geometry.width as usize;
    let height = geometry.height as usize;
    let (cw, ch) = geometry.chroma();
    let (luma, chroma) = dst.split_at_mut(width * height);
    let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);

    let rgb_at = |x: usize, y: usize| -> (u8, u8, u8) {
        let p = &src[y * stride + x * 3..y * stride + x * 3 + 3];
        if bgr {
            (p[2], p[1], p[0])
        } else {
            (p[0], p[1], p[2])
        }
    };

    for y in 0..height {
        for x in 0..width {
            let (r, g, b) = rgb_at(x, y);
            luma[y * width + x] = rgb_to_yuv(r, g, b).0;
        }
    }

    // chroma from the average colour of each 2x2 block
    for cy in 0..ch {
        for cx in 0..cw {
            let mut sum = [0u32; 3];
            let mut n = 0u32;
            for y in (cy * 2)..(cy * 2 + 2).min(height) {
                for x in (cx * 2)..(cx * 2 + 2).min(width) {
                    let (r, g, b) = rgb_at(x, y);
                    sum[0] += r as u32;
                    sum[1] += g as u32;
                    sum[2] += b as u32;
                    n += 1;
                }
            }
            let avg = |s: u32| ((s + n / 2) / n) as u8;
            let (_, u, v) = rgb_to_yuv(avg(sum[0]), avg(sum[1]), avg(sum[2]));
            u_plane[cy * cw + cx] = u;
            v_plane[cy * cw + cx] = v;
        }
    }
}

fn i420_to_interleaved(planes: &YuvPlanes<'_>, bgr: bool, dst: &mut [u8]) {
    let width = planes.geometry.width as usize;
    let height = planes.geometry.height as usize;
    let [ys, us, vs] = planes.strides;

    for y in 0..height {
        let row = &mut dst[y * width * 3..(y + 1) * width * 3];
        for x in 0..width {
            let luma = planes.y[y * ys + x];
            let u = planes.u[(y / 2) * us + x / 2];
            let v = planes.v[(y / 2) * vs + x / 2];
            let [r, g, b] = yuv_to_rgb(luma, u, v);
            let px = &mut row[x * 3..x * 3 + 3];
            if bgr {
                px.copy_from_slice(&[b, g, r]);
            } else {
                px.copy_from_slice(&[r, g, b]);
            }
        }
    }
}

fn swap_red_blue(src: &[u8], stride: usize, geometry: Geometry, dst: &mut [u8]) {
    let width = geometry.width as usize;
    for y in 0..geometry.height as usize {
        for x in 0..width {
            let s = y * stride + x * 3;
            let d = (y * width + x) * 3;
            dst[d] = src[s + 2];
            dst[d + 1] = src[s + 1];
            dst[d + 2] = src[s];
        }
    }
}
