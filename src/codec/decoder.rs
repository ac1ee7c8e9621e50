//! H.264 decoder session

use openh264::decoder::Decoder;
use openh264::formats::YUVSource;

use crate::codec::unit::AccessUnit;
use crate::error::{CodecError, InitError};
use crate::media::convert::YuvPlanes;
use crate::media::frame::Geometry;

/// Single-threaded H.264 decoder.
///
/// The decoder runs without output delay, so a complete access unit yields
/// its picture on the same submit. Parameter-set-only units and corrupted
/// units yield nothing; callers must not assume one picture per unit.
pub struct DecoderSession {
    decoder: Decoder,
    submitted: u64,
    decoded: u64,
    errors: u64,
    geometry: Option<Geometry>,
}

impl DecoderSession {
    pub fn new() -> Result<Self, InitError> {
        let decoder = Decoder::new().map_err(|e| InitError::Decoder(e.to_string()))?;
        tracing::debug!("Decoder session opened");
        Ok(Self {
            decoder,
            submitted: 0,
            decoded: 0,
            errors: 0,
            geometry: None,
        })
    }

    /// Decode one access unit and hand the picture to `on_picture`.
    ///
    /// `Ok(None)` means the decoder needs more input. The planes borrow the
    /// decoder's picture buffer, so they only live for the callback.
    pub fn submit<R>(
        &mut self,
        unit: &AccessUnit,
        on_picture: impl FnOnce(&YuvPlanes<'_>) -> R,
    ) -> Result<Option<R>, CodecError> {
        self.submitted += 1;

        let picture = match self.decoder.decode(unit.data()) {
            Ok(Some(picture)) => picture,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.errors += 1;
                return Err(CodecError::Decode(e.to_string()));
            }
        };

        let (width, height) = picture.dimensions();
        let geometry = Geometry::new(width as u32, height as u32);
        if self.geometry != Some(geometry) {
            tracing::info!(geometry = %geometry, "Decoder picture size");
            self.geometry = Some(geometry);
        }

        let (ys, us, vs) = picture.strides();
        let planes = YuvPlanes {
            geometry,
            y: picture.y(),
            u: picture.u(),
            v: picture.v(),
            strides: [ys, us, vs],
        };
        let out = on_picture(&planes);
        self.decoded += 1;
        Ok(Some(out))
    }

    /// Geometry of the last decoded picture
    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        tracing::info!(
            units = self.submitted,
            frames = self.decoded,
            errors = self.errors,
            "Decoder session closed"
        );
    }
}

impl std::fmt::Debug for DecoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderSession")
            .field("submitted", &self.submitted)
            .field("decoded", &self.decoded)
            .field("geometry", &self.geometry)
            .finish()
    }
}
