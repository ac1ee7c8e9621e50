//! Encoded access units and timestamp arithmetic

use bytes::Bytes;

/// One access unit in Annex-B form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    data: Bytes,
    pts: Option<i64>,
    keyframe: bool,
}

impl AccessUnit {
    pub fn new(data: Bytes, keyframe: bool) -> Self {
        Self {
            data,
            pts: None,
            keyframe,
        }
    }

    /// Attach a presentation timestamp in the stream time base
    pub fn with_pts(mut self, pts: Option<i64>) -> Self {
        self.pts = pts;
        self
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn is_keyframe(&self) -> bool {
        self.keyframe
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Rational number used as a time base (seconds per tick)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }
}

/// RTP clock for H.264 (RFC 6184)
pub const STREAM_TIME_BASE: Rational = Rational::new(1, 90_000);

/// Convert `value` ticks of `from` into ticks of `to`, rounding to nearest
/// (halves away from zero).
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    let num = value as i128 * from.num as i128 * to.den as i128;
    let den = from.den as i128 * to.num as i128;
    if den == 0 {
        return 0;
    }
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    let half = den / 2;
    let rounded = if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    };
    rounded as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_frame_duration() {
        assert_eq!(rescale(1, Rational::new(1, 30), STREAM_TIME_BASE), 3000);
        assert_eq!(rescale(1, Rational::new(1, 25), STREAM_TIME_BASE), 3600);
        // 90000 / 7 = 12857.14
        assert_eq!(rescale(1, Rational::new(1, 7), STREAM_TIME_BASE), 12857);
        // 90000 / 11 = 8181.8
        assert_eq!(rescale(1, Rational::new(1, 11), STREAM_TIME_BASE), 8182);
    }

    #[test]
    fn test_rescale_round_trip_and_sign() {
        assert_eq!(rescale(3000, STREAM_TIME_BASE, Rational::new(1, 1000)), 33);
        assert_eq!(rescale(-3, Rational::new(1, 2), Rational::new(1, 1)), -2);
        assert_eq!(rescale(5, Rational::new(1, 0), STREAM_TIME_BASE), 0);
    }

    #[test]
    fn test_access_unit_accessors() {
        let unit = AccessUnit::new(Bytes::from_static(&[0, 0, 0, 1, 0x65]), true).with_pts(Some(3000));
        assert!(unit.is_keyframe());
        assert_eq!(unit.pts(), Some(3000));
        assert_eq!(unit.len(), 5);
        assert!(!unit.is_empty());
        assert_eq!(unit.into_data().len(), 5);
    }
}
