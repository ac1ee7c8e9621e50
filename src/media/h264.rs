//! H.264 Annex-B bitstream parsing
//!
//! The encoder emits Annex-B byte streams: NAL units separated by
//! `00 00 01` or `00 00 00 01` start codes. Transport messages cut that
//! stream at arbitrary points, so the receive side runs an
//! [`AccessUnitParser`] that accumulates bytes across calls and groups NAL
//! units into access units using the H.264 boundary rules (7.4.1.2.3):
//!
//! ```text
//! a new access unit starts at the first of
//!   AUD | SPS | PPS | SEI | NAL types 14..=18
//!   VCL slice with first_mb_in_slice == 0
//! that follows a VCL NAL unit of the current access unit
//! ```
//!
//! Boundaries come from the bitstream grammar, never from transport framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::unit::AccessUnit;
use crate::error::ProtocolError;

/// Four-byte Annex-B start code
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Access unit delimiter NAL (primary_pic_type 7: any slice type)
pub const ACCESS_UNIT_DELIMITER: [u8; 6] = [0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];

/// Upper bound on bytes held by the parser without an access unit boundary
pub const MAX_PARSER_BUFFER: usize = 4 * 1024 * 1024;

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// Slice data partition A
    SlicePartA = 2,
    /// Slice data partition B
    SlicePartB = 3,
    /// Slice data partition C
    SlicePartC = 4,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    /// End of sequence
    EndSeq = 10,
    /// End of stream
    EndStream = 11,
    /// Filler data
    Filler = 12,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            2 => Some(NaluType::SlicePartA),
            3 => Some(NaluType::SlicePartB),
            4 => Some(NaluType::SlicePartC),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            10 => Some(NaluType::EndSeq),
            11 => Some(NaluType::EndStream),
            12 => Some(NaluType::Filler),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, NaluType::Idr)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }

    /// Slice or slice partition carrying picture data
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            NaluType::Slice
                | NaluType::SlicePartA
                | NaluType::SlicePartB
                | NaluType::SlicePartC
                | NaluType::Idr
        )
    }
}

/// One NAL unit, header byte included, start code stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    data: Bytes,
}

impl NalUnit {
    /// Wrap NAL bytes. Returns `None` for an empty buffer.
    pub fn new(data: Bytes) -> Option<Self> {
        if data.is_empty() {
            None
        } else {
            Some(Self { data })
        }
    }

    /// nal_unit_type, 5 bits
    pub fn raw_type(&self) -> u8 {
        self.data[0] & 0x1F
    }

    pub fn nal_type(&self) -> Option<NaluType> {
        NaluType::from_byte(self.data[0])
    }

    /// nal_ref_idc, 2 bits
    pub fn ref_idc(&self) -> u8 {
        (self.data[0] >> 5) & 0x03
    }

    pub fn is_vcl(&self) -> bool {
        self.nal_type().is_some_and(|t| t.is_vcl())
    }

    pub fn is_keyframe(&self) -> bool {
        self.nal_type().is_some_and(|t| t.is_keyframe())
    }

    /// Whether a slice has `first_mb_in_slice == 0`.
    ///
    /// first_mb_in_slice is the first ue(v) field of the slice header; the
    /// value 0 is coded as a single `1` bit.
    pub fn is_first_slice(&self) -> bool {
        self.is_vcl() && self.data.len() > 1 && self.data[1] & 0x80 != 0
    }

    /// Whether this NAL opens a new access unit once the current one has
    /// picture data
    fn opens_access_unit(&self) -> bool {
        match self.raw_type() {
            6..=9 | 14..=18 => true,
            _ => self.is_first_slice(),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Locate the next start code at or after `from`.
/// Returns its position and length (3 or 4 bytes).
fn find_start_code(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= buf.len() {
        if buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 1 {
            if i > from && buf[i - 1] == 0 {
                return Some((i - 1, 4));
            }
            return Some((i, 3));
        }
        i += 1;
    }
    None
}

fn trim_trailing_zeros(nal: &mut BytesMut) {
    while nal.last() == Some(&0) {
        nal.truncate(nal.len() - 1);
    }
}

/// Iterator over the NAL units of a complete Annex-B buffer
pub struct AnnexBIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> AnnexBIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let offset = find_start_code(data, 0).map_or(data.len(), |(pos, len)| pos + len);
        Self { data, offset }
    }
}

impl<'a> Iterator for AnnexBIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset < self.data.len() {
            let start = self.offset;
            let end = match find_start_code(self.data, start) {
                Some((pos, len)) => {
                    self.offset = pos + len;
                    pos
                }
                None => {
                    self.offset = self.data.len();
                    self.data.len()
                }
            };

            let mut nal = &self.data[start..end];
            while let [rest @ .., 0] = nal {
                nal = rest;
            }
            if !nal.is_empty() {
                return Some(nal);
            }
        }
        None
    }
}

/// Whether an Annex-B buffer contains an IDR slice
pub fn contains_idr(data: &[u8]) -> bool {
    AnnexBIterator::new(data).any(|nal| NaluType::from_byte(nal[0]) == Some(NaluType::Idr))
}

/// Streaming Annex-B parser producing complete access units
#[derive(Debug)]
pub struct AccessUnitParser {
    /// Unsplit bytes; starts at a start code once synchronized
    buffer: BytesMut,
    /// NAL units of the access unit being assembled
    pending: Vec<NalUnit>,
    pending_bytes: usize,
    has_vcl: bool,
    max_buffer: usize,
}

impl AccessUnitParser {
    pub fn new() -> Self {
        Self::with_limit(MAX_PARSER_BUFFER)
    }

    /// Parser with a custom buffer bound
    pub fn with_limit(max_buffer: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            pending: Vec::new(),
            pending_bytes: 0,
            has_vcl: false,
            max_buffer,
        }
    }

    /// Feed an arbitrary slice of the byte stream.
    ///
    /// Returns every access unit completed by this input. On overflow the
    /// held bytes are discarded and an error is returned; the parser stays
    /// usable and resynchronizes on the next start code.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<AccessUnit>, ProtocolError> {
        self.buffer.extend_from_slice(data);

        let held = self.buffer.len() + self.pending_bytes;
        if held > self.max_buffer {
            tracing::warn!(
                bytes = held,
                limit = self.max_buffer,
                "Parser buffer overflow, discarding"
            );
            self.reset();
            return Err(ProtocolError::ParserOverflow(held));
        }

        let mut out = Vec::new();
        loop {
            let Some((start, sc_len)) = find_start_code(&self.buffer, 0) else {
                // keep a possible partial start code
                if self.buffer.len() > 3 {
                    let junk = self.buffer.len() - 3;
                    tracing::debug!(bytes = junk, "Discarding bytes without start code");
                    self.buffer.advance(junk);
                }
                break;
            };
            if start > 0 {
                tracing::debug!(bytes = start, "Discarding bytes before start code");
                self.buffer.advance(start);
                continue;
            }

            let next = match find_start_code(&self.buffer, sc_len) {
                Some((next, _)) => next,
                // an AUD is always two bytes, it need not wait for the next start code
                None if self.buffer.len() == sc_len + 2
                    && self.buffer[sc_len] & 0x1F == NaluType::Aud as u8 =>
                {
                    self.buffer.len()
                }
                None => break,
            };

            let mut nal = self.buffer.split_to(next);
            nal.advance(sc_len);
            trim_trailing_zeros(&mut nal);
            if let Some(nal) = NalUnit::new(nal.freeze()) {
                self.push_nal(nal, &mut out);
            }
        }

        Ok(out)
    }

    /// Terminate the trailing NAL unit and close the current access unit.
    ///
    /// A unit without picture data (for example a lone AUD or parameter
    /// sets) is kept as the prefix of the next unit instead of being
    /// emitted.
    pub fn flush(&mut self) -> Vec<AccessUnit> {
        let mut out = Vec::new();

        match find_start_code(&self.buffer, 0) {
            Some((0, sc_len)) => {
                let mut nal = self.buffer.split();
                nal.advance(sc_len);
                trim_trailing_zeros(&mut nal);
                if let Some(nal) = NalUnit::new(nal.freeze()) {
                    self.push_nal(nal, &mut out);
                }
            }
            _ => self.buffer.clear(),
        }

        if self.has_vcl {
            out.push(self.take_unit());
        }
        out
    }

    /// Drop all held bytes and NAL units
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending.clear();
        self.pending_bytes = 0;
        self.has_vcl = false;
    }

    /// Bytes currently held (unsplit plus pending NAL units)
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending_bytes
    }

    fn push_nal(&mut self, nal: NalUnit, out: &mut Vec<AccessUnit>) {
        tracing::trace!(nal_type = nal.raw_type(), len = nal.len(), "NAL unit");
        if self.has_vcl && nal.opens_access_unit() {
            out.push(self.take_unit());
        }
        self.has_vcl |= nal.is_vcl();
        self.pending_bytes += nal.len();
        self.pending.push(nal);
    }

    fn take_unit(&mut self) -> AccessUnit {
        let size = self.pending_bytes + self.pending.len() * START_CODE.len();
        let mut data = BytesMut::with_capacity(size);
        let mut keyframe = false;
        for nal in self.pending.drain(..) {
            keyframe |= nal.is_keyframe();
            data.put_slice(&START_CODE);
            data.put_slice(nal.data());
        }
        self.pending_bytes = 0;
        self.has_vcl = false;
        AccessUnit::new(data.freeze(), keyframe)
    }
}

impl Default for AccessUnitParser {
    fn default() -> Self {
        Self::new()
    }
}
