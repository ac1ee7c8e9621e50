//! Wire chunk envelope
//!
//! Every transport message is a tagged envelope. On byte streams the
//! envelope is length-prefixed:
//!
//! ```text
//! +----------------+---------+-------------------------+
//! | length (u32 BE)| tag (u8)| payload (length - 1)    |
//! +----------------+---------+-------------------------+
//!
//! tag 0x01 Marker      payload: sequence (u64 BE) | pts (i64 BE)
//! tag 0x02 Data        payload: raw Annex-B bytes
//! tag 0x03 Terminator  payload: empty
//! ```
//!
//! The tag alone decides what a chunk is. Payload bytes are never inspected
//! to tell markers from data.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};

/// Length prefix plus tag
pub const HEADER_SIZE: usize = 5;

/// Largest accepted value of the length field
pub const MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

/// Largest data payload that fits one envelope (the length covers the tag)
pub const MAX_DATA_PAYLOAD: usize = MAX_ENVELOPE_SIZE - 1;

/// Marker payload: sequence + pts
pub const MARKER_PAYLOAD_SIZE: usize = 16;

/// Envelope tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkTag {
    Marker = 0x01,
    Data = 0x02,
    Terminator = 0x03,
}

impl ChunkTag {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(ChunkTag::Marker),
            0x02 => Some(ChunkTag::Data),
            0x03 => Some(ChunkTag::Terminator),
            _ => None,
        }
    }
}

/// One transport message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireChunk {
    /// Start of an encode cycle
    Marker {
        /// Cycle counter, increments by one per cycle
        sequence: u64,
        /// Presentation timestamp of the cycle's access unit (90 kHz)
        pts: i64,
    },
    /// Bitstream bytes of the current cycle
    Data(Bytes),
    /// End of the current cycle
    Terminator,
}

impl WireChunk {
    pub fn tag(&self) -> ChunkTag {
        match self {
            WireChunk::Marker { .. } => ChunkTag::Marker,
            WireChunk::Data(_) => ChunkTag::Data,
            WireChunk::Terminator => ChunkTag::Terminator,
        }
    }

    pub fn payload_len(&self) -> usize {
        match self {
            WireChunk::Marker { .. } => MARKER_PAYLOAD_SIZE,
            WireChunk::Data(data) => data.len(),
            WireChunk::Terminator => 0,
        }
    }

    /// Size of the length-prefixed envelope
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }

    /// Build a chunk from its tag byte and payload
    pub fn from_parts(tag: u8, mut payload: Bytes) -> std::result::Result<Self, ProtocolError> {
        match ChunkTag::from_byte(tag) {
            Some(ChunkTag::Marker) => {
                if payload.len() != MARKER_PAYLOAD_SIZE {
                    return Err(ProtocolError::MalformedMarker(payload.len()));
                }
                let sequence = payload.get_u64();
                let pts = payload.get_i64();
                Ok(WireChunk::Marker { sequence, pts })
            }
            Some(ChunkTag::Data) => Ok(WireChunk::Data(payload)),
            Some(ChunkTag::Terminator) => {
                if !payload.is_empty() {
                    return Err(ProtocolError::MalformedTerminator(payload.len()));
                }
                Ok(WireChunk::Terminator)
            }
            None => Err(ProtocolError::UnknownTag(tag)),
        }
    }

    /// Append the length-prefixed envelope to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u32((1 + self.payload_len()) as u32);
        buf.put_u8(self.tag() as u8);
        match self {
            WireChunk::Marker { sequence, pts } => {
                buf.put_u64(*sequence);
                buf.put_i64(*pts);
            }
            WireChunk::Data(data) => buf.put_slice(data),
            WireChunk::Terminator => {}
        }
    }

    /// Decode one envelope from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; nothing is consumed
    /// in that case.
    pub fn decode(buf: &mut BytesMut) -> std::result::Result<Option<Self>, ProtocolError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len == 0 || len > MAX_ENVELOPE_SIZE {
            return Err(ProtocolError::InvalidLength(len));
        }
        if buf.len() < 4 + len {
            return Ok(None);
        }

        buf.advance(4);
        let tag = buf.get_u8();
        let payload = buf.split_to(len - 1).freeze();
        Self::from_parts(tag, payload).map(Some)
    }
}

/// Read one envelope from an async byte stream.
///
/// Returns `Ok(None)` on a clean end of stream between envelopes.
pub async fn read_chunk<R>(reader: &mut R) -> Result<Option<WireChunk>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len == 0 || len > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::InvalidLength(len).into());
    }

    let mut body = BytesMut::zeroed(len);
    reader.read_exact(&mut body).await?;
    let tag = body.get_u8();
    Ok(Some(WireChunk::from_parts(tag, body.freeze())?))
}

/// Write one envelope to an async byte stream
pub async fn write_chunk<W>(writer: &mut W, chunk: &WireChunk) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(chunk.encoded_len());
    chunk.encode(&mut buf);
    writer.write_all(&buf).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_marker_layout() {
        let mut buf = BytesMut::new();
        WireChunk::Marker {
            sequence: 2,
            pts: 6000,
        }
        .encode(&mut buf);

        assert_eq!(
            &buf[..],
            &[
                0x00, 0x00, 0x00, 0x11, // length = 17
                0x01, // tag
                0, 0, 0, 0, 0, 0, 0, 2, // sequence
                0, 0, 0, 0, 0, 0, 0x17, 0x70, // pts
            ]
        );
    }

    #[test]
    fn test_terminator_layout() {
        let mut buf = BytesMut::new();
        WireChunk::Terminator.encode(&mut buf);
        assert_eq!(&buf[..], &[0x00, 0x00, 0x00, 0x01, 0x03]);
        assert_eq!(WireChunk::Terminator.encoded_len(), 5);
    }

    #[test]
    fn test_decode_sequence_and_partial() {
        let mut buf = BytesMut::new();
        WireChunk::Data(Bytes::from_static(&[0, 0, 0, 1, 0x65])).encode(&mut buf);
        WireChunk::Terminator.encode(&mut buf);

        // hold back the last byte
        let last = buf.split_off(buf.len() - 1);
        assert_eq!(
            WireChunk::decode(&mut buf).unwrap(),
            Some(WireChunk::Data(Bytes::from_static(&[0, 0, 0, 1, 0x65])))
        );
        assert_eq!(WireChunk::decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 4);

        buf.unsplit(last);
        assert_eq!(WireChunk::decode(&mut buf).unwrap(), Some(WireChunk::Terminator));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_data_may_look_like_anything() {
        // payload bytes that spell a marker envelope stay data
        let mut marker = BytesMut::new();
        WireChunk::Marker { sequence: 0, pts: 0 }.encode(&mut marker);
        let chunk = WireChunk::from_parts(0x02, marker.freeze()).unwrap();
        assert_eq!(chunk.tag(), ChunkTag::Data);
    }

    #[test]
    fn test_malformed_envelopes() {
        assert_eq!(
            WireChunk::from_parts(0x7f, Bytes::new()),
            Err(ProtocolError::UnknownTag(0x7f))
        );
        assert_eq!(
            WireChunk::from_parts(0x01, Bytes::from_static(&[1, 2, 3])),
            Err(ProtocolError::MalformedMarker(3))
        );
        assert_eq!(
            WireChunk::from_parts(0x03, Bytes::from_static(&[1])),
            Err(ProtocolError::MalformedTerminator(1))
        );

        let mut zero = BytesMut::from(&[0u8, 0, 0, 0, 0x02][..]);
        assert_eq!(WireChunk::decode(&mut zero), Err(ProtocolError::InvalidLength(0)));
    }

    #[tokio::test]
    async fn test_read_chunk_from_stream() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&[0x00, 0x00, 0x00, 0x04, 0x02])
            .read(&[0xAA, 0xBB, 0xCC])
            .read(&[0x00, 0x00, 0x00, 0x01, 0x03])
            .build();

        let first = read_chunk(&mut reader).await.unwrap();
        assert_eq!(first, Some(WireChunk::Data(Bytes::from_static(&[0xAA, 0xBB, 0xCC]))));
        let second = read_chunk(&mut reader).await.unwrap();
        assert_eq!(second, Some(WireChunk::Terminator));
        assert_eq!(read_chunk(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_chunk_rejects_oversized_length() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&[0x7F, 0xFF, 0xFF, 0xFF])
            .build();
        let err = read_chunk(&mut reader).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::InvalidLength(0x7FFF_FFFF))
        ));
    }

    #[tokio::test]
    async fn test_write_chunk() {
        let mut writer = tokio_test::io::Builder::new()
            .write(&[0x00, 0x00, 0x00, 0x01, 0x03])
            .build();
        write_chunk(&mut writer, &WireChunk::Terminator).await.unwrap();
    }
}
