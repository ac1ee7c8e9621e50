//! Session descriptor
//!
//! SDP text describing the stream for out-of-band receivers:
//!
//! ```text
//! v=0
//! o=- 0 0 IN IP4 127.0.0.1
//! s=avlink
//! c=IN IP4 127.0.0.1
//! t=0 0
//! m=video 15001 RTP/AVP 96
//! a=rtpmap:96 H264/90000
//! a=fmtp:96 packetization-mode=1
//! a=framerate:30
//! a=framesize:96 640-480
//! ```

use std::fmt;
use std::net::SocketAddr;

use crate::config::CodecConfig;
use crate::media::frame::Geometry;

/// Dynamic RTP payload type used for H.264
pub const PAYLOAD_TYPE: u8 = 96;

/// H.264 RTP clock rate
pub const CLOCK_RATE: u32 = 90_000;

/// Stream description produced once the geometry is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub addr: SocketAddr,
    pub geometry: Geometry,
    pub fps: u32,
    pub session_name: String,
}

impl SessionDescriptor {
    pub fn from_parts(addr: SocketAddr, codec: &CodecConfig, geometry: Geometry) -> Self {
        Self {
            addr,
            geometry,
            fps: codec.fps,
            session_name: "avlink".to_string(),
        }
    }

    /// Replace the `s=` line
    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }

    /// SDP text with CRLF line endings
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// SDP on one line, CRLF replaced by `;`
    pub fn single_line(&self) -> String {
        self.render().replace("\r\n", ";")
    }
}

impl fmt::Display for SessionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = if self.addr.is_ipv4() { "IP4" } else { "IP6" };
        let ip = self.addr.ip();

        write!(f, "v=0\r\n")?;
        write!(f, "o=- 0 0 IN {} {}\r\n", family, ip)?;
        write!(f, "s={}\r\n", self.session_name)?;
        write!(f, "c=IN {} {}\r\n", family, ip)?;
        write!(f, "t=0 0\r\n")?;
        write!(f, "m=video {} RTP/AVP {}\r\n", self.addr.port(), PAYLOAD_TYPE)?;
        write!(f, "a=rtpmap:{} H264/{}\r\n", PAYLOAD_TYPE, CLOCK_RATE)?;
        write!(f, "a=fmtp:{} packetization-mode=1\r\n", PAYLOAD_TYPE)?;
        write!(f, "a=framerate:{}\r\n", self.fps)?;
        write!(
            f,
            "a=framesize:{} {}-{}\r\n",
            PAYLOAD_TYPE, self.geometry.width, self.geometry.height
        )
    }
}
