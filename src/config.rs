//! Transmitter, receiver and codec configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::media::frame::PixelFormat;
use crate::protocol::chunk::MAX_DATA_PAYLOAD;

/// Default TCP port of the chunk transport
pub const DEFAULT_PORT: u16 = 15001;

/// Encoder parameters, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq)]
pub struct CodecConfig {
    /// Target frame rate; the codec time base is `1/fps`
    pub fps: u32,

    /// Target bitrate in bits per second
    pub bitrate_bps: u32,

    /// Pictures between forced IDR frames
    pub gop_size: u32,

    /// Append an access unit delimiter after every encoded picture
    pub access_unit_delimiter: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            bitrate_bps: 8_000_000,
            gop_size: 12,
            access_unit_delimiter: true,
        }
    }
}

impl CodecConfig {
    /// Set the frame rate (at least 1)
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    /// Set the target bitrate
    pub fn bitrate(mut self, bps: u32) -> Self {
        self.bitrate_bps = bps;
        self
    }

    /// Set the GOP size (at least 1)
    pub fn gop_size(mut self, frames: u32) -> Self {
        self.gop_size = frames.max(1);
        self
    }

    /// Enable or disable the trailing access unit delimiter
    pub fn access_unit_delimiter(mut self, enabled: bool) -> Self {
        self.access_unit_delimiter = enabled;
        self
    }
}

/// Transmitter configuration
#[derive(Debug, Clone)]
pub struct TransmitterConfig {
    /// Address the publisher binds to
    pub bind_addr: SocketAddr,

    /// Encoder parameters
    pub codec: CodecConfig,

    /// Messages queued per subscriber before new ones are dropped
    pub high_water_mark: usize,

    /// Largest data chunk payload; larger access units are split
    pub max_chunk_size: usize,

    /// Maximum concurrent subscribers (0 = unlimited)
    pub max_subscribers: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            codec: CodecConfig::default(),
            high_water_mark: 8,
            max_chunk_size: 64 * 1024,
            max_subscribers: 0,
            tcp_nodelay: true,
        }
    }
}

impl TransmitterConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set encoder parameters
    pub fn codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    /// Set the per-subscriber high-water-mark (at least 1)
    pub fn high_water_mark(mut self, messages: usize) -> Self {
        self.high_water_mark = messages.max(1);
        self
    }

    /// Set the largest data chunk payload, bounded by what one envelope holds
    pub fn max_chunk_size(mut self, bytes: usize) -> Self {
        self.max_chunk_size = bytes.clamp(1, MAX_DATA_PAYLOAD);
        self
    }

    /// Set maximum subscribers
    pub fn max_subscribers(mut self, max: usize) -> Self {
        self.max_subscribers = max;
        self
    }
}

/// Receiver configuration
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Publisher address to subscribe to
    pub connect_addr: SocketAddr,

    /// Inbound messages buffered before new ones are dropped
    pub high_water_mark: usize,

    /// Pixel layout of delivered frames
    pub output_format: PixelFormat,

    /// Decoded frames held for `get()` before new ones are dropped
    pub queue_capacity: usize,

    /// Longest blocking receive before the stop flag is checked again
    pub poll_interval: Duration,

    /// Delay between connection attempts
    pub reconnect_interval: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            connect_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            high_water_mark: 8,
            output_format: PixelFormat::Bgr24,
            queue_capacity: 4,
            poll_interval: Duration::from_millis(100),
            reconnect_interval: Duration::from_millis(500),
            tcp_nodelay: true,
        }
    }
}

impl ReceiverConfig {
    /// Create a new config with custom publisher address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            connect_addr: addr,
            ..Default::default()
        }
    }

    /// Set the publisher address
    pub fn connect(mut self, addr: SocketAddr) -> Self {
        self.connect_addr = addr;
        self
    }

    /// Set the inbound high-water-mark (at least 1)
    pub fn high_water_mark(mut self, messages: usize) -> Self {
        self.high_water_mark = messages.max(1);
        self
    }

    /// Set the delivered pixel layout
    pub fn output_format(mut self, format: PixelFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Set the delivery queue capacity (at least 1)
    pub fn queue_capacity(mut self, frames: usize) -> Self {
        self.queue_capacity = frames.max(1);
        self
    }

    /// Set the receive poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the reconnect delay
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_codec_config() {
        let config = CodecConfig::default();

        assert_eq!(config.fps, 30);
        assert_eq!(config.bitrate_bps, 8_000_000);
        assert_eq!(config.gop_size, 12);
        assert!(config.access_unit_delimiter);
    }

    #[test]
    fn test_codec_builder_clamps() {
        let config = CodecConfig::default().fps(0).gop_size(0).bitrate(1_000_000);

        assert_eq!(config.fps, 1);
        assert_eq!(config.gop_size, 1);
        assert_eq!(config.bitrate_bps, 1_000_000);
        assert!(!config.access_unit_delimiter(false).access_unit_delimiter);
    }

    #[test]
    fn test_default_transmitter_config() {
        let config = TransmitterConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.high_water_mark, 8);
        assert_eq!(config.max_chunk_size, 64 * 1024);
        assert_eq!(config.max_subscribers, 0);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_max_chunk_size_fits_envelope() {
        assert_eq!(TransmitterConfig::default().max_chunk_size(0).max_chunk_size, 1);
        assert_eq!(
            TransmitterConfig::default().max_chunk_size(usize::MAX).max_chunk_size,
            MAX_DATA_PAYLOAD
        );
        assert_eq!(TransmitterConfig::default().max_chunk_size(1500).max_chunk_size, 1500);
    }

    #[test]
    fn test_transmitter_with_addr() {
        let addr: SocketAddr = "127.0.0.1:16000".parse().unwrap();
        let config = TransmitterConfig::with_addr(addr)
            .high_water_mark(0)
            .max_chunk_size(1200)
            .max_subscribers(2)
            .codec(CodecConfig::default().fps(10));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.high_water_mark, 1);
        assert_eq!(config.max_chunk_size, 1200);
        assert_eq!(config.max_subscribers, 2);
        assert_eq!(config.codec.fps, 10);
    }

    #[test]
    fn test_default_receiver_config() {
        let config = ReceiverConfig::default();

        assert_eq!(config.connect_addr.port(), DEFAULT_PORT);
        assert!(config.connect_addr.ip().is_loopback());
        assert_eq!(config.output_format, PixelFormat::Bgr24);
        assert_eq!(config.queue_capacity, 4);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.reconnect_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_receiver_builder() {
        let addr: SocketAddr = "10.0.0.2:15002".parse().unwrap();
        let config = ReceiverConfig::with_addr(addr)
            .output_format(PixelFormat::Rgb24)
            .queue_capacity(0)
            .poll_interval(Duration::from_millis(5));

        assert_eq!(config.connect_addr, addr);
        assert_eq!(config.output_format, PixelFormat::Rgb24);
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
    }
}
