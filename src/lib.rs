//! # avlink
//!
//! Low-latency H.264 frame transport over a lossy, message-oriented
//! publish/subscribe channel.
//!
//! A [`Transmitter`] takes raw frames from the caller, converts them to
//! I420, encodes them with openh264 and sends each access unit as a
//! `[marker, data.., terminator]` chunk sequence. A [`Receiver`] runs one
//! thread that reassembles access units from whatever chunks arrive,
//! decodes them and hands converted frames to the consumer through a small
//! drop-newest queue.
//!
//! The transport may lose messages at any point. A lost terminator costs
//! nothing (the next marker closes the unit), a lost data chunk costs one
//! picture (reported as a decode error), and nothing ever blocks on a slow
//! peer.
//!
//! ## Example
//!
//! ```no_run
//! use avlink::{Frame, Geometry, PixelFormat, Receiver, ReceiverConfig, Transmitter, TransmitterConfig};
//!
//! let mut tx = Transmitter::bind(TransmitterConfig::default())?;
//! let rx = Receiver::connect(ReceiverConfig::default())?;
//!
//! let frame = Frame::pattern(Geometry::new(640, 480), 0, PixelFormat::Bgr24);
//! tx.encode_frame(&frame)?;
//!
//! if let Some(frame) = rx.get() {
//!     println!("{} frame at pts {:?}", frame.geometry(), frame.pts());
//! }
//! # Ok::<(), avlink::Error>(())
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod media;
pub mod protocol;
pub mod stats;
pub mod stream;
pub mod transport;

pub use config::{CodecConfig, ReceiverConfig, TransmitterConfig, DEFAULT_PORT};
pub use error::{Error, ErrorKind, Result};
pub use media::{Frame, Geometry, PixelFormat};
pub use stats::{ReceiveSnapshot, ReceiveStats, TransmitSnapshot, TransmitStats};
pub use stream::{BoundedQueue, EncodeWorker, Receiver, SessionDescriptor, Transmitter};
pub use transport::{ChunkSink, ChunkSource, SendOutcome};
