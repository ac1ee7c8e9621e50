//! Wire protocol
//!
//! - [`chunk`]: tagged envelope for one transport message
//! - [`framer`]: marker / data / terminator sequencing per encode cycle

pub mod chunk;
pub mod framer;

pub use chunk::{read_chunk, write_chunk, ChunkTag, WireChunk};
pub use framer::{FramerEvent, FramerPhase, ReceiveFramer, TransmitFramer};
