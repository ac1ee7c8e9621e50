//! Message transports
//!
//! The pipeline only needs an ordered, at-most-once message channel with a
//! bounded queue. When a queue is full the newest message is dropped and the
//! sender is told so; nothing ever blocks on a slow peer.
//!
//! - [`memory`]: in-process channel, one sink to one source
//! - [`tcp`]: publisher that fans out to every connected subscriber

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;
use crate::protocol::chunk::WireChunk;

pub mod memory;
pub mod tcp;

pub use memory::{MemorySink, MemorySource};
pub use tcp::{TcpPublisher, TcpSubscriber};

/// Result of handing one chunk to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for at least one peer
    Delivered,
    /// Every peer queue was at its high-water-mark
    Dropped,
    /// Nobody is listening
    NoPeers,
}

/// Sending half of a transport
pub trait ChunkSink: Send {
    /// Queue a chunk without blocking
    fn send(&mut self, chunk: WireChunk) -> Result<SendOutcome>;

    /// Number of peers currently attached
    fn peer_count(&self) -> usize;

    /// Address receivers connect to, if the transport has one
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Receiving half of a transport
pub trait ChunkSource: Send {
    /// Wait up to `timeout` for the next chunk.
    ///
    /// `Ok(None)` means the timeout elapsed. An error means the transport is
    /// gone for good.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WireChunk>>;
}

impl<T: ChunkSink + ?Sized> ChunkSink for Box<T> {
    fn send(&mut self, chunk: WireChunk) -> Result<SendOutcome> {
        (**self).send(chunk)
    }

    fn peer_count(&self) -> usize {
        (**self).peer_count()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        (**self).local_addr()
    }
}

impl<T: ChunkSource + ?Sized> ChunkSource for Box<T> {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WireChunk>> {
        (**self).recv_timeout(timeout)
    }
}
