//! In-process transport

use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::error::{Result, TransportError};
use crate::protocol::chunk::WireChunk;
use crate::transport::{ChunkSink, ChunkSource, SendOutcome};

/// Create a connected sink/source pair holding at most `high_water_mark`
/// undelivered chunks
pub fn channel(high_water_mark: usize) -> (MemorySink, MemorySource) {
    let (tx, rx) = crossbeam_channel::bounded(high_water_mark.max(1));
    let alive = Arc::new(());
    let peer = Arc::downgrade(&alive);
    (MemorySink { tx, peer }, MemorySource { rx, _alive: alive })
}

/// Sending half of an in-process channel
#[derive(Debug, Clone)]
pub struct MemorySink {
    tx: Sender<WireChunk>,
    peer: Weak<()>,
}

impl ChunkSink for MemorySink {
    fn send(&mut self, chunk: WireChunk) -> Result<SendOutcome> {
        match self.tx.try_send(chunk) {
            Ok(()) => Ok(SendOutcome::Delivered),
            Err(TrySendError::Full(_)) => Ok(SendOutcome::Dropped),
            Err(TrySendError::Disconnected(_)) => Ok(SendOutcome::NoPeers),
        }
    }

    fn peer_count(&self) -> usize {
        self.peer.strong_count()
    }
}

/// Receiving half of an in-process channel
#[derive(Debug)]
pub struct MemorySource {
    rx: Receiver<WireChunk>,
    _alive: Arc<()>,
}

impl MemorySource {
    /// Chunks waiting to be received
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl ChunkSource for MemorySource {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WireChunk>> {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_drop_newest_at_high_water_mark() {
        let (mut sink, mut source) = channel(2);

        assert_eq!(sink.send(WireChunk::Marker { sequence: 0, pts: 0 }).unwrap(), SendOutcome::Delivered);
        assert_eq!(sink.send(WireChunk::Terminator).unwrap(), SendOutcome::Delivered);
        assert_eq!(sink.send(WireChunk::Marker { sequence: 1, pts: 0 }).unwrap(), SendOutcome::Dropped);
        assert_eq!(source.pending(), 2);

        let first = source.recv_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(first, Some(WireChunk::Marker { sequence: 0, pts: 0 }));
        let second = source.recv_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(second, Some(WireChunk::Terminator));
        assert_eq!(source.recv_timeout(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn test_disconnect_both_ways() {
        let (mut sink, source) = channel(1);
        assert_eq!(sink.peer_count(), 1);
        drop(source);
        assert_eq!(sink.peer_count(), 0);
        assert_eq!(sink.send(WireChunk::Terminator).unwrap(), SendOutcome::NoPeers);

        let (sink, mut source) = channel(1);
        drop(sink);
        let err = source.recv_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Closed)));
    }
}
