//! Bounded handoff queue
//!
//! Fixed capacity, multi-producer multi-consumer. A push into a full queue
//! drops the pushed item (drop-newest) and counts it; pushes never block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Drop-newest bounded queue; clones share the same storage
#[derive(Debug)]
pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least 1)
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue without blocking. Returns `false` if the item was dropped.
    pub fn push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Dequeue if an item is ready
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for an item
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        // bounded channels always report a capacity
        self.tx.capacity().unwrap_or(1)
    }

    /// Items dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_newest() {
        let queue = BoundedQueue::new(2);
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(!queue.push(3));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let queue = BoundedQueue::<u8>::new(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn test_cross_thread_handoff() {
        let queue = BoundedQueue::new(4);
        let producer = queue.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..3 {
                assert!(producer.push(i));
            }
        });

        let mut got = Vec::new();
        while got.len() < 3 {
            if let Some(v) = queue.pop_timeout(Duration::from_secs(1)) {
                got.push(v);
            }
        }
        handle.join().unwrap();
        assert_eq!(got, vec![0, 1, 2]);
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)), None);
    }
}
