//! Non-blocking frame submission
//!
//! [`EncodeWorker`] moves a [`Transmitter`] onto its own thread behind a
//! bounded queue, so producers hand frames over with `observe()` and never
//! wait on the encoder. A full queue drops the offered frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{InitError, Result};
use crate::media::frame::Frame;
use crate::stats::metrics::TransmitStats;
use crate::stream::queue::BoundedQueue;
use crate::stream::sdp::SessionDescriptor;
use crate::stream::transmitter::Transmitter;
use crate::transport::ChunkSink;

/// How long the encode thread waits for a frame before checking the stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct EncodeWorker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    queue: BoundedQueue<Frame>,
    stats: Arc<TransmitStats>,
    descriptor: Arc<OnceLock<SessionDescriptor>>,
}

impl EncodeWorker {
    /// Start the encode thread. At most `capacity` frames wait for it.
    pub fn spawn<S>(transmitter: Transmitter<S>, capacity: usize) -> Result<Self>
    where
        S: ChunkSink + 'static,
    {
        let queue = BoundedQueue::new(capacity);
        let stats = transmitter.stats();
        let stop = Arc::new(AtomicBool::new(false));
        let descriptor = Arc::new(OnceLock::new());

        let worker = Worker {
            transmitter,
            queue: queue.clone(),
            stop: Arc::clone(&stop),
            descriptor: Arc::clone(&descriptor),
        };
        let thread = std::thread::Builder::new()
            .name("avlink-encoder".into())
            .spawn(move || worker.run())
            .map_err(InitError::Runtime)?;

        Ok(Self {
            stop,
            thread: Some(thread),
            queue,
            stats,
            descriptor,
        })
    }

    /// Offer a frame for encoding. Returns `false` if it was dropped.
    pub fn observe(&self, frame: Frame) -> bool {
        let queued = self.queue.push(frame);
        if !queued {
            tracing::trace!(dropped = self.queue.dropped(), "Encode queue full");
        }
        queued
    }

    /// Session descriptor, once the first frame has been encoded
    pub fn session_descriptor(&self) -> Option<&SessionDescriptor> {
        self.descriptor.get()
    }

    /// Frames dropped because the encode queue was full
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn stats(&self) -> Arc<TransmitStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the encode thread and drop the transmitter. Idempotent.
    ///
    /// Frames still queued are discarded.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Encode thread panicked");
            }
        }
    }
}

impl Drop for EncodeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for EncodeWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeWorker")
            .field("running", &self.is_running())
            .field("queued", &self.queue.len())
            .field("dropped", &self.queue.dropped())
            .finish()
    }
}

struct Worker<S: ChunkSink> {
    transmitter: Transmitter<S>,
    queue: BoundedQueue<Frame>,
    stop: Arc<AtomicBool>,
    descriptor: Arc<OnceLock<SessionDescriptor>>,
}

impl<S: ChunkSink> Worker<S> {
    fn run(mut self) {
        tracing::debug!("Encode thread started");

        while !self.stop.load(Ordering::Acquire) {
            let Some(frame) = self.queue.pop_timeout(POLL_INTERVAL) else {
                continue;
            };

            // non-fatal failures are already logged by the transmitter
            if let Err(e) = self.transmitter.encode_frame(&frame) {
                if e.is_fatal() {
                    tracing::error!(error = %e, "Encode thread stopped");
                    break;
                }
            }

            if self.descriptor.get().is_none() {
                if let Some(sdp) = self.transmitter.session_descriptor() {
                    let sdp = self.descriptor.get_or_init(|| sdp);
                    tracing::info!(sdp = %sdp.single_line(), "Session descriptor");
                }
            }
        }

        tracing::debug!("Encode thread finished");
    }
}
