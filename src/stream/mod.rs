//! Transmitter and receiver orchestration
//!
//! - [`transmitter`]: caller-driven encode path
//! - [`receiver`]: threaded decode path with a delivery queue
//! - [`monitor`]: encode thread for producers that must never block
//! - [`queue`]: the drop-newest queue used between threads
//! - [`sdp`]: session descriptor for out-of-band receivers

pub mod monitor;
pub mod queue;
pub mod receiver;
pub mod sdp;
pub mod transmitter;

pub use monitor::EncodeWorker;
pub use queue::BoundedQueue;
pub use receiver::{ReceivePipeline, Receiver};
pub use sdp::SessionDescriptor;
pub use transmitter::Transmitter;
