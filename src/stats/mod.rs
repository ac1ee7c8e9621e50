//! Pipeline statistics

pub mod metrics;

pub use metrics::{ReceiveSnapshot, ReceiveStats, TransmitSnapshot, TransmitStats};
