//! H.264 codec sessions
//!
//! One session owns one encoder or decoder instance. Sessions are
//! single-threaded and exclusively owned by their transmitter or receiver.

pub mod decoder;
pub mod encoder;
pub mod unit;

pub use decoder::DecoderSession;
pub use encoder::EncoderSession;
pub use unit::{rescale, AccessUnit, Rational, STREAM_TIME_BASE};
