//! Media handling
//!
//! This module provides:
//! - Raw frame buffers and pixel layouts
//! - RGB/BGR to I420 conversion and back
//! - H.264 Annex-B NAL parsing and access unit assembly

pub mod convert;
pub mod frame;
pub mod h264;

pub use convert::{ColorConverter, YuvPlanes};
pub use frame::{Frame, Geometry, PixelFormat};
pub use h264::{AccessUnitParser, NalUnit, NaluType, ACCESS_UNIT_DELIMITER};
