//! Media bitstream handling
//!
//! Annex-B access-unit reframing of the capture process's byte stream.

pub mod annexb;

pub use annexb::{AccessUnitReader, FrameSplit};
