//! Shared foundational types for the Tessera logic simulator.
//!
//! This crate provides the bit-exact [`Value`] type with its width-inference
//! rules ([`Shape`]), and the [`SimTime`] timestamp used by the scheduler and
//! the configuration layer.

#![warn(missing_docs)]

pub mod shape;
pub mod time;
pub mod value;

pub use shape::{Shape, ShapeError, MAX_WIDTH};
pub use time::{ParseTimeError, SimTime, FS_PER_MS, FS_PER_NS, FS_PER_PS, FS_PER_S, FS_PER_US};
pub use value::{DecodeValueError, ParseValueError, Value};
