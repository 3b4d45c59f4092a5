//! Data models shared across the crate.
//!
//! Operation modes and the units offsets are reported in.

mod enums;

pub use enums::{OffsetUnit, OperationMode};
