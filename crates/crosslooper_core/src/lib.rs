//! crosslooper core: loop point search and stream alignment by FFT
//! cross-correlation.
//!
//! This crate holds all logic with no terminal dependencies. The
//! `crosslooper` binary is a thin layer over it.

pub mod analysis;
pub mod config;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod tags;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
