//! Core library for the cirun CI-script runner
//!
//! This crate contains the environment gate, phase routing, container launch
//! and supervision, configuration resolution, logging, and error handling.

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod gate;
pub mod handler;
pub mod launch;
pub mod logging;
pub mod phase;
pub mod router;
pub mod runtime;
pub mod supervise;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
