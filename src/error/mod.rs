//! Error handling
//!
//! Defines error types and the conversion of faults into operation results.

pub mod handlers;
pub mod types;

pub use types::*;
