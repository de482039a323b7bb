//! Server core functionality
//!
//! TCP listener and per-connection request handling.

pub mod connection;
pub mod core;

pub use core::Server;
