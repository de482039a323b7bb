//! Request controller
//!
//! Glue between parsed requests and the per-profile file system facade.

pub mod dispatch;
pub mod responses;

pub use dispatch::dispatch;
pub use responses::Reply;
