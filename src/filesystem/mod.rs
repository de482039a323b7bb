//! File system facade and per-profile registry

pub mod facade;
pub mod profiles;
pub mod results;

pub use facade::{FileSystem, FileSystemSettings};
pub use profiles::ProfileRegistry;
pub use results::OperationResult;
