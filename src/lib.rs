pub mod config;
pub mod controller;
pub mod error;
pub mod filesystem;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod thumbnail;
pub mod transfer;

pub use filesystem::{FileSystem, OperationResult, ProfileRegistry};
pub use server::Server;
