//! Thumbnail generation
//!
//! On-demand image thumbnails with a small result cache.

pub mod cache;
pub mod engine;

pub use engine::{DEFAULT_HEIGHT, DEFAULT_WIDTH, ThumbnailEngine, ThumbnailSettings};
