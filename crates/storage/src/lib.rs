//! Artifact publishing to Cloudflare R2.
//!
//! This crate provides:
//! - The [`ObjectStore`] seam and its R2 implementation
//! - Content-type resolution for published files
//! - The [`Publisher`] that assigns collision-free keys and public URLs

pub mod content_type;
pub mod error;
pub mod publisher;
pub mod r2;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use publisher::Publisher;
pub use r2::{R2Config, R2Store};
pub use store::ObjectStore;
