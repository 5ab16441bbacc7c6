//! Object storage seam.

use async_trait::async_trait;

use crate::error::StorageResult;

/// A durable key/value blob store.
///
/// An `Ok` return means the object is durably stored under `key`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` with the given content type, replacing
    /// any existing object.
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> StorageResult<()>;
}
