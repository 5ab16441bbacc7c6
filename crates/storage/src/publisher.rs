//! Publishing artifacts under collision-free keys.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::store::ObjectStore;

/// Uploads artifacts and derives their public URLs.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
}

impl Publisher {
    /// * `public_base_url` - URL prefix the bucket is served from; a
    ///   trailing `/` is ignored.
    pub fn new(store: Arc<dyn ObjectStore>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            store,
            public_base_url,
        }
    }

    /// Upload `bytes` and return `<public_base>/<uuid>_<filename>`.
    ///
    /// The random prefix keeps artifacts with equal filenames from
    /// overwriting each other across jobs.
    pub async fn publish(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> StorageResult<String> {
        let key = object_key(filename);
        self.store.put_object(&key, bytes, content_type).await?;

        let url = format!("{}/{}", self.public_base_url, key);
        info!(%url, content_type, "Uploaded artifact");
        Ok(url)
    }
}

/// Fresh storage key for `filename`.
pub fn object_key(filename: &str) -> String {
    format!("{}_{}", Uuid::new_v4(), filename)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;
    use crate::error::StorageError;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<Vec<(String, Vec<u8>, String)>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put_object(
            &self,
            key: &str,
            body: Vec<u8>,
            content_type: &str,
        ) -> StorageResult<()> {
            self.objects
                .lock()
                .unwrap()
                .push((key.to_string(), body, content_type.to_string()));
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ObjectStore for FailingStore {
        async fn put_object(&self, key: &str, _: Vec<u8>, _: &str) -> StorageResult<()> {
            Err(StorageError::upload_failed(format!("{key}: access denied")))
        }
    }

    #[tokio::test]
    async fn url_has_base_uuid_and_filename() {
        let store = Arc::new(MemoryStore::default());
        let publisher = Publisher::new(store.clone(), "https://cdn.example.com/");

        let url = publisher
            .publish(b"abc".to_vec(), "out_00001.mp4", "video/mp4")
            .await
            .unwrap();

        let key = url.strip_prefix("https://cdn.example.com/").unwrap();
        let (uuid, original) = key.split_once('_').unwrap();
        assert!(Uuid::parse_str(uuid).is_ok(), "{uuid}");
        assert_eq!(original, "out_00001.mp4");

        let objects = store.objects.lock().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].0, key);
        assert_eq!(objects[0].1, b"abc");
        assert_eq!(objects[0].2, "video/mp4");
    }

    #[tokio::test]
    async fn same_filename_never_collides() {
        let store = Arc::new(MemoryStore::default());
        let publisher = Publisher::new(store.clone(), "https://cdn.example.com");

        let a = publisher.publish(vec![1], "frame.png", "image/png").await.unwrap();
        let b = publisher.publish(vec![2], "frame.png", "image/png").await.unwrap();

        assert_ne!(a, b);
        assert!(a.ends_with("_frame.png") && b.ends_with("_frame.png"));
    }

    #[tokio::test]
    async fn upload_failure_propagates() {
        let publisher = Publisher::new(Arc::new(FailingStore), "https://cdn.example.com");
        let result = publisher.publish(vec![1], "frame.png", "image/png").await;
        assert_matches!(result, Err(StorageError::UploadFailed(msg)) if msg.contains("access denied"));
    }
}
