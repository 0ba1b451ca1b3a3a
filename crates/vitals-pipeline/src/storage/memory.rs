//! In-memory blob store used by tests and local experimentation.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use vitals_common::{Result, VitalsError};

use super::BlobStore;

/// A `BlobStore` over a process-local map, with the same not-found contract
/// as [`super::S3Store`].
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        match self.objects.lock() {
            Ok(objects) => objects.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded content type for a key, if present.
    pub fn content_type(&self, key: &str) -> Option<String> {
        match self.objects.lock() {
            Ok(objects) => objects.get(key).map(|(_, ct)| ct.clone()),
            Err(poisoned) => poisoned.into_inner().get(key).map(|(_, ct)| ct.clone()),
        }
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let objects = self
            .objects
            .lock()
            .map_err(|e| VitalsError::Storage(e.to_string()))?;
        objects
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| VitalsError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|e| VitalsError::Storage(e.to_string()))?;
        objects.insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self
            .objects
            .lock()
            .map_err(|e| VitalsError::Storage(e.to_string()))?;
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("static/data/ca/metadata.json").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let store = MemoryStore::new();
        store
            .put("a/b.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();
        assert_eq!(store.get("a/b.json").await.unwrap(), b"{}");
        assert_eq!(store.content_type("a/b.json").as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let store = MemoryStore::new();
        store.put("x/1.pdf", vec![1], "application/pdf").await.unwrap();
        store.put("x/2.pdf", vec![2], "application/pdf").await.unwrap();
        store.put("y/3.pdf", vec![3], "application/pdf").await.unwrap();

        let keys = store.list("x/").await.unwrap();
        assert_eq!(keys, vec!["x/1.pdf".to_string(), "x/2.pdf".to_string()]);
    }
}
