//! In-memory artifact repository

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::PlatformError;

use super::ArtifactRepository;

/// In-memory artifact repository.
///
/// Counts `exists` calls so callers can verify when the repository was
/// consulted.
#[derive(Debug, Default)]
pub struct MemoryArtifacts {
    objects: RwLock<BTreeMap<String, Bytes>>,
    exists_calls: AtomicU64,
}

impl MemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, body: impl Into<Bytes>) -> Result<(), PlatformError> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| PlatformError::Internal("lock poisoned".to_string()))?;
        objects.insert(key.to_string(), body.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `exists` calls served so far
    pub fn exists_calls(&self) -> u64 {
        self.exists_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactRepository for MemoryArtifacts {
    async fn exists(&self, key: &str) -> Result<bool, PlatformError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        let objects = self
            .objects
            .read()
            .map_err(|_| PlatformError::Internal("lock poisoned".to_string()))?;
        Ok(objects.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, PlatformError> {
        let objects = self
            .objects
            .read()
            .map_err(|_| PlatformError::Internal("lock poisoned".to_string()))?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), PlatformError> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| PlatformError::Internal("lock poisoned".to_string()))?;
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}
