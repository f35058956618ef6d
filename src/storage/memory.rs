/*!
 * In-memory storage backend for testing.
 *
 * Containers and blobs live in a map guarded by a mutex. Uploads and
 * downloads are counted while in flight, so tests can check that a transfer
 * stage never exceeds its concurrency limit.
 */

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::form_urlencoded;

use super::{BlobStorage, ContainerInfo, SasPermissions};
use crate::errors::{StorageError, StorageResult};

#[derive(Debug)]
struct MemoryContainer {
    last_modified: DateTime<Utc>,
    blobs: BTreeMap<String, Bytes>,
}

impl MemoryContainer {
    fn new(last_modified: DateTime<Utc>) -> Self {
        Self {
            last_modified,
            blobs: BTreeMap::new(),
        }
    }
}

/// Decrements the in-flight counter when a transfer ends, however it ends
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Storage backend that keeps everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    containers: Mutex<BTreeMap<String, MemoryContainer>>,
    /// Blob names whose transfers always fail
    failing: Mutex<HashSet<String>>,
    /// Container names whose deletion always fails
    undeletable: Mutex<HashSet<String>>,
    transfer_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    transfers: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every upload and download for `delay`, to make overlap observable
    pub fn with_transfer_delay(mut self, delay: Duration) -> Self {
        self.transfer_delay = Some(delay);
        self
    }

    /// Make every transfer of the named blob fail
    pub fn fail_blob(&self, name: impl Into<String>) {
        self.failing.lock().insert(name.into());
    }

    /// Make deletion of the named container fail
    pub fn fail_delete(&self, container: impl Into<String>) {
        self.undeletable.lock().insert(container.into());
    }

    /// Create a container with a given modification time
    pub fn insert_container_at(&self, name: impl Into<String>, last_modified: DateTime<Utc>) {
        self.containers
            .lock()
            .insert(name.into(), MemoryContainer::new(last_modified));
    }

    /// Write a blob directly, creating the container if needed
    pub fn put_blob(&self, container: &str, name: &str, data: impl Into<Bytes>) {
        self.containers
            .lock()
            .entry(container.to_string())
            .or_insert_with(|| MemoryContainer::new(Utc::now()))
            .blobs
            .insert(name.to_string(), data.into());
    }

    /// Content of a blob, if present
    pub fn blob(&self, container: &str, name: &str) -> Option<Bytes> {
        self.containers
            .lock()
            .get(container)
            .and_then(|c| c.blobs.get(name).cloned())
    }

    /// Sorted blob names of a container; empty if it does not exist
    pub fn blob_names(&self, container: &str) -> Vec<String> {
        self.containers
            .lock()
            .get(container)
            .map(|c| c.blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Sorted names of all existing containers
    pub fn container_names(&self) -> Vec<String> {
        self.containers.lock().keys().cloned().collect()
    }

    /// Highest number of transfers observed in flight at once
    pub fn peak_concurrent_transfers(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of uploads and downloads started
    pub fn transfer_count(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    async fn begin_transfer(&self) -> InFlight<'_> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        match self.transfer_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        guard
    }

    fn is_failing(&self, name: &str) -> bool {
        self.failing.lock().contains(name)
    }
}

#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn create_container(&self, container: &str) -> StorageResult<()> {
        self.containers
            .lock()
            .entry(container.to_string())
            .or_insert_with(|| MemoryContainer::new(Utc::now()));
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> StorageResult<()> {
        if self.undeletable.lock().contains(container) {
            return Err(StorageError::Container {
                container: container.to_string(),
                message: "deletion refused".to_string(),
            });
        }
        match self.containers.lock().remove(container) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(container.to_string())),
        }
    }

    async fn list_containers(&self, prefix: &str) -> StorageResult<Vec<ContainerInfo>> {
        Ok(self
            .containers
            .lock()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, c)| ContainerInfo {
                name: name.clone(),
                last_modified: c.last_modified,
            })
            .collect())
    }

    async fn upload_blob(&self, container: &str, name: &str, data: Bytes) -> StorageResult<()> {
        let _in_flight = self.begin_transfer().await;
        if self.is_failing(name) {
            return Err(StorageError::UploadFailed {
                name: name.to_string(),
                message: "injected failure".to_string(),
            });
        }
        let mut containers = self.containers.lock();
        let target = containers
            .get_mut(container)
            .ok_or_else(|| StorageError::NotFound(container.to_string()))?;
        target.blobs.insert(name.to_string(), data);
        target.last_modified = Utc::now();
        Ok(())
    }

    async fn download_blob(&self, container: &str, name: &str) -> StorageResult<Bytes> {
        let _in_flight = self.begin_transfer().await;
        if self.is_failing(name) {
            return Err(StorageError::DownloadFailed {
                name: name.to_string(),
                message: "injected failure".to_string(),
            });
        }
        self.blob(container, name)
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", container, name)))
    }

    async fn list_blobs(&self, container: &str) -> StorageResult<Vec<String>> {
        self.containers
            .lock()
            .get(container)
            .map(|c| c.blobs.keys().cloned().collect())
            .ok_or_else(|| StorageError::NotFound(container.to_string()))
    }

    fn container_sas_url(
        &self,
        container: &str,
        permissions: SasPermissions,
        ttl: Duration,
    ) -> StorageResult<String> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| StorageError::Signing(e.to_string()))?;
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("sp", &permissions.as_str())
            .append_pair("se", &(Utc::now() + ttl).format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .finish();
        Ok(format!("memory://{}?{}", container, query))
    }
}
