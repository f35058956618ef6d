/*!
 * Object storage abstraction.
 *
 * All storage backends implement `BlobStorage`, so the container lifecycle
 * and transfer stages never depend on a specific service:
 * - `azure`: Azure Blob Storage over its REST API
 * - `memory`: in-process backend used by tests
 * - `sas`: shared-access signature generation
 */

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::time::Duration;

use crate::errors::{StorageError, StorageResult};

pub mod azure;
pub mod memory;
pub mod sas;

pub use azure::{AzureBlobStorage, StorageAccount};
pub use memory::MemoryStorage;

/// A container as reported by a listing
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

/// Permission set of a delegated-access URI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SasPermissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
}

impl SasPermissions {
    /// Every permission; what the translation service is handed
    pub fn all() -> Self {
        Self {
            read: true,
            add: true,
            create: true,
            write: true,
            delete: true,
            list: true,
        }
    }

    pub fn read_list() -> Self {
        Self {
            read: true,
            list: true,
            ..Self::none()
        }
    }

    fn none() -> Self {
        Self {
            read: false,
            add: false,
            create: false,
            write: false,
            delete: false,
            list: false,
        }
    }

    /// Permission string in the order the storage service requires
    pub fn as_str(&self) -> String {
        [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
            (self.list, 'l'),
        ]
        .iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, c)| *c)
        .collect()
    }
}

/// Storage abstraction trait
///
/// Container names are flat and globally unique within the account; blob
/// names are unique within a container.
#[async_trait]
pub trait BlobStorage: Send + Sync + Debug {
    /// Create a container; succeeds if it already exists
    async fn create_container(&self, container: &str) -> StorageResult<()>;

    /// Delete a container and its blobs; `NotFound` if it does not exist
    async fn delete_container(&self, container: &str) -> StorageResult<()>;

    /// Containers whose name starts with `prefix`
    async fn list_containers(&self, prefix: &str) -> StorageResult<Vec<ContainerInfo>>;

    /// Upload a blob, overwriting any existing one
    async fn upload_blob(&self, container: &str, name: &str, data: Bytes) -> StorageResult<()>;

    /// Download a blob's content
    async fn download_blob(&self, container: &str, name: &str) -> StorageResult<Bytes>;

    /// Names of all blobs currently in the container
    async fn list_blobs(&self, container: &str) -> StorageResult<Vec<String>>;

    /// Time-scoped, permission-scoped URI for the whole container
    fn container_sas_url(
        &self,
        container: &str,
        permissions: SasPermissions,
        ttl: Duration,
    ) -> StorageResult<String>;

    /// URI of one blob, authorised by the container's signature
    fn blob_sas_url(
        &self,
        container: &str,
        name: &str,
        permissions: SasPermissions,
        ttl: Duration,
    ) -> StorageResult<String> {
        let container_url = self.container_sas_url(container, permissions, ttl)?;
        let mut url = url::Url::parse(&container_url)
            .map_err(|e| StorageError::Signing(format!("invalid container url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Signing(format!("container url cannot hold a path: {}", container_url)))?
            .pop_if_empty()
            .push(name);
        Ok(url.to_string())
    }
}
