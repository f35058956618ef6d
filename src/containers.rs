/*!
 * Container lifecycle.
 *
 * Every run gets its own containers, named from the run id with a fixed
 * prefix and a role suffix. A `ContainerHandle` is only handed out once the
 * container is known to exist, and delegated URIs are issued from handles,
 * so a URI can never point at a container that was not created.
 */

use chrono::Utc;
use futures::future::{join_all, try_join_all};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::{StorageError, StorageResult};
use crate::storage::{BlobStorage, SasPermissions};

/// Prefix shared by every container this crate creates
pub const CONTAINER_PREFIX: &str = "doctr";

const SOURCE_SUFFIX: &str = "src";
const TARGET_SUFFIX: &str = "tgt";
const GLOSSARY_SUFFIX: &str = "gls";

/// Container names of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNames {
    pub source: String,
    pub target: String,
    pub glossary: String,
}

impl ContainerNames {
    pub fn for_run(run_id: Uuid) -> Self {
        let base = format!("{}{}", CONTAINER_PREFIX, run_id.hyphenated());
        Self {
            source: format!("{}{}", base, SOURCE_SUFFIX),
            target: format!("{}{}", base, TARGET_SUFFIX),
            glossary: format!("{}{}", base, GLOSSARY_SUFFIX),
        }
    }

    /// Names the run may have created
    pub fn all(&self, with_glossary: bool) -> Vec<String> {
        let mut names = vec![self.source.clone(), self.target.clone()];
        if with_glossary {
            names.push(self.glossary.clone());
        }
        names
    }
}

/// Whether a container name follows the run naming convention
pub fn is_run_container(name: &str) -> bool {
    name.starts_with(CONTAINER_PREFIX)
        && [SOURCE_SUFFIX, TARGET_SUFFIX, GLOSSARY_SUFFIX]
            .iter()
            .any(|suffix| name.ends_with(suffix))
        && name.len() > CONTAINER_PREFIX.len() + SOURCE_SUFFIX.len()
}

/// A container confirmed to exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    name: String,
}

impl ContainerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Containers provisioned for one run
#[derive(Debug, Clone)]
pub struct ContainerPair {
    pub source: ContainerHandle,
    pub target: ContainerHandle,
    pub glossary: Option<ContainerHandle>,
}

/// Result of a stale-container sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Creates, signs and deletes run containers
#[derive(Debug, Clone)]
pub struct ContainerManager {
    storage: Arc<dyn BlobStorage>,
    sas_ttl: Duration,
}

impl ContainerManager {
    pub fn new(storage: Arc<dyn BlobStorage>, sas_ttl: Duration) -> Self {
        Self { storage, sas_ttl }
    }

    pub fn storage(&self) -> &Arc<dyn BlobStorage> {
        &self.storage
    }

    /// Create a container (idempotently) and return its handle
    pub async fn create(&self, name: &str) -> StorageResult<ContainerHandle> {
        self.storage.create_container(name).await?;
        debug!("Container ready: {}", name);
        Ok(ContainerHandle { name: name.to_string() })
    }

    /// Create the run's containers concurrently
    pub async fn provision(&self, names: &ContainerNames, with_glossary: bool) -> StorageResult<ContainerPair> {
        let mut handles = try_join_all(names.all(with_glossary).iter().map(|name| self.create(name))).await?;
        let glossary = if with_glossary { handles.pop() } else { None };
        let target = handles.pop();
        let source = handles.pop();
        match (source, target) {
            (Some(source), Some(target)) => {
                info!("Provisioned containers {} and {}", source.name, target.name);
                Ok(ContainerPair { source, target, glossary })
            }
            _ => Err(StorageError::Container {
                container: names.source.clone(),
                message: "container creation returned no handle".to_string(),
            }),
        }
    }

    /// Time-scoped URI granting full access to a created container
    pub fn delegated_uri(&self, container: &ContainerHandle) -> StorageResult<String> {
        self.storage
            .container_sas_url(&container.name, SasPermissions::all(), self.sas_ttl)
    }

    /// Read-only URI of one blob in a created container
    pub fn blob_uri(&self, container: &ContainerHandle, blob_name: &str) -> StorageResult<String> {
        self.storage
            .blob_sas_url(&container.name, blob_name, SasPermissions::read_list(), self.sas_ttl)
    }

    /// Delete containers concurrently; a missing container counts as deleted.
    ///
    /// Returns the failures, which are also logged.
    pub async fn teardown(&self, names: &[String]) -> Vec<(String, StorageError)> {
        let results = join_all(names.iter().map(|name| async move {
            (name.clone(), self.storage.delete_container(name).await)
        }))
        .await;

        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(()) => debug!("Deleted container {}", name),
                Err(StorageError::NotFound(_)) => debug!("Container {} already gone", name),
                Err(e) => {
                    warn!("Failed to delete container {}: {}", name, e);
                    failures.push((name, e));
                }
            }
        }
        failures
    }

    /// Delete run containers last modified more than `max_age` ago
    pub async fn sweep_stale(&self, max_age: chrono::Duration) -> StorageResult<SweepReport> {
        let cutoff = Utc::now() - max_age;
        let stale: Vec<String> = self
            .storage
            .list_containers(CONTAINER_PREFIX)
            .await?
            .into_iter()
            .filter(|c| is_run_container(&c.name) && c.last_modified < cutoff)
            .map(|c| c.name)
            .collect();
        info!("Sweeping {} stale containers older than {}", stale.len(), cutoff);

        let failures = self.teardown(&stale).await;
        let failed_names: Vec<&String> = failures.iter().map(|(name, _)| name).collect();
        let deleted = stale
            .iter()
            .filter(|name| !failed_names.contains(name))
            .cloned()
            .collect();
        Ok(SweepReport {
            deleted,
            failed: failures
                .into_iter()
                .map(|(name, e)| (name, e.to_string()))
                .collect(),
        })
    }
}
