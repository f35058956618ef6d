/*!
 * Upload and download stages.
 *
 * Both stages fan out one future per blob, bounded by a semaphore so that at
 * most `limit` transfers are in flight at any moment. A permit is held until
 * its transfer completes. Per-item failures are logged and collected in the
 * `TransferReport`; they never abort sibling transfers.
 */

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::containers::ContainerHandle;
use crate::errors::{StorageError, StorageResult};
use crate::file_utils::{FileManager, FileRecord};
use crate::storage::BlobStorage;

/// One item that could not be transferred
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of a transfer stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Names transferred, in input order
    pub succeeded: Vec<String>,
    pub failed: Vec<TransferFailure>,
}

impl TransferReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether there was work and none of it succeeded
    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `op` over every item with at most `limit` operations in flight.
///
/// Waits for all operations before returning.
pub async fn run_bounded<T, F, Fut>(stage: &str, items: Vec<(String, T)>, limit: usize, op: F) -> TransferReport
where
    F: Fn(String, T) -> Fut,
    Fut: Future<Output = StorageResult<()>>,
{
    let limit = limit.max(1);
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(limit));
    debug!("{}: starting {} transfers, at most {} at once", stage, total, limit);

    let mut results = stream::iter(items.into_iter().enumerate())
        .map(|(index, (name, item))| {
            let semaphore = semaphore.clone();
            let transfer = op(name.clone(), item);
            async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => transfer.await,
                    Err(e) => Err(StorageError::RequestFailed(format!("transfer limiter closed: {}", e))),
                };
                (index, name, result)
            }
        })
        .buffer_unordered(limit)
        .collect::<Vec<_>>()
        .await;
    results.sort_by_key(|(index, _, _)| *index);

    let mut report = TransferReport::default();
    for (_, name, result) in results {
        match result {
            Ok(()) => report.succeeded.push(name),
            Err(e) => {
                warn!("{}: {} failed: {}", stage, name, e);
                report.failed.push(TransferFailure {
                    name,
                    error: e.to_string(),
                });
            }
        }
    }
    info!(
        "{}: {}/{} transferred, {} failed",
        stage,
        report.succeeded.len(),
        total,
        report.failed.len()
    );
    report
}

/// Upload local files into a container under their object names
pub async fn upload_files(
    storage: &dyn BlobStorage,
    container: &ContainerHandle,
    files: &[FileRecord],
    limit: usize,
) -> TransferReport {
    let items = files
        .iter()
        .map(|record| (record.object_name.clone(), record.path.clone()))
        .collect();

    run_bounded("Upload", items, limit, |name, path: PathBuf| async move {
        let data = FileManager::read_bytes(&path).await?;
        storage.upload_blob(container.name(), &name, Bytes::from(data)).await?;
        debug!("Uploaded {:?} as {}/{}", path, container.name(), name);
        Ok(())
    })
    .await
}

/// Download every blob currently in the container into `output_dir`.
///
/// Blobs are written under the last segment of their name. A blob whose name
/// is not a usable file name, or flattens to a name already taken by an
/// earlier blob, is reported as failed and not downloaded. Failing to list
/// the container is fatal; individual downloads are not.
pub async fn download_all(
    storage: &dyn BlobStorage,
    container: &ContainerHandle,
    output_dir: &Path,
    limit: usize,
) -> StorageResult<TransferReport> {
    let names = storage.list_blobs(container.name()).await?;
    info!("Found {} translated documents in {}", names.len(), container.name());
    tokio::fs::create_dir_all(output_dir).await?;

    let (items, rejected) = plan_downloads(names);
    let mut report = run_bounded("Download", items, limit, |name, file_name: String| async move {
        let data = storage.download_blob(container.name(), &name).await?;
        let destination = output_dir.join(file_name);
        tokio::fs::write(&destination, &data).await?;
        debug!("Downloaded {} to {:?}", name, destination);
        Ok(())
    })
    .await;

    for failure in &rejected {
        warn!("Download: skipping {}: {}", failure.name, failure.error);
    }
    report.failed.extend(rejected);
    Ok(report)
}

/// Pair each blob with its local file name, rejecting unusable and duplicate names
fn plan_downloads(names: Vec<String>) -> (Vec<(String, String)>, Vec<TransferFailure>) {
    let mut taken: HashMap<String, String> = HashMap::new();
    let mut items = Vec::with_capacity(names.len());
    let mut rejected = Vec::new();

    for name in names {
        let Some(file_name) = local_file_name(&name).map(str::to_string) else {
            rejected.push(TransferFailure {
                error: "blob name cannot be used as a file name".to_string(),
                name,
            });
            continue;
        };
        if let Some(first) = taken.get(&file_name) {
            rejected.push(TransferFailure {
                error: format!("{} would overwrite {} from {}", name, file_name, first),
                name,
            });
            continue;
        }
        taken.insert(file_name.clone(), name.clone());
        items.push((name, file_name));
    }
    (items, rejected)
}

/// Last segment of a blob name, if it is a plain file name
fn local_file_name(blob_name: &str) -> Option<&str> {
    let last = blob_name.rsplit('/').next()?;
    match last {
        "" | "." | ".." => None,
        name if name.contains('\\') => None,
        name => Some(name),
    }
}
