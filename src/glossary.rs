//! Glossary preparation: upload glossary files into the run's glossary
//! container and describe each one for the translation request.

use log::info;
use std::path::PathBuf;

use crate::containers::{ContainerHandle, ContainerManager};
use crate::errors::StorageResult;
use crate::file_utils::{FileManager, FileRecord, FilterOutcome};
use crate::service::ServiceCatalog;
use crate::service::models::ServiceGlossary;
use crate::transfer::{self, TransferReport};

/// Uploaded glossaries and their request descriptors
#[derive(Debug, Clone, Default)]
pub struct PreparedGlossaries {
    pub report: TransferReport,
    /// One descriptor per uploaded glossary
    pub glossaries: Vec<ServiceGlossary>,
}

/// Keep the files whose extension is a supported glossary format
pub fn select(files: &[PathBuf], catalog: &ServiceCatalog) -> FilterOutcome {
    FileManager::filter_by_extension(files, &catalog.glossary_extensions())
}

/// Upload glossary files and build their descriptors.
///
/// Files that fail to upload are reported but get no descriptor.
pub async fn prepare(
    containers: &ContainerManager,
    container: &ContainerHandle,
    files: &[FileRecord],
    catalog: &ServiceCatalog,
    limit: usize,
) -> StorageResult<PreparedGlossaries> {
    let report = transfer::upload_files(containers.storage().as_ref(), container, files, limit).await;

    let mut glossaries = Vec::with_capacity(report.succeeded.len());
    for record in files.iter().filter(|r| report.succeeded.contains(&r.object_name)) {
        let url = containers.blob_uri(container, &record.object_name)?;
        glossaries.push(ServiceGlossary::new(url, catalog.glossary_format_for(&record.path)));
    }
    info!("Prepared {} glossaries", glossaries.len());

    Ok(PreparedGlossaries { report, glossaries })
}
