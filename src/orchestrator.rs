/*!
 * Run orchestration.
 *
 * A run goes through: filter, provision, upload (alongside glossary
 * preparation), sign, submit, poll, download, cleanup. All per-run state
 * lives in a `RunContext` built at the start of `run`, so concurrent runs on
 * the same orchestrator share nothing mutable. The run's containers are torn
 * down whatever happens after provisioning starts.
 */

use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app_config::{Config, RunConfig};
use crate::containers::{ContainerManager, ContainerNames, SweepReport};
use crate::errors::{InputError, PollError, RunError, StorageError};
use crate::events::{EventSink, RunEvent};
use crate::file_utils::{FileManager, FileRecord};
use crate::glossary::{self, PreparedGlossaries};
use crate::poller::StatusPoller;
use crate::service::models::{BatchInput, JobPhase, JobStatus, TargetDescriptor};
use crate::service::{DocumentTranslationService, ServiceCatalog};
use crate::storage::{AzureBlobStorage, StorageAccount};
use crate::transfer::{self, TransferReport};

/// One batch run requested by the caller
#[derive(Debug, Clone)]
pub struct TranslationJob {
    /// Identifies the run; container names derive from it
    pub run_id: Uuid,
    pub target_language: String,
    /// Files to translate, or a single directory holding them
    pub inputs: Vec<PathBuf>,
    pub glossary_files: Vec<PathBuf>,
    /// Overrides the default `<source dir>.<language>`
    pub output_dir: Option<PathBuf>,
}

impl TranslationJob {
    pub fn new(target_language: impl Into<String>, inputs: Vec<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target_language: target_language.into(),
            inputs,
            glossary_files: Vec::new(),
            output_dir: None,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_glossaries(mut self, glossary_files: Vec<PathBuf>) -> Self {
        self.glossary_files = glossary_files;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }
}

/// Tuning of the run stages
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_concurrent_transfers: usize,
    pub poll_interval: Duration,
    pub max_poll_errors: u32,
    pub stale_container_age: chrono::Duration,
    pub progress_buffer: usize,
    pub output_dir: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for RunSettings {
    fn from(config: &RunConfig) -> Self {
        Self {
            max_concurrent_transfers: config.max_concurrent_transfers,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_errors: config.max_poll_errors,
            stale_container_age: chrono::Duration::days(i64::from(config.stale_container_age_days)),
            progress_buffer: config.progress_buffer,
            output_dir: config.output_dir.clone(),
        }
    }
}

/// What a completed run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub final_status: JobStatus,
    /// Inputs skipped by the extension filter
    pub discarded: Vec<PathBuf>,
    pub uploaded: TransferReport,
    pub glossaries: TransferReport,
    pub downloaded: TransferReport,
    pub output_dir: PathBuf,
    /// Containers that could not be deleted, with the reason
    pub cleanup_failures: Vec<(String, String)>,
}

/// Per-run state threaded through the stages
#[derive(Debug)]
struct RunContext {
    run_id: Uuid,
    target_language: String,
    documents: Vec<FileRecord>,
    glossaries: Vec<FileRecord>,
    discarded: Vec<PathBuf>,
    output_dir: PathBuf,
    names: ContainerNames,
}

impl RunContext {
    fn has_glossaries(&self) -> bool {
        !self.glossaries.is_empty()
    }
}

/// Sequences the stages of batch runs
#[derive(Debug, Clone)]
pub struct RunOrchestrator {
    service: DocumentTranslationService,
    containers: ContainerManager,
    catalog: ServiceCatalog,
    settings: RunSettings,
    category: Option<String>,
}

impl RunOrchestrator {
    pub fn new(
        service: DocumentTranslationService,
        containers: ContainerManager,
        catalog: ServiceCatalog,
        settings: RunSettings,
    ) -> Self {
        Self {
            service,
            containers,
            catalog,
            settings,
            category: None,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category.filter(|c| !c.trim().is_empty());
        self
    }

    /// Validate credentials, connect to Azure and fetch the service catalog
    pub async fn from_config(config: &Config) -> Result<Self, RunError> {
        config.validate()?;
        let service = DocumentTranslationService::from_config(config)?;
        let account = StorageAccount::from_connection_string(&config.credentials.storage_connection_string)?;
        let storage = AzureBlobStorage::new(account, Duration::from_secs(config.run.request_timeout_secs));
        let containers = ContainerManager::new(Arc::new(storage), Duration::from_secs(config.run.sas_ttl_secs));
        let catalog = service.initialize().await.map_err(RunError::Initialize)?;

        Ok(Self::new(service, containers, catalog, RunSettings::from(&config.run))
            .with_category(config.category.clone()))
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// Progress channel sized from the settings
    pub fn event_channel(&self) -> (EventSink, mpsc::Receiver<RunEvent>) {
        EventSink::channel(self.settings.progress_buffer)
    }

    /// Run one batch to completion.
    ///
    /// Progress goes to `events`, which the caller should drain while the run
    /// is in progress; `cancel` stops a running job even when the progress
    /// channel is full. Containers created for the run are deleted before
    /// this returns, on success and on failure alike.
    pub async fn run(
        &self,
        job: TranslationJob,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let context = self.prepare(job)?;
        info!(
            "Run {}: translating {} documents to {} ({} discarded, {} glossaries)",
            context.run_id,
            context.documents.len(),
            context.target_language,
            context.discarded.len(),
            context.glossaries.len()
        );

        let result = self.execute(&context, &events, &cancel).await;

        let failures = self
            .containers
            .teardown(&context.names.all(context.has_glossaries()))
            .await;
        let cleanup_failures = failures
            .into_iter()
            .map(|(name, e)| (name, e.to_string()))
            .collect();

        match result {
            Ok(mut summary) => {
                summary.cleanup_failures = cleanup_failures;
                events.emit(RunEvent::RunComplete, &cancel).await;
                info!("Run {} complete: {}", context.run_id, summary.final_status);
                Ok(summary)
            }
            Err(e) => {
                error!("Run {} stopped in {} phase: {}", context.run_id, e.phase(), e);
                Err(e)
            }
        }
    }

    /// Delete leftover run containers older than the configured age
    pub async fn sweep_stale_containers(&self) -> Result<SweepReport, StorageError> {
        self.containers.sweep_stale(self.settings.stale_container_age).await
    }

    /// Everything that can be checked before touching the network
    fn prepare(&self, job: TranslationJob) -> Result<RunContext, InputError> {
        if !self.catalog.supports_language(&job.target_language) {
            return Err(InputError::UnsupportedLanguage(job.target_language));
        }

        let inputs = FileManager::expand_inputs(&job.inputs)?;
        let outcome = FileManager::filter_by_extension(&inputs, &self.catalog.document_extensions());
        if outcome.accepted.is_empty() {
            return Err(InputError::NoDocuments(inputs.len()));
        }
        let documents = FileManager::file_records(&outcome.accepted)?;

        let glossary_outcome = glossary::select(&job.glossary_files, &self.catalog);
        for skipped in &glossary_outcome.discarded {
            warn!("Ignoring glossary with unsupported format: {:?}", skipped);
        }
        let glossaries = FileManager::file_records(&glossary_outcome.accepted)?;

        let output_dir = match job.output_dir.or_else(|| self.settings.output_dir.clone()) {
            Some(dir) => dir,
            None => FileManager::output_dir_for(&documents[0].path, &job.target_language)
                .map_err(|e| InputError::Io(e.to_string()))?,
        };

        Ok(RunContext {
            run_id: job.run_id,
            names: ContainerNames::for_run(job.run_id),
            target_language: job.target_language,
            documents,
            glossaries,
            discarded: outcome.discarded,
            output_dir,
        })
    }

    async fn execute(
        &self,
        context: &RunContext,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let storage = self.containers.storage().as_ref();
        let limit = self.settings.max_concurrent_transfers;

        let pair = self
            .containers
            .provision(&context.names, context.has_glossaries())
            .await
            .map_err(RunError::Provision)?;

        let glossary_stage = async {
            match &pair.glossary {
                Some(container) => {
                    glossary::prepare(&self.containers, container, &context.glossaries, &self.catalog, limit).await
                }
                None => Ok(PreparedGlossaries::default()),
            }
        };
        let (uploaded, prepared) = tokio::join!(
            transfer::upload_files(storage, &pair.source, &context.documents, limit),
            glossary_stage
        );
        if uploaded.all_failed() {
            return Err(RunError::Upload {
                failed: uploaded.failed.len(),
                total: uploaded.total(),
            });
        }
        if !uploaded.is_complete() {
            warn!(
                "Submitting with {} of {} documents; the rest failed to upload",
                uploaded.succeeded.len(),
                uploaded.total()
            );
        }
        let prepared = prepared.map_err(RunError::Provision)?;

        let source_uri = self.containers.delegated_uri(&pair.source).map_err(RunError::Provision)?;
        let target_uri = self.containers.delegated_uri(&pair.target).map_err(RunError::Provision)?;
        let target = TargetDescriptor::new(&context.target_language, target_uri)
            .with_category(self.category.clone())
            .with_glossaries(prepared.glossaries);

        if cancel.is_cancelled() {
            return Err(RunError::Cancelled { last_status: None });
        }
        let job_handle = self.service.submit(BatchInput::folder(source_uri, vec![target])).await?;

        let poller = StatusPoller::new(self.service.clone(), self.settings.poll_interval)
            .with_max_errors(self.settings.max_poll_errors);
        let final_status = match poller.poll_until_terminal(&job_handle, events, cancel).await {
            Ok(status) => status,
            Err(PollError::Cancelled { last_status }) => {
                match self.service.cancel(&job_handle).await {
                    Ok(status) => info!("Cancellation requested: {}", status),
                    Err(e) => warn!("Failed to cancel job {}: {}", job_handle, e),
                }
                return Err(RunError::Cancelled { last_status });
            }
            Err(e) => return Err(e.into()),
        };

        if final_status.phase() == JobPhase::Failed {
            return Err(RunError::JobFailed { status: final_status });
        }

        let downloaded = transfer::download_all(storage, &pair.target, &context.output_dir, limit)
            .await
            .map_err(RunError::Download)?;
        if !downloaded.is_complete() {
            warn!(
                "{} of {} translated documents could not be downloaded",
                downloaded.failed.len(),
                downloaded.total()
            );
        }
        events
            .emit(
                RunEvent::DownloadComplete {
                    files: downloaded.succeeded.clone(),
                },
                cancel,
            )
            .await;

        Ok(RunSummary {
            run_id: context.run_id,
            final_status,
            discarded: context.discarded.clone(),
            uploaded,
            glossaries: prepared.report,
            downloaded,
            output_dir: context.output_dir.clone(),
            cleanup_failures: Vec::new(),
        })
    }
}
