/*!
 * # doctrans - Batch document translation orchestrator
 *
 * A Rust library that translates batches of documents with Azure Translator
 * document translation, staging files through Azure Blob Storage.
 *
 * ## Features
 *
 * - Filter inputs by the document formats the service supports
 * - Ephemeral per-run storage containers with time-scoped delegated access
 * - Bounded-concurrency upload and download stages
 * - Submission with retry, classifying rejected vs. transient failures
 * - Status polling with de-duplicated progress events
 * - Optional glossaries and Custom Translator categories
 * - Cancellation and guaranteed container cleanup
 * - Sweep of stale containers left behind by interrupted runs
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `errors`: Custom error types for every stage
 * - `logging`: Logger installation for embedding applications
 * - `file_utils`: Extension filter, input expansion and output paths
 * - `storage`: Blob storage abstraction:
 *   - `storage::azure`: Azure Blob Storage REST client
 *   - `storage::sas`: Shared-access signatures
 *   - `storage::memory`: In-memory backend for tests
 * - `containers`: Container naming, provisioning and teardown
 * - `transfer`: Upload and download stages
 * - `glossary`: Glossary upload and descriptors
 * - `service`: Translation service client:
 *   - `service::catalog`: Format and language discovery
 *   - `service::models`: Request and response bodies
 *   - `service::http`: reqwest transport
 *   - `service::mock`: Scripted transport for tests
 * - `events`: Progress events
 * - `poller`: Job status polling
 * - `orchestrator`: Sequencing of a complete run
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod containers;
pub mod errors;
pub mod events;
pub mod file_utils;
pub mod glossary;
pub mod logging;
pub mod orchestrator;
pub mod poller;
pub mod service;
pub mod storage;
pub mod transfer;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{CredentialsError, InputError, RunError, ServiceError, StorageError, SubmissionError};
pub use events::{EventSink, RunEvent};
pub use orchestrator::{RunOrchestrator, RunSettings, RunSummary, TranslationJob};
pub use service::{DocumentTranslationService, ServiceCatalog};
pub use storage::BlobStorage;
