/*!
 * Format and language discovery.
 *
 * The three listings are independent and fetched together when the service
 * is initialized. The document extensions drive the extension filter; the
 * glossary formats drive the glossary stage.
 */

use log::{debug, info};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::models::{FileFormat, FormatsResponse, Language, LanguagesResponse};
use super::{DocumentTranslationService, ServiceRequest};
use crate::errors::ServiceError;

/// What the service can translate, as reported at initialization
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    pub document_formats: Vec<FileFormat>,
    pub glossary_formats: Vec<FileFormat>,
    /// Target languages keyed by language code
    pub languages: BTreeMap<String, Language>,
}

impl ServiceCatalog {
    /// Lowercase document extensions including the leading dot
    pub fn document_extensions(&self) -> HashSet<String> {
        extensions_of(&self.document_formats)
    }

    /// Lowercase glossary extensions including the leading dot
    pub fn glossary_extensions(&self) -> HashSet<String> {
        extensions_of(&self.glossary_formats)
    }

    /// Glossary format name for a file, by extension
    pub fn glossary_format_for(&self, path: &Path) -> Option<String> {
        let extension = format!(".{}", path.extension()?.to_string_lossy().to_lowercase());
        self.glossary_formats
            .iter()
            .find(|f| f.file_extensions.iter().any(|e| e.eq_ignore_ascii_case(&extension)))
            .map(|f| f.format.clone())
    }

    /// Whether the language is a known target; an empty listing accepts anything
    pub fn supports_language(&self, code: &str) -> bool {
        self.languages.is_empty()
            || self.languages.keys().any(|k| k.eq_ignore_ascii_case(code))
    }
}

fn extensions_of(formats: &[FileFormat]) -> HashSet<String> {
    formats
        .iter()
        .flat_map(|f| f.file_extensions.iter())
        .map(|e| e.to_lowercase())
        .collect()
}

impl DocumentTranslationService {
    /// Fetch document formats, glossary formats and languages concurrently.
    ///
    /// Returning marks initialization complete; the first failure is reported.
    pub async fn initialize(&self) -> Result<ServiceCatalog, ServiceError> {
        let (documents, glossaries, languages) = tokio::join!(
            self.fetch_formats("documents/formats"),
            self.fetch_formats("glossaries/formats"),
            self.fetch_languages()
        );

        let catalog = ServiceCatalog {
            document_formats: documents?,
            glossary_formats: glossaries?,
            languages: languages?,
        };
        info!(
            "Initialization complete: {} document formats, {} glossary formats, {} languages",
            catalog.document_formats.len(),
            catalog.glossary_formats.len(),
            catalog.languages.len()
        );
        Ok(catalog)
    }

    async fn fetch_formats(&self, path: &str) -> Result<Vec<FileFormat>, ServiceError> {
        let url = format!("{}/{}", self.endpoint, path);
        let response = self.transport.send(ServiceRequest::get(&url)).await?;
        let formats: FormatsResponse = response.parse()?;
        debug!("Fetched {} formats from {}", formats.value.len(), url);
        Ok(formats.value)
    }

    async fn fetch_languages(&self) -> Result<BTreeMap<String, Language>, ServiceError> {
        let response = self
            .transport
            .send(ServiceRequest::get(&self.languages_endpoint).anonymous())
            .await?;
        let languages: LanguagesResponse = response.parse()?;
        Ok(languages.translation)
    }
}
