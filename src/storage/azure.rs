/*!
 * Azure Blob Storage backend.
 *
 * Talks to the Blob REST API with reqwest. Every request is authorised with a
 * short-lived account SAS derived from the connection-string key, so no
 * per-request canonicalisation is needed. Listings are XML and are parsed
 * with quick-xml.
 */

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::sas::{self, SAS_VERSION};
use super::{BlobStorage, ContainerInfo, SasPermissions};
use crate::errors::{CredentialsError, StorageError, StorageResult};

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Lifetime of the signatures used for our own REST calls
const REQUEST_SAS_TTL: chrono::Duration = chrono::Duration::minutes(15);

/// Storage account parsed from a connection string
#[derive(Clone)]
pub struct StorageAccount {
    pub name: String,
    key: Vec<u8>,
    /// Blob service endpoint without trailing slash
    pub blob_endpoint: String,
}

impl std::fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAccount")
            .field("name", &self.name)
            .field("blob_endpoint", &self.blob_endpoint)
            .finish()
    }
}

impl StorageAccount {
    /// Parse `DefaultEndpointsProtocol=...;AccountName=...;AccountKey=...;EndpointSuffix=...`.
    ///
    /// An explicit `BlobEndpoint` wins over the protocol/suffix pair.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, CredentialsError> {
        let mut name = None;
        let mut key = None;
        let mut protocol = "https".to_string();
        let mut suffix = DEFAULT_ENDPOINT_SUFFIX.to_string();
        let mut blob_endpoint = None;

        for part in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (field, value) = part.split_once('=').ok_or_else(|| {
                CredentialsError::InvalidConnectionString(format!("malformed segment '{}'", part))
            })?;
            match field.to_ascii_lowercase().as_str() {
                "accountname" => name = Some(value.to_string()),
                "accountkey" => key = Some(value.to_string()),
                "defaultendpointsprotocol" => protocol = value.to_string(),
                "endpointsuffix" => suffix = value.to_string(),
                "blobendpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                _ => {}
            }
        }

        let name = name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CredentialsError::InvalidConnectionString("AccountName is missing".to_string()))?;
        let key = key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CredentialsError::InvalidConnectionString("AccountKey is missing".to_string()))?;
        let key = STANDARD
            .decode(key)
            .map_err(|e| CredentialsError::InvalidConnectionString(format!("AccountKey is not base64: {}", e)))?;
        let blob_endpoint =
            blob_endpoint.unwrap_or_else(|| format!("{}://{}.blob.{}", protocol, name, suffix));

        Ok(Self {
            name,
            key,
            blob_endpoint,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ContainerEnumeration {
    #[serde(rename = "Containers", default)]
    containers: ContainerList,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerList {
    #[serde(rename = "Container", default)]
    items: Vec<ContainerItem>,
}

#[derive(Debug, Deserialize)]
struct ContainerItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Properties")]
    properties: ContainerProperties,
}

#[derive(Debug, Deserialize)]
struct ContainerProperties {
    #[serde(rename = "Last-Modified")]
    last_modified: String,
}

#[derive(Debug, Deserialize)]
struct BlobEnumeration {
    #[serde(rename = "Blobs", default)]
    blobs: BlobList,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
struct BlobItem {
    #[serde(rename = "Name")]
    name: String,
}

fn parse_containers(xml: &str) -> StorageResult<(Vec<ContainerInfo>, Option<String>)> {
    let listing: ContainerEnumeration =
        quick_xml::de::from_str(xml).map_err(|e| StorageError::ParseError(e.to_string()))?;
    let containers = listing
        .containers
        .items
        .into_iter()
        .map(|item| {
            let last_modified = DateTime::parse_from_rfc2822(&item.properties.last_modified)
                .map_err(|e| {
                    StorageError::ParseError(format!(
                        "Last-Modified '{}' of {}: {}",
                        item.properties.last_modified, item.name, e
                    ))
                })?
                .with_timezone(&Utc);
            Ok(ContainerInfo {
                name: item.name,
                last_modified,
            })
        })
        .collect::<StorageResult<Vec<_>>>()?;
    Ok((containers, listing.next_marker.filter(|m| !m.is_empty())))
}

fn parse_blobs(xml: &str) -> StorageResult<(Vec<String>, Option<String>)> {
    let listing: BlobEnumeration =
        quick_xml::de::from_str(xml).map_err(|e| StorageError::ParseError(e.to_string()))?;
    let names = listing.blobs.items.into_iter().map(|b| b.name).collect();
    Ok((names, listing.next_marker.filter(|m| !m.is_empty())))
}

/// Blob Storage client for one account
#[derive(Debug, Clone)]
pub struct AzureBlobStorage {
    client: Client,
    account: StorageAccount,
}

impl AzureBlobStorage {
    pub fn new(account: StorageAccount, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            account,
        }
    }

    /// URL under the blob endpoint with the given path segments and query pairs,
    /// signed with a fresh account SAS
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> StorageResult<Url> {
        let mut url = Url::parse(&self.account.blob_endpoint)
            .map_err(|e| StorageError::RequestFailed(format!("invalid blob endpoint: {}", e)))?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                StorageError::RequestFailed(format!("invalid blob endpoint: {}", self.account.blob_endpoint))
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        let signature = sas::account_sas(
            &self.account.name,
            &self.account.key,
            Utc::now() + REQUEST_SAS_TTL,
            sas::protocol_for(&self.account.blob_endpoint),
        )?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        let combined = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, signature),
            _ => signature,
        };
        url.set_query(Some(&combined));
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> StorageResult<Response> {
        request
            .header("x-ms-version", SAS_VERSION)
            .send()
            .await
            .map_err(|e| StorageError::RequestFailed(e.to_string()))
    }

    async fn failure_message(response: Response) -> String {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error response text".to_string());
        format!("{} {}", status, body)
    }
}

#[async_trait]
impl BlobStorage for AzureBlobStorage {
    async fn create_container(&self, container: &str) -> StorageResult<()> {
        let url = self.url(&[container], &[("restype", "container")])?;
        let response = self.send(self.client.put(url)).await?;
        match response.status() {
            status if status.is_success() => {
                debug!("Container {} created", container);
                Ok(())
            }
            StatusCode::CONFLICT => {
                debug!("Container {} already exists", container);
                Ok(())
            }
            _ => Err(StorageError::Container {
                container: container.to_string(),
                message: Self::failure_message(response).await,
            }),
        }
    }

    async fn delete_container(&self, container: &str) -> StorageResult<()> {
        let url = self.url(&[container], &[("restype", "container")])?;
        let response = self.send(self.client.delete(url)).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(container.to_string())),
            _ => Err(StorageError::Container {
                container: container.to_string(),
                message: Self::failure_message(response).await,
            }),
        }
    }

    async fn list_containers(&self, prefix: &str) -> StorageResult<Vec<ContainerInfo>> {
        let mut containers = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut query = vec![("comp", "list"), ("prefix", prefix)];
            if let Some(m) = marker.as_deref() {
                query.push(("marker", m));
            }
            let url = self.url(&[], &query)?;
            let response = self.send(self.client.get(url)).await?;
            if !response.status().is_success() {
                return Err(StorageError::RequestFailed(Self::failure_message(response).await));
            }
            let body = response
                .text()
                .await
                .map_err(|e| StorageError::RequestFailed(e.to_string()))?;
            let (page, next) = parse_containers(&body)?;
            containers.extend(page);
            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(containers)
    }

    async fn upload_blob(&self, container: &str, name: &str, data: Bytes) -> StorageResult<()> {
        let url = self.url(&[container, name], &[])?;
        let response = self
            .send(self.client.put(url).header("x-ms-blob-type", "BlockBlob").body(data))
            .await
            .map_err(|e| StorageError::UploadFailed {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(StorageError::UploadFailed {
                name: name.to_string(),
                message: Self::failure_message(response).await,
            })
        }
    }

    async fn download_blob(&self, container: &str, name: &str) -> StorageResult<Bytes> {
        let url = self.url(&[container, name], &[])?;
        let response = self.send(self.client.get(url)).await?;
        match response.status() {
            status if status.is_success() => {
                response.bytes().await.map_err(|e| StorageError::DownloadFailed {
                    name: name.to_string(),
                    message: e.to_string(),
                })
            }
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(format!("{}/{}", container, name))),
            _ => Err(StorageError::DownloadFailed {
                name: name.to_string(),
                message: Self::failure_message(response).await,
            }),
        }
    }

    async fn list_blobs(&self, container: &str) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut query = vec![("restype", "container"), ("comp", "list")];
            if let Some(m) = marker.as_deref() {
                query.push(("marker", m));
            }
            let url = self.url(&[container], &query)?;
            let response = self.send(self.client.get(url)).await?;
            match response.status() {
                status if status.is_success() => {}
                StatusCode::NOT_FOUND => return Err(StorageError::NotFound(container.to_string())),
                _ => return Err(StorageError::RequestFailed(Self::failure_message(response).await)),
            }
            let body = response
                .text()
                .await
                .map_err(|e| StorageError::RequestFailed(e.to_string()))?;
            let (page, next) = parse_blobs(&body)?;
            names.extend(page);
            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(names)
    }

    fn container_sas_url(
        &self,
        container: &str,
        permissions: SasPermissions,
        ttl: Duration,
    ) -> StorageResult<String> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| StorageError::Signing(e.to_string()))?;
        let query = sas::container_sas(
            &self.account.name,
            &self.account.key,
            container,
            permissions,
            Utc::now() + ttl,
            sas::protocol_for(&self.account.blob_endpoint),
        )?;
        Ok(format!("{}/{}?{}", self.account.blob_endpoint, container, query))
    }
}
