//! Shared-access signatures for Azure Blob Storage.
//!
//! Signature = base64(HMAC-SHA256(account key, string-to-sign)). Two kinds are
//! produced: a container (service) SAS handed to the translation service, and
//! an account SAS this crate uses to authorise its own REST calls.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

use super::SasPermissions;
use crate::errors::{StorageError, StorageResult};

/// Storage service version the signatures are computed for
pub const SAS_VERSION: &str = "2020-12-06";

/// Account permissions needed to manage containers and blobs
const ACCOUNT_PERMISSIONS: &str = "rwdlac";

fn sign(key: &[u8], string_to_sign: &str) -> StorageResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|e| StorageError::Signing(e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Allowed protocols, derived from the endpoint scheme
pub fn protocol_for(endpoint: &str) -> &'static str {
    if endpoint.starts_with("https://") { "https" } else { "https,http" }
}

/// Query string of a container-scoped SAS
pub fn container_sas(
    account: &str,
    key: &[u8],
    container: &str,
    permissions: SasPermissions,
    expiry: DateTime<Utc>,
    protocol: &str,
) -> StorageResult<String> {
    let permissions = permissions.as_str();
    let expiry = format_time(expiry);
    let canonical_resource = format!("/blob/{}/{}", account, container);

    let string_to_sign = [
        permissions.as_str(),
        "", // start
        expiry.as_str(),
        canonical_resource.as_str(),
        "", // stored access policy identifier
        "", // ip range
        protocol,
        SAS_VERSION,
        "c", // signed resource: container
        "", // snapshot time
        "", // encryption scope
        "", // cache-control
        "", // content-disposition
        "", // content-encoding
        "", // content-language
        "", // content-type
    ]
    .join("\n");
    let signature = sign(key, &string_to_sign)?;

    Ok(form_urlencoded::Serializer::new(String::new())
        .append_pair("sv", SAS_VERSION)
        .append_pair("sr", "c")
        .append_pair("sp", &permissions)
        .append_pair("se", &expiry)
        .append_pair("spr", protocol)
        .append_pair("sig", &signature)
        .finish())
}

/// Query string of an account SAS covering the blob service
pub fn account_sas(
    account: &str,
    key: &[u8],
    expiry: DateTime<Utc>,
    protocol: &str,
) -> StorageResult<String> {
    let expiry = format_time(expiry);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n",
        account,
        ACCOUNT_PERMISSIONS,
        "b",   // services
        "sco", // resource types
        "",    // start
        expiry,
        "", // ip range
        protocol,
        SAS_VERSION,
        "", // encryption scope
    );
    let signature = sign(key, &string_to_sign)?;

    Ok(form_urlencoded::Serializer::new(String::new())
        .append_pair("sv", SAS_VERSION)
        .append_pair("ss", "b")
        .append_pair("srt", "sco")
        .append_pair("sp", ACCOUNT_PERMISSIONS)
        .append_pair("se", &expiry)
        .append_pair("spr", protocol)
        .append_pair("sig", &signature)
        .finish())
}
