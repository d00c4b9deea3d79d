//! HTTP registry provider.
//!
//! A registry serves `GET <base>/<id-lowercase>/metadata.json` and
//! `GET <base>/<id-lowercase>/<version>/payload.bin`. 404 means "this
//! source does not carry the package"; server errors and transport
//! failures are transient and surface as [`GalleonError::Network`] so the
//! walker can apply its single retry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use galleon_core::dependency::LibraryDependency;
use galleon_core::identity::{LibraryIdentity, LibraryRange};
use galleon_core::platform::Platform;
use galleon_util::cancel::CancelToken;
use galleon_util::errors::{GalleonError, GalleonResult};
use reqwest::Client;

use crate::metadata::PackageMetadata;
use crate::provider::{verify_sha256, MetadataProvider};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a shared reqwest client for registry requests.
pub fn build_client() -> GalleonResult<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent("galleon/0.1")
        .build()
        .map_err(|e| {
            GalleonError::Network {
                message: format!("Failed to create HTTP client: {e}"),
            }
            .into()
        })
}

/// A provider querying a remote HTTP registry.
pub struct RemoteProvider {
    name: String,
    base_url: String,
    client: Client,
    /// Session-scoped document cache so `get_dependencies` reuses the
    /// listing fetched by `find_library`.
    documents: Mutex<HashMap<String, Arc<PackageMetadata>>>,
}

impl RemoteProvider {
    pub fn new(name: impl Into<String>, base_url: &str, client: Client) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            documents: Mutex::new(HashMap::new()),
        }
    }

    fn metadata_url(&self, id: &str) -> String {
        format!("{}/{}/metadata.json", self.base_url, id.to_lowercase())
    }

    fn payload_url(&self, id: &str, version: &str) -> String {
        format!(
            "{}/{}/{}/payload.bin",
            self.base_url,
            id.to_lowercase(),
            version
        )
    }

    /// Fetch raw bytes. `Ok(None)` for 404; transient failures (server
    /// errors, timeouts, connection refusals) map to `Network`.
    async fn fetch_bytes(
        &self,
        url: &str,
        cancel: &CancelToken,
    ) -> GalleonResult<Option<Vec<u8>>> {
        let request = self.client.get(url).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(GalleonError::Cancelled.into()),
            response = request => response,
        };

        match response {
            Ok(resp) => {
                let status = resp.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if status.is_server_error() {
                    return Err(GalleonError::Network {
                        message: format!("HTTP {status} from {url}"),
                    }
                    .into());
                }
                if !status.is_success() {
                    return Err(GalleonError::Generic {
                        message: format!("HTTP {status} fetching {url}"),
                    }
                    .into());
                }
                let bytes = resp.bytes().await.map_err(|e| GalleonError::Network {
                    message: format!("Failed to read response from {url}: {e}"),
                })?;
                Ok(Some(bytes.to_vec()))
            }
            Err(e) if e.is_timeout() || e.is_connect() => Err(GalleonError::Network {
                message: format!("{e}"),
            }
            .into()),
            Err(e) => Err(GalleonError::Generic {
                message: format!("Request to {url} failed: {e}"),
            }
            .into()),
        }
    }

    async fn load_metadata(
        &self,
        id: &str,
        cancel: &CancelToken,
    ) -> GalleonResult<Option<Arc<PackageMetadata>>> {
        let key = id.to_lowercase();
        if let Some(cached) = self.documents.lock().unwrap().get(&key).cloned() {
            return Ok(Some(cached));
        }

        let url = self.metadata_url(id);
        let Some(bytes) = self.fetch_bytes(&url, cancel).await? else {
            return Ok(None);
        };
        let metadata = Arc::new(PackageMetadata::parse(&bytes)?);
        self.documents
            .lock()
            .unwrap()
            .insert(key, metadata.clone());
        Ok(Some(metadata))
    }
}

#[async_trait]
impl MetadataProvider for RemoteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_http(&self) -> bool {
        true
    }

    async fn find_library(
        &self,
        request: &LibraryRange,
        _platform: &Platform,
        cancel: &CancelToken,
    ) -> GalleonResult<Option<LibraryIdentity>> {
        let Some(metadata) = self.load_metadata(request.name.as_str(), cancel).await? else {
            return Ok(None);
        };
        Ok(metadata.find_best(request).map(|(identity, _)| identity))
    }

    async fn get_dependencies(
        &self,
        identity: &LibraryIdentity,
        platform: &Platform,
        cancel: &CancelToken,
    ) -> GalleonResult<Vec<LibraryDependency>> {
        let Some(metadata) = self.load_metadata(identity.name.as_str(), cancel).await? else {
            return Ok(Vec::new());
        };
        match metadata.entry_for(&identity.version) {
            Some(entry) => entry.dependencies_for(platform),
            None => Ok(Vec::new()),
        }
    }

    async fn copy_to(
        &self,
        identity: &LibraryIdentity,
        sink: &mut (dyn std::io::Write + Send),
        cancel: &CancelToken,
    ) -> GalleonResult<()> {
        let url = self.payload_url(identity.name.as_str(), &identity.version.to_string());
        let Some(bytes) = self.fetch_bytes(&url, cancel).await? else {
            return Err(GalleonError::Generic {
                message: format!("Payload for {identity} not found at {url}"),
            }
            .into());
        };

        if let Some(metadata) = self.load_metadata(identity.name.as_str(), cancel).await? {
            if let Some(entry) = metadata.entry_for(&identity.version) {
                if let Some(ref sha256) = entry.sha256 {
                    verify_sha256(&bytes, sha256, identity)?;
                }
            }
        }

        sink.write_all(&bytes).map_err(GalleonError::Io)?;
        Ok(())
    }
}
