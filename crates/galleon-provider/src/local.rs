//! Directory-backed metadata provider.
//!
//! Layout mirrors the remote registry:
//! `<root>/<id-lowercase>/metadata.json` for the version listing and
//! `<root>/<id-lowercase>/<version>/payload.bin` for package payloads.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use galleon_core::dependency::LibraryDependency;
use galleon_core::identity::{LibraryIdentity, LibraryRange};
use galleon_core::platform::Platform;
use galleon_util::cancel::CancelToken;
use galleon_util::errors::{GalleonError, GalleonResult};

use crate::metadata::PackageMetadata;
use crate::provider::{verify_sha256, MetadataProvider};

/// A provider serving registry documents from a local directory.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    name: String,
    root: PathBuf,
}

impl LocalProvider {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, id: &str) -> PathBuf {
        self.root.join(id.to_lowercase())
    }

    fn load_metadata(&self, id: &str) -> GalleonResult<Option<PackageMetadata>> {
        let path = self.package_dir(id).join("metadata.json");
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(GalleonError::Io)?;
        PackageMetadata::parse(&bytes).map(Some)
    }

    /// Write a metadata document into the layout. Intended for tests and
    /// for mirroring tools that seed an offline source.
    pub fn put_metadata(&self, metadata: &PackageMetadata) -> GalleonResult<PathBuf> {
        let dir = self.package_dir(&metadata.id);
        fs::create_dir_all(&dir).map_err(GalleonError::Io)?;
        let path = dir.join("metadata.json");
        let json = serde_json::to_vec_pretty(metadata).map_err(|e| GalleonError::Generic {
            message: format!("Failed to serialize metadata: {e}"),
        })?;
        fs::write(&path, json).map_err(GalleonError::Io)?;
        Ok(path)
    }
}

#[async_trait]
impl MetadataProvider for LocalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_http(&self) -> bool {
        false
    }

    async fn find_library(
        &self,
        request: &LibraryRange,
        _platform: &Platform,
        cancel: &CancelToken,
    ) -> GalleonResult<Option<LibraryIdentity>> {
        if cancel.is_cancelled() {
            return Err(GalleonError::Cancelled.into());
        }
        let Some(metadata) = self.load_metadata(request.name.as_str())? else {
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
        if cancel.is_cancelled() {
            return Err(GalleonError::Cancelled.into());
        }
        let Some(metadata) = self.load_metadata(identity.name.as_str())? else {
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
        if cancel.is_cancelled() {
            return Err(GalleonError::Cancelled.into());
        }
        let path = self
            .package_dir(identity.name.as_str())
            .join(identity.version.to_string())
            .join("payload.bin");
        let bytes = fs::read(&path).map_err(GalleonError::Io)?;

        if let Some(metadata) = self.load_metadata(identity.name.as_str())? {
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
