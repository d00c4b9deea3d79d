//! Shared test provider with configurable delay and failure injection.

// Each test binary uses a different subset of the helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use galleon_core::dependency::LibraryDependency;
use galleon_core::identity::{LibraryIdentity, LibraryRange};
use galleon_core::platform::Platform;
use galleon_core::range::{best_match, VersionRange};
use galleon_core::version::Version;
use galleon_provider::MetadataProvider;
use galleon_util::cancel::CancelToken;
use galleon_util::errors::{GalleonError, GalleonResult};

pub struct TestProvider {
    name: String,
    delay: Duration,
    /// Keyed by lowercase id: every published (version, dependencies).
    packages: HashMap<String, Vec<(Version, Vec<LibraryDependency>)>>,
    pub find_calls: AtomicUsize,
    /// Remaining `find_library` calls that fail with a transient error.
    transient_failures: AtomicUsize,
}

impl TestProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            packages: HashMap::new(),
            find_calls: AtomicUsize::new(0),
            transient_failures: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_transiently(self, failures: usize) -> Self {
        self.transient_failures.store(failures, Ordering::SeqCst);
        self
    }

    /// Publish `id version` depending on each `(id, range)` pair.
    pub fn package(mut self, id: &str, version: &str, dependencies: &[(&str, &str)]) -> Self {
        let dependencies = dependencies
            .iter()
            .map(|(dep_id, range)| {
                LibraryDependency::new(LibraryRange::new(
                    *dep_id,
                    VersionRange::parse(range).unwrap(),
                ))
            })
            .collect();
        self.packages
            .entry(id.to_lowercase())
            .or_default()
            .push((Version::parse(version).unwrap(), dependencies));
        self
    }
}

#[async_trait]
impl MetadataProvider for TestProvider {
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
        _cancel: &CancelToken,
    ) -> GalleonResult<Option<LibraryIdentity>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GalleonError::Network {
                message: "injected transient failure".to_string(),
            }
            .into());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let Some(entries) = self.packages.get(&request.name.key()) else {
            return Ok(None);
        };
        Ok(
            best_match(entries.iter(), &request.range, |(version, _)| version).map(
                |(version, _)| LibraryIdentity::package(request.name.as_str(), version.clone()),
            ),
        )
    }

    async fn get_dependencies(
        &self,
        identity: &LibraryIdentity,
        _platform: &Platform,
        _cancel: &CancelToken,
    ) -> GalleonResult<Vec<LibraryDependency>> {
        let Some(entries) = self.packages.get(&identity.name.key()) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .iter()
            .find(|(version, _)| version == &identity.version)
            .map(|(_, dependencies)| dependencies.clone())
            .unwrap_or_default())
    }

    async fn copy_to(
        &self,
        identity: &LibraryIdentity,
        _sink: &mut (dyn std::io::Write + Send),
        _cancel: &CancelToken,
    ) -> GalleonResult<()> {
        Err(GalleonError::Generic {
            message: format!("no payload for {identity} in the test provider"),
        }
        .into())
    }
}
