//! The provider interface the resolver core consumes.

use async_trait::async_trait;
use galleon_core::dependency::LibraryDependency;
use galleon_core::identity::{LibraryIdentity, LibraryRange};
use galleon_core::platform::Platform;
use galleon_util::cancel::CancelToken;
use galleon_util::errors::GalleonResult;

/// A source of package metadata.
///
/// Providers are held as `Arc<dyn MetadataProvider>` in an ordered chain;
/// the walker invokes every provider in the chain concurrently, so
/// implementations must tolerate concurrent calls.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Short human-readable source name, used in match records and logs.
    fn name(&self) -> &str;

    /// Whether this provider reaches over the network. Remote providers
    /// are raced but never consulted for project-kind requests, and their
    /// failures are transient.
    fn is_http(&self) -> bool;

    /// Resolve a requested range to the identity this source would
    /// supply, or `None` when the source has no satisfying version.
    async fn find_library(
        &self,
        request: &LibraryRange,
        platform: &Platform,
        cancel: &CancelToken,
    ) -> GalleonResult<Option<LibraryIdentity>>;

    /// The dependencies of a previously resolved identity for a platform.
    async fn get_dependencies(
        &self,
        identity: &LibraryIdentity,
        platform: &Platform,
        cancel: &CancelToken,
    ) -> GalleonResult<Vec<LibraryDependency>>;

    /// Copy the package payload into `sink`, verifying its recorded
    /// checksum when one is present. Used by installers, not by the
    /// resolver core.
    async fn copy_to(
        &self,
        identity: &LibraryIdentity,
        sink: &mut (dyn std::io::Write + Send),
        cancel: &CancelToken,
    ) -> GalleonResult<()>;
}

/// Verify payload bytes against a hex-encoded sha256 digest.
pub(crate) fn verify_sha256(
    bytes: &[u8],
    expected: &str,
    what: &LibraryIdentity,
) -> GalleonResult<()> {
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(bytes);
    let actual = digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(galleon_util::errors::GalleonError::Generic {
            message: format!("Checksum mismatch for {what}: expected {expected}, got {actual}"),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galleon_core::version::Version;

    #[test]
    fn sha256_verification() {
        let identity = LibraryIdentity::package("lib", Version::new(1, 0, 0));
        // sha256 of "galleon"
        let expected = "832d40bbe5f340cf66d59040d718bd0a394408710cc20fa311244e11efc43957";
        assert!(verify_sha256(b"galleon", expected, &identity).is_ok());
        assert!(verify_sha256(b"tampered", expected, &identity).is_err());
    }
}
