//! Single-flight cache for in-flight library lookups.
//!
//! The walker keys each lookup by `(name, canonical range, platform)`.
//! At most one task runs the lookup for a key; concurrent duplicates
//! wait for the first result. The cache is scoped to a walker (or a
//! caller-provided session), never process-global. A cancelled walk
//! discards its session, cache included; a cancelled claimer may leave
//! a key permanently pending, which is why waiters also watch their own
//! cancellation token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use galleon_core::identity::LibraryRange;
use galleon_core::platform::Platform;
use galleon_util::cancel::CancelToken;
use galleon_util::errors::{GalleonError, GalleonResult};
use tokio::sync::Notify;

use crate::graph::GraphItem;

/// Identity of one lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    name: String,
    range: String,
    platform: String,
}

impl LookupKey {
    pub fn new(request: &LibraryRange, platform: &Platform) -> Self {
        Self {
            name: request.name.key(),
            range: request.range.canonical_string(),
            platform: platform.to_string(),
        }
    }
}

/// The outcome of a finished lookup.
#[derive(Debug, Clone, Default)]
pub struct LookupResult {
    /// The winning item, if any provider produced a satisfying match.
    pub item: Option<GraphItem>,
    /// True when every provider failed with an error (as opposed to
    /// answering "no match").
    pub all_failed: bool,
}

/// Run each lookup once and share the result with concurrent waiters.
#[derive(Default)]
pub struct InFlightCache {
    notifiers: Mutex<HashMap<LookupKey, Arc<Notify>>>,
    results: Mutex<HashMap<LookupKey, LookupResult>>,
}

impl InFlightCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a lookup. Returns `true` when the caller must run it and
    /// eventually call [`InFlightCache::done`]; `false` when the lookup
    /// is already running or finished, in which case
    /// [`InFlightCache::wait`] yields the result.
    pub fn register(&self, key: &LookupKey) -> bool {
        if self.results.lock().unwrap().contains_key(key) {
            return false;
        }
        let mut notifiers = self.notifiers.lock().unwrap();
        if notifiers.contains_key(key) {
            false
        } else {
            notifiers.insert(key.clone(), Arc::new(Notify::new()));
            true
        }
    }

    /// Publish the result of a claimed lookup and wake every waiter.
    pub fn done(&self, key: &LookupKey, result: LookupResult) {
        self.results.lock().unwrap().insert(key.clone(), result);
        if let Some(notify) = self.notifiers.lock().unwrap().remove(key) {
            notify.notify_waiters();
        }
    }

    /// A finished result, if one is already available.
    pub fn get(&self, key: &LookupKey) -> Option<LookupResult> {
        self.results.lock().unwrap().get(key).cloned()
    }

    /// Wait for the result of a lookup someone else claimed.
    pub async fn wait(&self, key: &LookupKey, cancel: &CancelToken) -> GalleonResult<LookupResult> {
        loop {
            if let Some(result) = self.get(key) {
                return Ok(result);
            }
            let notify = self.notifiers.lock().unwrap().get(key).cloned();
            match notify {
                Some(notify) => {
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    // Re-check after registering: `done` may have landed
                    // between the map read and arming the notification.
                    if let Some(result) = self.get(key) {
                        return Ok(result);
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(GalleonError::Cancelled.into()),
                        _ = &mut notified => {}
                    }
                }
                // Neither running nor finished: the running walk was
                // cancelled and discarded its session.
                None => return Err(GalleonError::Cancelled.into()),
            }
        }
    }
}
