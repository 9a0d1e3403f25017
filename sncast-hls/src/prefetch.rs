//! Prefetch coordinator
//!
//! Accessing episode N warms episode N+1: its source file is downloaded and,
//! once present, queued for a full background decode. The chain runs as a
//! detached task. Failures are logged and never reach the request that
//! triggered it.

use crate::cache::{DownloadCache, SegmentCache};
use crate::sync::lock;
use sncast_common::{Catalog, EpisodeKey};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Pending = Arc<Mutex<HashSet<EpisodeKey>>>;

pub struct PrefetchCoordinator {
    catalog: Arc<Catalog>,
    downloads: DownloadCache,
    segments: Arc<SegmentCache>,
    /// Successors with a prefetch chain running
    pending: Pending,
}

impl PrefetchCoordinator {
    pub fn new(catalog: Arc<Catalog>, downloads: DownloadCache, segments: Arc<SegmentCache>) -> Self {
        Self {
            catalog,
            downloads,
            segments,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start warming the successor of `key`
    ///
    /// Returns the spawned task, or `None` when there is nothing to do: no
    /// successor in the catalog, successor already cached or loading, or a
    /// chain for it already running. Must be called inside a Tokio runtime.
    pub fn on_access(&self, key: EpisodeKey) -> Option<JoinHandle<()>> {
        let next = self.catalog.next_key(key)?;
        if self.segments.is_loaded(next) || self.segments.is_loading(next) {
            return None;
        }

        let url = self.catalog.episode_source_url(next)?.to_string();
        let file_name = self.catalog.get(next)?.file_name();
        if !lock(&self.pending).insert(next) {
            return None;
        }
        let slot = PendingSlot {
            pending: Arc::clone(&self.pending),
            key: next,
        };

        debug!("Prefetching {} after access to {}", next, key);

        let downloads = self.downloads.clone();
        let segments = Arc::clone(&self.segments);
        Some(tokio::spawn(async move {
            let _slot = slot;
            match downloads.ensure_downloaded(&url, &file_name).await {
                Ok(path) => {
                    if segments.ensure_background_load(next, &path) {
                        debug!("Prefetch queued full load of {}", next);
                    }
                }
                Err(e) => warn!("Prefetch of {} failed: {}", next, e),
            }
        }))
    }

    /// Successors with a prefetch chain running, sorted
    pub fn pending(&self) -> Vec<EpisodeKey> {
        let mut keys: Vec<EpisodeKey> = lock(&self.pending).iter().copied().collect();
        keys.sort_unstable();
        keys
    }
}

/// Releases a pending entry when the chain ends, even if the task is aborted
struct PendingSlot {
    pending: Pending,
    key: EpisodeKey,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.key);
    }
}
