//! Audio segment cache
//!
//! Holds fully decoded audio for a bounded number of episodes and serves
//! arbitrary time ranges out of it.
//!
//! - Cached episode: the range is sliced from memory (no I/O).
//! - Uncached episode: the range is decoded straight from the source file on
//!   the calling thread, and a full-episode load is queued for the
//!   background worker so later reads hit memory.
//!
//! One mutex guards the entry map, the loading set and the access clock.
//! Readers hold it only to look up an entry and bump its access tick; slicing
//! and encoding happen after it is released.
//!
//! Eviction is least-recently-used and only happens when the worker inserts a
//! new episode into a full cache. Access ticks come from a per-cache counter
//! that increases on every touch, so two entries never share a timestamp.
//!
//! Shutdown lets the worker finish the decode it is running and drops any
//! loads still queued.

use crate::audio::decoder::AudioDecoder;
use crate::audio::types::DecodedAudio;
use crate::error::Result;
use crate::sync::lock;
use serde::Serialize;
use sncast_common::EpisodeKey;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// One decoded episode held in memory
struct CacheEntry {
    audio: Arc<DecodedAudio>,
    last_access: u64,
}

/// Everything guarded by the cache's single state lock
#[derive(Default)]
struct CacheState {
    entries: HashMap<EpisodeKey, CacheEntry>,
    loading: HashSet<EpisodeKey>,
    clock: u64,
    /// Bumped by `clear()`; loads queued before a clear are discarded
    generation: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Full-episode decode job for the background worker
#[derive(Debug, Clone)]
struct LoadRequest {
    key: EpisodeKey,
    path: PathBuf,
    generation: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    loads_completed: AtomicU64,
    loads_failed: AtomicU64,
}

/// Cache counters, as reported by `/cache/status`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub loads_completed: u64,
    pub loads_failed: u64,
}

/// State shared between the cache handle and its worker thread
struct Shared {
    state: Mutex<CacheState>,
    queue: Mutex<VecDeque<LoadRequest>>,
    condvar: Condvar,
    stop_flag: AtomicBool,
    decoder: Arc<dyn AudioDecoder>,
    max_episodes: usize,
    counters: Counters,
}

impl Shared {
    /// Queue a full load unless one is already pending
    ///
    /// Caller holds the state lock (lock order: state, then queue).
    fn enqueue_locked(&self, state: &mut CacheState, key: EpisodeKey, path: &Path) -> bool {
        if state.loading.contains(&key) || self.stop_flag.load(Ordering::Relaxed) {
            return false;
        }
        state.loading.insert(key);

        let request = LoadRequest {
            key,
            path: path.to_path_buf(),
            generation: state.generation,
        };
        lock(&self.queue).push_back(request);
        self.condvar.notify_one();

        debug!("Queued background load of {} from {}", key, path.display());
        true
    }

    /// Record the outcome of a background load
    fn complete(&self, request: LoadRequest, result: Result<DecodedAudio>) {
        let mut state = lock(&self.state);

        if request.generation != state.generation {
            debug!("Discarding load of {} queued before cache clear", request.key);
            return;
        }
        state.loading.remove(&request.key);

        let audio = match result {
            Ok(audio) => audio,
            Err(e) => {
                self.counters.loads_failed.fetch_add(1, Ordering::Relaxed);
                warn!("Background load of {} failed: {}", request.key, e);
                return;
            }
        };

        if !state.entries.contains_key(&request.key) && state.entries.len() >= self.max_episodes {
            let victim = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| *key);
            if let Some(victim) = victim {
                state.entries.remove(&victim);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                info!("Evicted {} from segment cache", victim);
            }
        }

        let duration = audio.duration_secs();
        let last_access = state.tick();
        state.entries.insert(
            request.key,
            CacheEntry {
                audio: Arc::new(audio),
                last_access,
            },
        );
        self.counters.loads_completed.fetch_add(1, Ordering::Relaxed);

        info!(
            "Cached {} ({:.1}s decoded, {}/{} episodes)",
            request.key,
            duration,
            state.entries.len(),
            self.max_episodes
        );
    }
}

/// Bounded LRU cache of decoded episodes with one background loader thread
pub struct SegmentCache {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SegmentCache {
    /// Create the cache and start its worker thread
    ///
    /// `max_episodes` is clamped to at least one.
    pub fn new(decoder: Arc<dyn AudioDecoder>, max_episodes: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(CacheState::default()),
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
            decoder,
            max_episodes: max_episodes.max(1),
            counters: Counters::default(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("segment-cache-loader".to_string())
            .spawn(move || Self::worker_loop(worker_shared));

        let worker = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Still usable: every read takes the range-decode path
                error!("Failed to start segment cache worker: {}", e);
                shared.stop_flag.store(true, Ordering::Relaxed);
                None
            }
        };

        info!("Segment cache started (capacity {} episodes)", shared.max_episodes);

        Self {
            shared,
            worker: Mutex::new(worker),
        }
    }

    /// Audio for `[offset, offset + duration)` of an episode
    ///
    /// Served from memory when the episode is cached. Otherwise only the
    /// requested range is decoded from `path`, and a full load is queued.
    pub fn get_segment(
        &self,
        key: EpisodeKey,
        path: &Path,
        offset_secs: f64,
        duration_secs: f64,
    ) -> Result<DecodedAudio> {
        let cached = {
            let mut state = lock(&self.shared.state);
            let tick = state.tick();
            match state.entries.get_mut(&key) {
                Some(entry) => {
                    entry.last_access = tick;
                    Some(Arc::clone(&entry.audio))
                }
                None => {
                    self.shared.enqueue_locked(&mut state, key, path);
                    None
                }
            }
        };

        if let Some(audio) = cached {
            self.shared.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(audio.slice(offset_secs, duration_secs));
        }

        self.shared.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {}, decoding range directly", key);
        self.shared
            .decoder
            .decode_range(path, offset_secs, duration_secs)
    }

    /// Queue a full load of an episode unless it is cached or already loading
    ///
    /// A cached episode has its access time refreshed. Returns true when a
    /// new load was queued.
    pub fn ensure_background_load(&self, key: EpisodeKey, path: &Path) -> bool {
        let mut state = lock(&self.shared.state);
        let tick = state.tick();
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.last_access = tick;
            return false;
        }
        self.shared.enqueue_locked(&mut state, key, path)
    }

    /// Cache membership only; in-flight loads do not count
    pub fn is_loaded(&self, key: EpisodeKey) -> bool {
        lock(&self.shared.state).entries.contains_key(&key)
    }

    pub fn is_loading(&self, key: EpisodeKey) -> bool {
        lock(&self.shared.state).loading.contains(&key)
    }

    /// Cached keys, least recently used first
    pub fn loaded_keys(&self) -> Vec<EpisodeKey> {
        let state = lock(&self.shared.state);
        let mut keys: Vec<(u64, EpisodeKey)> = state
            .entries
            .iter()
            .map(|(key, entry)| (entry.last_access, *key))
            .collect();
        keys.sort_unstable();
        keys.into_iter().map(|(_, key)| key).collect()
    }

    pub fn loading_keys(&self) -> Vec<EpisodeKey> {
        let mut keys: Vec<EpisodeKey> = lock(&self.shared.state).loading.iter().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn capacity(&self) -> usize {
        self.shared.max_episodes
    }

    /// Total decoded bytes held in memory
    pub fn memory_bytes(&self) -> usize {
        lock(&self.shared.state)
            .entries
            .values()
            .map(|entry| entry.audio.size_bytes())
            .sum()
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.shared.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            loads_completed: c.loads_completed.load(Ordering::Relaxed),
            loads_failed: c.loads_failed.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry, the loading set and any queued loads
    ///
    /// A load already running in the worker finishes but its result is
    /// discarded.
    pub fn clear(&self) {
        let mut state = lock(&self.shared.state);
        state.entries.clear();
        state.loading.clear();
        state.generation += 1;
        lock(&self.shared.queue).clear();
        info!("Segment cache cleared");
    }

    /// Stop the worker and wait for it to exit
    ///
    /// The decode in progress (if any) completes; queued loads are dropped.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        {
            let mut queue = lock(&self.shared.queue);
            self.shared.stop_flag.store(true, Ordering::Relaxed);
            let dropped = queue.len();
            queue.clear();
            if dropped > 0 {
                debug!("Dropping {} queued background loads", dropped);
            }
        }
        self.shared.condvar.notify_all();

        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            match handle.join() {
                Ok(()) => info!("Segment cache worker stopped"),
                Err(e) => error!("Segment cache worker join failed: {:?}", e),
            }
        }

        // Keys whose jobs were dropped are no longer loading
        let mut state = lock(&self.shared.state);
        state.loading.clear();
    }

    fn worker_loop(shared: Arc<Shared>) {
        debug!("Segment cache worker started");

        loop {
            let request = {
                let mut queue = lock(&shared.queue);
                while queue.is_empty() && !shared.stop_flag.load(Ordering::Relaxed) {
                    queue = shared
                        .condvar
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                }

                if shared.stop_flag.load(Ordering::Relaxed) {
                    debug!("Segment cache worker received shutdown signal");
                    break;
                }

                queue.pop_front()
            };

            let Some(request) = request else {
                continue;
            };

            debug!("Loading {} from {}", request.key, request.path.display());
            let result = shared.decoder.decode_full(&request.path);
            shared.complete(request, result);
        }
    }
}

impl Drop for SegmentCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}
