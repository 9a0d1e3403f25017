//! Download cache
//!
//! Makes sure a remote episode file exists under the episodes directory,
//! with at most one physical fetch per file name at any time.
//!
//! A file on disk under its final name is treated as fully fetched; nothing
//! re-downloads or checksums it. Fetches write to `<name>.part` and rename on
//! success, so a partial file is never visible under the final name.
//!
//! Concurrent callers for the same file name all wait for the one fetch in
//! flight and see its outcome. Fetches run as detached tasks on a pool
//! bounded by a semaphore, so a caller that goes away does not cancel the
//! download for the others.

use crate::error::{Error, Result};
use crate::sync::lock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

/// Published once a fetch finishes; the error is kept as text so every
/// waiter gets a copy
type Outcome = std::result::Result<(), String>;

const PART_SUFFIX: &str = ".part";

struct Inner {
    dir: PathBuf,
    client: reqwest::Client,
    permits: Semaphore,
    /// File names with a fetch in flight, and where to wait for it
    inflight: Mutex<HashMap<String, watch::Receiver<Option<Outcome>>>>,
    fetches: AtomicU64,
}

/// Deduplicating downloader for episode source files
#[derive(Clone)]
pub struct DownloadCache {
    inner: Arc<Inner>,
}

impl DownloadCache {
    /// Create a cache writing into `dir`
    ///
    /// The directory is created if needed and `.part` leftovers from an
    /// interrupted run are removed.
    pub fn new(dir: PathBuf, max_concurrent: usize, timeout: Duration) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        remove_partial_files(&dir);

        let client = reqwest::Client::builder()
            .user_agent(concat!("sncast/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client error: {}", e)))?;

        let max_concurrent = max_concurrent.max(1);
        info!(
            "Download cache at {} ({} concurrent downloads)",
            dir.display(),
            max_concurrent
        );

        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                client,
                permits: Semaphore::new(max_concurrent),
                inflight: Mutex::new(HashMap::new()),
                fetches: AtomicU64::new(0),
            }),
        })
    }

    /// Make sure `remote_url` is present locally as `local_filename`
    ///
    /// Returns at once when the file already exists. Otherwise starts the
    /// fetch, or joins the one already in flight, and waits for it. Every
    /// caller of a failed fetch gets [`Error::Download`], and the next call
    /// retries.
    pub async fn ensure_downloaded(&self, remote_url: &str, local_filename: &str) -> Result<PathBuf> {
        validate_file_name(local_filename)?;
        let path = self.local_path(local_filename);

        let mut rx = {
            let mut inflight = lock(&self.inner.inflight);
            if let Some(rx) = inflight.get(local_filename) {
                debug!("Joining in-flight download of {}", local_filename);
                rx.clone()
            } else {
                // Checked under the lock: a finished fetch renames its file
                // before giving up its slot
                if path.exists() {
                    return Ok(path);
                }

                let (tx, rx) = watch::channel(None);
                inflight.insert(local_filename.to_string(), rx.clone());

                let slot = InflightSlot {
                    inner: Arc::clone(&self.inner),
                    name: local_filename.to_string(),
                    tx,
                    outcome: None,
                };
                tokio::spawn(run_download(slot, remote_url.to_string()));
                rx
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        match outcome {
            Some(Ok(())) => Ok(path),
            Some(Err(message)) => Err(Error::Download(message)),
            None => Err(Error::Download(format!(
                "Download of {} ended without a result",
                local_filename
            ))),
        }
    }

    /// Final local path for a file name (whether or not it exists yet)
    pub fn local_path(&self, local_filename: &str) -> PathBuf {
        self.inner.dir.join(local_filename)
    }

    /// True once the file is fully written under its final name
    pub fn is_present(&self, local_filename: &str) -> bool {
        self.local_path(local_filename).exists()
    }

    pub fn is_downloading(&self, local_filename: &str) -> bool {
        lock(&self.inner.inflight).contains_key(local_filename)
    }

    /// File names with a fetch in flight, sorted
    pub fn downloading(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner.inflight).keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of physical fetches started since creation
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::Relaxed)
    }
}

/// Owns a file name's in-flight entry for the life of its fetch task
///
/// Dropping the slot frees the name and wakes every waiter, whether the
/// fetch finished, failed, panicked or was cancelled with its runtime. A
/// slot dropped without an outcome reports the download as interrupted.
struct InflightSlot {
    inner: Arc<Inner>,
    name: String,
    tx: watch::Sender<Option<Outcome>>,
    outcome: Option<Outcome>,
}

impl Drop for InflightSlot {
    fn drop(&mut self) {
        // The name is freed before waiters wake, and a successful fetch has
        // already renamed its file, so a woken caller finds it on disk
        lock(&self.inner.inflight).remove(&self.name);

        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| Err(format!("Download of {} was interrupted", self.name)));
        self.tx.send_replace(Some(outcome));
    }
}

async fn run_download(mut slot: InflightSlot, url: String) {
    let result = slot.inner.fetch(&url, &slot.name).await;
    if let Err(e) = &result {
        warn!("Download of {} failed: {}", url, e);
    }
    slot.outcome = Some(result.map_err(|e| e.to_string()));
}

impl Inner {
    async fn fetch(&self, url: &str, name: &str) -> Result<()> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Download("Download pool closed".to_string()))?;

        self.fetches.fetch_add(1, Ordering::Relaxed);
        let part = self.dir.join(format!("{}{}", name, PART_SUFFIX));
        let target = self.dir.join(name);
        info!("Downloading {} -> {}", url, target.display());

        match self.fetch_to(url, &part).await {
            Ok(bytes) => {
                tokio::fs::rename(&part, &target).await.map_err(|e| {
                    Error::Download(format!("Failed to move {} into place: {}", name, e))
                })?;
                info!("Downloaded {} ({} bytes)", name, bytes);
                Ok(())
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove {}: {}", part.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }

    /// Stream the response body into `part`, returning the byte count
    async fn fetch_to(&self, url: &str, part: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Download(format!("GET {}: {}", url, e)))?;

        let expected = response.content_length();
        let io_err = |e: std::io::Error| Error::Download(format!("{}: {}", part.display(), e));

        let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::Download(format!("Reading body of {}: {}", url, e)))?
        {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(Error::Download(format!(
                    "Truncated body from {}: {} of {} bytes",
                    url, written, expected
                )));
            }
        }

        Ok(written)
    }
}

/// File names must stay inside the episodes directory
fn validate_file_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.ends_with(PART_SUFFIX);
    if bad {
        return Err(Error::BadRequest(format!("Invalid episode file name: {:?}", name)));
    }
    Ok(())
}

fn remove_partial_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_part = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PART_SUFFIX));
        if is_part {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed stale partial download {}", path.display()),
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}
