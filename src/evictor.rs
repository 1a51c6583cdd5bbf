use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;

/// Deletes cached artifacts older than a maximum age.
#[derive(Debug, Clone)]
pub struct Evictor {
    cache_dir: PathBuf,
}

impl Evictor {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Removes every regular file under the cache root modified before `now - max_age`.
    ///
    /// Each file is handled on its own: a failed stat or delete is logged and the
    /// sweep moves on. Returns the paths actually deleted.
    pub async fn sweep(&self, now: SystemTime, max_age: Duration) -> Vec<PathBuf> {
        let cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut deleted = Vec::new();

        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Failed to list cache directory {}: {}",
                    self.cache_dir.display(),
                    e
                );
                return deleted;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopped listing cache directory early: {}", e);
                    break;
                }
            };

            let path = entry.path();
            if is_expired(&path, cutoff).await {
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!("Evicted cache file: {}", path.display());
                        deleted.push(path);
                    }
                    Err(e) => warn!("Failed to remove cache file {}: {}", path.display(), e),
                }
            }
        }

        info!(
            "Clean job: {} files have been deleted from {}",
            deleted.len(),
            self.cache_dir.display()
        );
        deleted
    }
}

async fn is_expired(path: &Path, cutoff: SystemTime) -> bool {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("Failed to stat cache file {}: {}", path.display(), e);
            return false;
        }
    };
    if !metadata.is_file() {
        return false;
    }
    match metadata.modified() {
        Ok(modified) => modified < cutoff,
        Err(e) => {
            warn!("No modification time for {}: {}", path.display(), e);
            false
        }
    }
}
