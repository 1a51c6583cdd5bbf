//! Single-flight cache fill.
//!
//! Per key the state is one of:
//! - not started: no pending record and no artifact on disk
//! - in progress: a pending record holding every waiter
//! - done: the artifact exists on disk (the record is gone)
//!
//! The check-pending / check-disk / mark-pending sequence runs under one lock,
//! so at most one build per key is ever in flight.

use async_trait::async_trait;
use futures_util::FutureExt;
use log::{debug, error};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{oneshot, Mutex};

use crate::thumbnail_types::{CacheKey, CacheLayout, ThumbnailError, ThumbnailResult};

/// Outcome shared by every party waiting on one build.
pub type BuildOutcome = Result<PathBuf, Arc<ThumbnailError>>;

/// Produces the artifact for a key at the given path.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync + 'static {
    async fn build(&self, key: &CacheKey, artifact_path: &Path) -> ThumbnailResult<PathBuf>;
}

pub struct CacheCoordinator<B> {
    layout: CacheLayout,
    builder: B,
    pending: Mutex<HashMap<CacheKey, Vec<oneshot::Sender<BuildOutcome>>>>,
}

impl<B: ArtifactBuilder> CacheCoordinator<B> {
    pub fn new(layout: CacheLayout, builder: B) -> Arc<Self> {
        Arc::new(Self {
            layout,
            builder,
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Returns the artifact for `key`, building it at most once across concurrent callers.
    ///
    /// The build runs on its own task, so a caller that goes away mid-build does
    /// not strand the other waiters.
    pub async fn acquire(self: &Arc<Self>, key: CacheKey) -> BuildOutcome {
        let artifact_path = self.layout.artifact_path(&key);

        let receiver = {
            let mut pending = self.pending.lock().await;

            if let Some(waiters) = pending.get_mut(&key) {
                debug!("Joining in-flight build for {}", key);
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                rx
            } else if is_artifact(&artifact_path).await {
                debug!("Cache hit for {}", key);
                return Ok(artifact_path);
            } else {
                debug!("Cache miss for {}, generating thumbnail", key);
                let (tx, rx) = oneshot::channel();
                pending.insert(key.clone(), vec![tx]);
                self.spawn_build(key, artifact_path);
                rx
            }
        };

        receiver
            .await
            .unwrap_or_else(|_| Err(Arc::new(ThumbnailError::BuildAborted)))
    }

    fn spawn_build(self: &Arc<Self>, key: CacheKey, artifact_path: PathBuf) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let built = AssertUnwindSafe(coordinator.builder.build(&key, &artifact_path))
                .catch_unwind()
                .await;

            let outcome = match built {
                Ok(Ok(path)) => Ok(path),
                Ok(Err(e)) => Err(Arc::new(e)),
                Err(_) => {
                    error!("Build for {} panicked", key);
                    Err(Arc::new(ThumbnailError::BuildAborted))
                }
            };

            coordinator.publish(&key, outcome).await;
        });
    }

    /// Removes the key outright and hands the same outcome to every waiter.
    async fn publish(&self, key: &CacheKey, outcome: BuildOutcome) {
        let waiters = self.pending.lock().await.remove(key).unwrap_or_default();
        debug!(
            "Build for {} finished (ok: {}), notifying {} waiter(s)",
            key,
            outcome.is_ok(),
            waiters.len()
        );
        for waiter in waiters {
            // A waiter whose request was dropped has nobody left to tell.
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Number of keys with a build in flight.
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }
}

async fn is_artifact(path: &Path) -> bool {
    matches!(fs::metadata(path).await, Ok(metadata) if metadata.is_file())
}
