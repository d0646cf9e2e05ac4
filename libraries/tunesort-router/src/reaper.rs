//! Idle folder removal
//!
//! Download clients leave one folder per release behind once the router has
//! moved every file out. The reaper removes those folders after they have
//! been quiet for the configured timeout.
//!
//! Removal is best-effort, not transactional: emptiness is re-checked right
//! before the delete, but a file landing in the folder between that check and
//! `remove_dir` makes the delete fail, and the entry simply survives until
//! the next sweep.

use crate::{registry::ActivityRegistry, Result, RouterError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default idle time before a folder is eligible for removal
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default period between two sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Sweep `registry` now. Returns the number of folders removed.
pub async fn sweep(registry: &ActivityRegistry, timeout: Duration, excluded: &Path) -> usize {
    sweep_at(registry, timeout, excluded, Instant::now()).await
}

/// Sweep `registry` as if the current time were `now`
pub async fn sweep_at(
    registry: &ActivityRegistry,
    timeout: Duration,
    excluded: &Path,
    now: Instant,
) -> usize {
    let candidates: Vec<(PathBuf, Instant)> = registry
        .snapshot()
        .await
        .into_iter()
        .filter(|(path, _)| path != excluded)
        .filter(|(_, last)| now.saturating_duration_since(*last) > timeout)
        .collect();

    let mut removed = 0;
    for (folder, seen) in candidates {
        match remove_if_empty(&folder).await {
            Ok(true) => {
                if registry.remove_if_unchanged(&folder, seen).await {
                    info!("Deleted inactive folder {:?}", folder);
                    removed += 1;
                } else {
                    debug!("Folder {:?} saw activity during removal", folder);
                }
            }
            Ok(false) => {
                debug!("Inactive folder {:?} is not empty, keeping it", folder);
            }
            Err(e) => {
                warn!("{}", e);
            }
        }
    }

    removed
}

/// Remove `folder` if it holds no entries
///
/// `Ok(false)` means the folder still has content. A folder that is already
/// gone counts as removed.
async fn remove_if_empty(folder: &Path) -> Result<bool> {
    let removal_error = |source: std::io::Error| RouterError::FolderRemoval {
        path: folder.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(removal_error(e)),
    };

    if entries.next_entry().await.map_err(removal_error)?.is_some() {
        return Ok(false);
    }

    match tokio::fs::remove_dir(folder).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
        Err(e) => Err(removal_error(e)),
    }
}

/// Periodic sweeper bound to one registry and one protected root
#[derive(Debug, Clone)]
pub struct IdleFolderReaper {
    registry: Arc<ActivityRegistry>,
    timeout: Duration,
    excluded: PathBuf,
}

impl IdleFolderReaper {
    pub fn new(registry: Arc<ActivityRegistry>, excluded: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_IDLE_TIMEOUT,
            excluded: excluded.into(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn sweep(&self) -> usize {
        sweep(&self.registry, self.timeout, &self.excluded).await
    }

    pub async fn sweep_at(&self, now: Instant) -> usize {
        sweep_at(&self.registry, self.timeout, &self.excluded, now).await
    }
}
