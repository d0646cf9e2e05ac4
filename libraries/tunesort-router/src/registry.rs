//! Shared state: per-folder activity timestamps and the transcoded-file set
//!
//! Both structures are owned by the watch loop and handed to the router and
//! the reaper behind an `Arc`. Every lock is held only for a map operation,
//! never across filesystem or encoder work.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::Mutex;

/// Last observed file-creation time per folder
#[derive(Debug, Default)]
pub struct ActivityRegistry {
    folders: Mutex<HashMap<PathBuf, Instant>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity in `folder` now
    pub async fn touch(&self, folder: &Path) {
        self.touch_at(folder, Instant::now()).await;
    }

    /// Record activity in `folder` at a given instant (last writer wins)
    pub async fn touch_at(&self, folder: &Path, at: Instant) {
        let mut folders = self.folders.lock().await;
        folders.insert(folder.to_path_buf(), at);
    }

    pub async fn last_activity(&self, folder: &Path) -> Option<Instant> {
        self.folders.lock().await.get(folder).copied()
    }

    pub async fn contains(&self, folder: &Path) -> bool {
        self.folders.lock().await.contains_key(folder)
    }

    pub async fn len(&self) -> usize {
        self.folders.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.folders.lock().await.is_empty()
    }

    /// Copy of every entry, taken under a single lock
    pub async fn snapshot(&self) -> Vec<(PathBuf, Instant)> {
        let folders = self.folders.lock().await;
        folders
            .iter()
            .map(|(path, at)| (path.clone(), *at))
            .collect()
    }

    /// Drop an entry unless it was touched after `seen`
    ///
    /// Returns `true` when the entry was removed.
    pub async fn remove_if_unchanged(&self, folder: &Path, seen: Instant) -> bool {
        let mut folders = self.folders.lock().await;
        match folders.get(folder) {
            Some(at) if *at == seen => {
                folders.remove(folder);
                true
            }
            _ => false,
        }
    }
}

/// Input paths that were transcoded, plus the ones being transcoded right now
#[derive(Debug, Default)]
pub struct ProcessedSet {
    inner: Mutex<ProcessedState>,
}

#[derive(Debug, Default)]
struct ProcessedState {
    done: HashSet<PathBuf>,
    in_flight: HashSet<PathBuf>,
}

/// Result of trying to claim an input path for transcoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    AlreadyProcessed,
    InProgress,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, path: &Path) -> bool {
        self.inner.lock().await.done.contains(path)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.done.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.done.is_empty()
    }

    /// Mark `path` as in flight unless it is already done or in flight
    pub async fn claim(&self, path: &Path) -> Claim {
        let mut state = self.inner.lock().await;
        if state.done.contains(path) {
            Claim::AlreadyProcessed
        } else if !state.in_flight.insert(path.to_path_buf()) {
            Claim::InProgress
        } else {
            Claim::Claimed
        }
    }

    /// Finish a claim. Only a successful transcode lands in the done set.
    pub async fn release(&self, path: &Path, succeeded: bool) {
        let mut state = self.inner.lock().await;
        state.in_flight.remove(path);
        if succeeded {
            state.done.insert(path.to_path_buf());
        }
    }
}
