//! Filesystem watcher and the watch loop
//!
//! The watcher turns notify events into [`WatchEvent`]s and pushes them into
//! a channel. The [`WatchLoop`] drains that channel, spawns one routing task
//! per file and sweeps idle folders on a fixed interval. Sweeps run on their
//! own task, at most one at a time, so event intake never waits on them.
//!
//! # Platform Support
//!
//! - Windows: `ReadDirectoryChangesW`
//! - macOS: `FSEvents`
//! - Linux: `inotify`

use crate::{reaper::IdleFolderReaper, routing::Router, Result, RouteOutcome, StatsSnapshot};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Default debounce duration in milliseconds
const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Default capacity of the event channel
const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// A file or folder appeared under the watch root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub is_directory: bool,
}

impl WatchEvent {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
        }
    }
}

/// Configuration for the folder watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for filesystem events
    pub debounce_duration: Duration,
    /// Bound of the channel between the watcher thread and the loop
    pub channel_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Recursive watch on the download root
///
/// Dropping the watcher stops event delivery and closes the channel.
pub struct FolderWatcher {
    root: PathBuf,
    // The debouncer owns the watcher, so we need to keep it alive
    #[allow(dead_code)]
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl std::fmt::Debug for FolderWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderWatcher")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl FolderWatcher {
    /// Start watching `root` recursively
    pub fn start(root: &Path, config: &WatcherConfig) -> Result<(Self, mpsc::Receiver<WatchEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);

        let mut debouncer = new_debouncer(
            config.debounce_duration,
            None, // No tick rate
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        for watch_event in convert_event(&event.event) {
                            if event_tx.blocking_send(watch_event).is_err() {
                                debug!("Event receiver dropped, discarding events");
                                return;
                            }
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        error!("Watcher error: {:?}", error);
                    }
                }
            },
        )?;

        debouncer.watch(root, RecursiveMode::Recursive)?;

        info!("Started watching: {:?}", root);
        Ok((
            Self {
                root: root.to_path_buf(),
                debouncer,
            },
            event_rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stop(self) {
        info!("Stopped watching: {:?}", self.root);
    }
}

/// Convert a notify event into creation notifications
///
/// Files moved in from outside the watched tree arrive as a rename with
/// only a target path; those count as creations too.
fn convert_event(event: &Event) -> Vec<WatchEvent> {
    match &event.kind {
        EventKind::Create(CreateKind::Folder) => event
            .paths
            .iter()
            .map(|p| WatchEvent::directory(p.clone()))
            .collect(),
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .map(|p| WatchEvent {
                path: p.clone(),
                is_directory: p.is_dir(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Owns the event-driven routing path and the periodic reaper
#[derive(Debug)]
pub struct WatchLoop {
    router: Router,
    reaper: IdleFolderReaper,
    sweep_interval: Duration,
    tasks: JoinSet<RouteOutcome>,
    sweeps: JoinSet<usize>,
}

impl WatchLoop {
    pub fn new(router: Router, reaper: IdleFolderReaper, sweep_interval: Duration) -> Self {
        Self {
            router,
            reaper,
            sweep_interval,
            tasks: JoinSet::new(),
            sweeps: JoinSet::new(),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Spawn routing for one event. Returns `false` when the event is ignored.
    pub fn dispatch(&mut self, event: WatchEvent) -> bool {
        if event.is_directory {
            debug!("Directory created: {:?}", event.path);
            return false;
        }

        if self.router.destinations().is_destination_path(&event.path) {
            debug!("Ignoring event inside a destination folder: {:?}", event.path);
            return false;
        }

        let router = self.router.clone();
        self.tasks
            .spawn(async move { router.route(&event.path).await });
        true
    }

    /// Start a sweep unless the previous one is still running
    fn start_sweep(&mut self) -> bool {
        if !self.sweeps.is_empty() {
            debug!("Previous sweep still running, skipping this tick");
            return false;
        }

        let reaper = self.reaper.clone();
        self.sweeps.spawn(async move { reaper.sweep().await });
        true
    }

    /// Run until `shutdown` resolves or the event source closes
    ///
    /// Routing tasks still running at that point are aborted; nothing waits
    /// for an in-flight transcode to finish.
    pub async fn run<F>(mut self, mut events: mpsc::Receiver<WatchEvent>, shutdown: F) -> StatsSnapshot
    where
        F: Future<Output = ()>,
    {
        let mut sweep_interval = tokio::time::interval(self.sweep_interval);
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping watch loop");
                    break;
                }
                // Process incoming events
                event = events.recv() => match event {
                    Some(event) => {
                        self.dispatch(event);
                    }
                    None => {
                        info!("Event source closed, stopping watch loop");
                        break;
                    }
                },
                // Collect finished routing tasks
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Routing task failed: {}", e);
                    }
                }
                // Periodic idle-folder sweep
                _ = sweep_interval.tick() => {
                    self.start_sweep();
                }
                Some(swept) = self.sweeps.join_next(), if !self.sweeps.is_empty() => {
                    match swept {
                        Ok(removed) => {
                            if removed > 0 {
                                info!("Removed {} inactive folder(s)", removed);
                            }
                            self.router.stats().record_reaped(removed);
                        }
                        Err(e) => error!("Sweep task failed: {}", e),
                    }
                }
            }
        }

        if !self.tasks.is_empty() {
            warn!("Abandoning {} in-flight routing task(s)", self.tasks.len());
        }
        self.tasks.shutdown().await;
        self.sweeps.shutdown().await;

        self.router.stats().snapshot()
    }
}
