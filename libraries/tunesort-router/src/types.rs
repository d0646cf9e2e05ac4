//! Common types for the router

use crate::{Result, RouterError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Destination folder kinds a file can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Main music library
    Library,

    /// Holding folder for files without an artist tag
    NoArtist,

    /// Folder receiving lossless originals after transcoding
    Transcoded,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Library => write!(f, "library"),
            Destination::NoArtist => write!(f, "no-artist"),
            Destination::Transcoded => write!(f, "transcoded"),
        }
    }
}

/// The configured folders the router works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    /// Root of the watched download tree, never reaped
    pub watch_root: PathBuf,

    pub library: PathBuf,

    pub no_artist: PathBuf,

    /// Receives both the transcoded output and the lossless original
    pub transcoded: PathBuf,
}

impl Destinations {
    /// Resolve a destination kind to its configured folder
    pub fn folder(&self, destination: Destination) -> &Path {
        match destination {
            Destination::Library => &self.library,
            Destination::NoArtist => &self.no_artist,
            Destination::Transcoded => &self.transcoded,
        }
    }

    /// Resolve every folder to its absolute, symlink-free form
    ///
    /// Watcher backends report event paths in that form, so registry keys,
    /// the protected root and the destination filter must use it too. All
    /// four folders have to exist.
    pub async fn canonicalize(&self) -> Result<Self> {
        Ok(Self {
            watch_root: canonical(&self.watch_root).await?,
            library: canonical(&self.library).await?,
            no_artist: canonical(&self.no_artist).await?,
            transcoded: canonical(&self.transcoded).await?,
        })
    }

    /// Whether `path` lies inside one of the destination folders
    ///
    /// Events for such paths are the router's own moves when a destination
    /// is nested in the watch root.
    pub fn is_destination_path(&self, path: &Path) -> bool {
        [&self.library, &self.no_artist, &self.transcoded]
            .iter()
            .any(|folder| path.starts_with(folder))
    }
}

async fn canonical(path: &Path) -> Result<PathBuf> {
    tokio::fs::canonicalize(path)
        .await
        .map_err(|e| RouterError::InvalidPath(format!("Cannot resolve {:?}: {}", path, e)))
}

/// Extension sets that drive the first routing decision
///
/// Extensions are stored without the leading dot and compared
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRules {
    /// Extraneous files removed on sight (cover art, playlists)
    #[serde(default = "default_delete_extensions")]
    pub delete_extensions: Vec<String>,

    /// Lossless formats that get transcoded before placement
    #[serde(default = "default_lossless_extensions")]
    pub lossless_extensions: Vec<String>,
}

impl Default for ExtensionRules {
    fn default() -> Self {
        Self {
            delete_extensions: default_delete_extensions(),
            lossless_extensions: default_lossless_extensions(),
        }
    }
}

fn default_delete_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "m3u"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_lossless_extensions() -> Vec<String> {
    vec!["flac".to_string()]
}

impl ExtensionRules {
    pub fn is_deletable(&self, path: &Path) -> bool {
        extension_in(path, &self.delete_extensions)
    }

    pub fn is_lossless(&self, path: &Path) -> bool {
        extension_in(path, &self.lossless_extensions)
    }
}

/// Lowercased extension of a path, if it has one
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

fn extension_in(path: &Path, set: &[String]) -> bool {
    lowercase_extension(path)
        .map(|ext| {
            set.iter()
                .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        })
        .unwrap_or(false)
}

/// What an incoming file is, judged by its extension alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Cover art, playlists and other files that are deleted on sight
    Extraneous,

    /// Lossless audio that must be transcoded before placement
    Lossless,

    /// Anything else; its tags decide between library and no-artist
    Audio,
}

impl FileKind {
    pub fn for_path(path: &Path, rules: &ExtensionRules) -> Self {
        if rules.is_deletable(path) {
            FileKind::Extraneous
        } else if rules.is_lossless(path) {
            FileKind::Lossless
        } else {
            FileKind::Audio
        }
    }
}

/// Final decision for one file event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    Delete,
    MoveTo(Destination),
}

/// Why an event ended without moving or deleting anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The input file disappeared before it could be processed
    MissingInput,

    /// Another event for the same file is already transcoding it
    TranscodeInProgress,

    /// Dry-run mode, nothing was touched
    DryRun(RoutingDecision),
}

/// Terminal result of routing one file event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Deleted(PathBuf),

    Moved {
        destination: Destination,
        path: PathBuf,
    },

    Skipped(SkipReason),

    /// Transcode, move or delete failed; the message is already logged
    Failed(String),
}

/// Running counters for everything the daemon did
#[derive(Debug, Default)]
pub struct RouterStats {
    deleted: AtomicUsize,
    moved: AtomicUsize,
    transcoded: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    reaped: AtomicUsize,
}

/// Point-in-time copy of [`RouterStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub deleted: usize,
    pub moved: usize,
    pub transcoded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub reaped: usize,
}

impl RouterStats {
    pub fn record(&self, outcome: &RouteOutcome) {
        let counter = match outcome {
            RouteOutcome::Deleted(_) => &self.deleted,
            RouteOutcome::Moved { .. } => &self.moved,
            RouteOutcome::Skipped(_) => &self.skipped,
            RouteOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transcode(&self) {
        self.transcoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reaped(&self, count: usize) {
        self.reaped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            deleted: self.deleted.load(Ordering::Relaxed),
            moved: self.moved.load(Ordering::Relaxed),
            transcoded: self.transcoded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            reaped: self.reaped.load(Ordering::Relaxed),
        }
    }
}
