//! Tunesort Router
//!
//! This crate sorts freshly downloaded music out of a watched folder.
//!
//! # Features
//!
//! - Cover art and playlists are deleted on arrival
//! - Lossless files are transcoded once, then parked in a dedicated folder
//! - Other audio is filed into the library, or a holding folder when the
//!   artist tag is missing
//! - Download folders that went quiet are removed once empty
//!
//! # Architecture
//!
//! - `classify`: Artist-tag probe (`lofty`)
//! - `transcode`: Deduplicating gate in front of an encoder (ffmpeg)
//! - `registry`: Shared folder activity map and transcoded-file set
//! - `reaper`: Idle folder removal
//! - `routing`: Per-file decision and move/delete
//! - `fileops`: Move and delete primitives
//! - `watcher`: notify-based watcher and the watch loop tying it together

mod error;
mod types;

// Core modules
pub mod classify;
pub mod fileops;
pub mod reaper;
pub mod registry;
pub mod routing;
pub mod transcode;
pub mod watcher;

pub use error::RouterError;
pub use routing::Router;
pub use types::*;

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, RouterError>;
