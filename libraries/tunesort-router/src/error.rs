//! Error types for the router

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Transcoding error: {0}")]
    Transcode(String),

    #[error("Failed to move {from:?} to {to:?}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete {path:?}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove folder {path:?}: {source}")]
    FolderRemoval {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("Watcher error: {0}")]
    Watch(String),
}

impl From<notify::Error> for RouterError {
    fn from(err: notify::Error) -> Self {
        RouterError::Watch(err.to_string())
    }
}
