//! Artist-tag classification of incoming audio files

use crate::{Result, RouterError};
use lofty::{Accessor, Probe, TaggedFileExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the tag probe found out about a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtistStatus {
    HasArtist,

    /// Tags are readable but carry no (or an empty) artist
    MissingArtist,

    /// The container could not be parsed as tagged audio
    Unreadable,
}

/// Reads the artist field from a file's tag container
///
/// Returns `Ok(None)` when the field is absent and an error when the
/// container itself cannot be parsed.
pub trait TagReader: Send + Sync {
    fn read_artist(&self, path: &Path) -> Result<Option<String>>;
}

/// Tag reader backed by `lofty`
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read_artist(&self, path: &Path) -> Result<Option<String>> {
        let tagged_file = Probe::open(path)
            .map_err(|e| RouterError::Metadata(format!("Failed to open file: {}", e)))?
            .read()
            .map_err(|e| RouterError::Metadata(format!("Failed to read file: {}", e)))?;

        // Prefer the format's native tag, fall back to whatever is present
        let tag = tagged_file.primary_tag().or(tagged_file.first_tag());

        Ok(tag.and_then(|tag| tag.artist().map(|artist| artist.to_string())))
    }
}

/// Classifies files by the presence of an artist tag
#[derive(Clone)]
pub struct MetadataClassifier {
    reader: Arc<dyn TagReader>,
}

impl std::fmt::Debug for MetadataClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataClassifier").finish_non_exhaustive()
    }
}

impl Default for MetadataClassifier {
    fn default() -> Self {
        Self::new(Arc::new(LoftyTagReader))
    }
}

impl MetadataClassifier {
    pub fn new(reader: Arc<dyn TagReader>) -> Self {
        Self { reader }
    }

    /// Classify a file. Read-only; never fails.
    pub fn classify(&self, path: &Path) -> ArtistStatus {
        match self.reader.read_artist(path) {
            Ok(Some(artist)) if !artist.trim().is_empty() => {
                debug!("Artist {:?} found for {:?}", artist, path);
                ArtistStatus::HasArtist
            }
            Ok(_) => ArtistStatus::MissingArtist,
            Err(e) => {
                warn!(
                    "{:?} is not a compatible audio file, routing as normal audio: {}",
                    path, e
                );
                ArtistStatus::Unreadable
            }
        }
    }

    /// Classify on the blocking pool, tag probing does synchronous I/O
    pub async fn classify_blocking(&self, path: &Path) -> ArtistStatus {
        let classifier = self.clone();
        let owned = path.to_path_buf();

        match tokio::task::spawn_blocking(move || classifier.classify(&owned)).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Metadata probe for {:?} did not complete: {}", path, e);
                ArtistStatus::Unreadable
            }
        }
    }
}
