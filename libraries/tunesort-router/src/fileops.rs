//! Moving and deleting routed files

use crate::{Result, RouterError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Highest counter tried when resolving a name collision
const MAX_CONFLICT_ATTEMPTS: u32 = 1000;

/// Move a file into `dest_dir`, keeping its base name
///
/// Creates `dest_dir` when needed and appends `-1`, `-2`, ... to the stem if
/// the name is taken. Falls back to copy + remove when a rename is not
/// possible (different filesystems). Returns the final path.
pub async fn move_file(source_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let file_name = source_path
        .file_name()
        .ok_or_else(|| RouterError::InvalidPath(format!("{:?} has no file name", source_path)))?;

    let move_error = |source: std::io::Error, to: &Path| RouterError::Move {
        from: source_path.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| move_error(e, dest_dir))?;

    let mut dest_path = dest_dir.join(file_name);
    if fs::try_exists(&dest_path).await.unwrap_or(false) {
        dest_path = resolve_filename_conflict(dest_dir, Path::new(file_name)).await?;
    }

    match fs::rename(source_path, &dest_path).await {
        Ok(()) => {}
        // Missing source is not worth a copy attempt
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(
                "File {:?} was not found when attempting to move.",
                source_path
            );
            return Err(move_error(e, &dest_path));
        }
        Err(e) => {
            debug!(
                "Rename of {:?} failed ({}), falling back to copy",
                source_path, e
            );
            fs::copy(source_path, &dest_path)
                .await
                .map_err(|e| move_error(e, &dest_path))?;
            fs::remove_file(source_path)
                .await
                .map_err(|e| move_error(e, &dest_path))?;
        }
    }

    info!("Moved file from {:?} to {:?}", source_path, dest_path);
    Ok(dest_path)
}

/// Delete a single file
pub async fn delete_file(path: &Path) -> Result<()> {
    fs::remove_file(path)
        .await
        .map_err(|source| RouterError::Delete {
            path: path.to_path_buf(),
            source,
        })?;

    info!("Deleted file {:?}", path.file_name().unwrap_or_default());
    Ok(())
}

/// Resolve filename conflict by appending a counter
///
/// "song.mp3" -> "song-1.mp3" -> "song-2.mp3" etc.
async fn resolve_filename_conflict(dest_dir: &Path, original: &Path) -> Result<PathBuf> {
    let stem = original
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| RouterError::InvalidPath(format!("Invalid filename {:?}", original)))?;
    let extension = original
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    for counter in 1..MAX_CONFLICT_ATTEMPTS {
        let new_filename = if extension.is_empty() {
            format!("{}-{}", stem, counter)
        } else {
            format!("{}-{}.{}", stem, counter, extension)
        };

        let new_path = dest_dir.join(&new_filename);
        if !fs::try_exists(&new_path).await.unwrap_or(false) {
            return Ok(new_path);
        }
    }

    Err(RouterError::InvalidPath(format!(
        "Could not resolve filename conflict for {:?} after {} attempts",
        original, MAX_CONFLICT_ATTEMPTS
    )))
}
