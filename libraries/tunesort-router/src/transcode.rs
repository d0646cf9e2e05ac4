//! Deduplicated lossless-to-compressed transcoding
//!
//! The gate decides *whether* a file gets encoded. Encoding itself is behind
//! the [`Encoder`] trait; [`FfmpegEncoder`] shells out to ffmpeg.

use crate::{
    registry::{Claim, ProcessedSet},
    Result, RouterError,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Default target format for transcoded files
pub const DEFAULT_TARGET_EXTENSION: &str = "mp3";

/// Number of ffmpeg stderr lines kept in a failure reason
const STDERR_TAIL_LINES: usize = 5;

/// Result of a single gate invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    /// Encoded successfully into the contained output path
    Converted(PathBuf),

    SkippedAlreadyProcessed,

    SkippedMissingInput,

    /// Another event is encoding the same input right now
    SkippedInProgress,

    Failed(String),
}

/// External encoding capability: one lossless input to one compressed output
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Encoder that runs the ffmpeg executable
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    bitrate: String,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, bitrate: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            bitrate: bitrate.into(),
        }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-nostdin")
            .arg("-i")
            .arg(input)
            .arg("-y") // Overwrite output file
            .arg("-vn") // Drop embedded cover art
            .arg("-b:a")
            .arg(&self.bitrate)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, input: &Path, output: &Path) -> Result<()> {
        let result = self.command(input, output).output().await.map_err(|e| {
            RouterError::Transcode(format!(
                "Failed to start {:?}: {}",
                self.ffmpeg_path, e
            ))
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(RouterError::Transcode(format!(
                "FFmpeg exited with {}: {}",
                result.status,
                stderr_tail(&stderr)
            )));
        }

        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

/// Output file for `input` inside `output_dir`: same stem, target extension
///
/// Only the base name of the input is used, never its parent folders.
pub fn output_path_for(input: &Path, output_dir: &Path, extension: &str) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .ok_or_else(|| RouterError::InvalidPath(format!("{:?} has no file name", input)))?;

    let mut file_name = stem.to_os_string();
    file_name.push(".");
    file_name.push(extension.trim_start_matches('.'));

    Ok(output_dir.join(file_name))
}

/// Guards the encoder against duplicate and stale events
#[derive(Clone)]
pub struct TranscodeGate {
    encoder: Arc<dyn Encoder>,
    target_extension: String,
}

impl std::fmt::Debug for TranscodeGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeGate")
            .field("target_extension", &self.target_extension)
            .finish_non_exhaustive()
    }
}

impl TranscodeGate {
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self {
            encoder,
            target_extension: DEFAULT_TARGET_EXTENSION.to_string(),
        }
    }

    pub fn with_target_extension(mut self, extension: impl Into<String>) -> Self {
        self.target_extension = extension.into();
        self
    }

    pub fn target_extension(&self) -> &str {
        &self.target_extension
    }

    /// Transcode `input` into `output_dir` unless it was already handled
    ///
    /// `processed` only gains `input` after the encoder reported success.
    #[tracing::instrument(skip_all, fields(input = %input.display()))]
    pub async fn transcode(
        &self,
        input: &Path,
        processed: &ProcessedSet,
        output_dir: &Path,
    ) -> TranscodeOutcome {
        match processed.claim(input).await {
            Claim::Claimed => {}
            Claim::AlreadyProcessed => {
                debug!("Already transcoded, skipping");
                return TranscodeOutcome::SkippedAlreadyProcessed;
            }
            Claim::InProgress => {
                debug!("Transcode already in progress, skipping");
                return TranscodeOutcome::SkippedInProgress;
            }
        }

        let outcome = self.run(input, output_dir).await;
        let succeeded = matches!(outcome, TranscodeOutcome::Converted(_));
        processed.release(input, succeeded).await;
        outcome
    }

    async fn run(&self, input: &Path, output_dir: &Path) -> TranscodeOutcome {
        if !matches!(tokio::fs::try_exists(input).await, Ok(true)) {
            warn!("The file {:?} does not exist. Skipping conversion.", input);
            return TranscodeOutcome::SkippedMissingInput;
        }

        let output = match output_path_for(input, output_dir, &self.target_extension) {
            Ok(output) => output,
            Err(e) => return TranscodeOutcome::Failed(e.to_string()),
        };

        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            error!("Cannot create output folder {:?}: {}", output_dir, e);
            return TranscodeOutcome::Failed(e.to_string());
        }

        info!(
            "Starting conversion of {:?} to {}",
            input.file_name().unwrap_or_default(),
            self.target_extension
        );

        match self.encoder.encode(input, &output).await {
            Ok(()) => {
                info!("Successfully converted to {:?}", output);
                TranscodeOutcome::Converted(output)
            }
            Err(e) => {
                error!("Error converting {:?}: {}", input, e);
                // Partial output would otherwise look like a finished file
                if let Err(cleanup) = tokio::fs::remove_file(&output).await {
                    debug!("No partial output to clean up at {:?}: {}", output, cleanup);
                }
                TranscodeOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingEncoder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Encoder for CountingEncoder {
        async fn encode(&self, _input: &Path, output: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RouterError::Transcode("simulated failure".to_string()));
            }
            tokio::fs::write(output, b"encoded").await?;
            Ok(())
        }
    }

    #[test]
    fn test_output_path_uses_base_name_only() {
        let output = output_path_for(
            Path::new("/watch/album/track.flac"),
            Path::new("/transcoded"),
            "mp3",
        )
        .unwrap();
        assert_eq!(output, PathBuf::from("/transcoded/track.mp3"));

        let dotted =
            output_path_for(Path::new("/w/01. Intro.flac"), Path::new("/t"), ".mp3").unwrap();
        assert_eq!(dotted, PathBuf::from("/t/01. Intro.mp3"));
    }

    #[test]
    fn test_stderr_tail() {
        let stderr = "a\nb\n\nc\nd\ne\nf\ng\n";
        assert_eq!(stderr_tail(stderr), "c | d | e | f | g");
        assert_eq!(stderr_tail(""), "");
    }

    #[tokio::test]
    async fn test_converted_then_already_processed() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("track.flac");
        let out_dir = temp.path().join("out");
        tokio::fs::write(&input, b"flac").await.unwrap();

        let encoder = Arc::new(CountingEncoder::default());
        let gate = TranscodeGate::new(encoder.clone());
        let processed = ProcessedSet::new();

        let first = gate.transcode(&input, &processed, &out_dir).await;
        assert_eq!(first, TranscodeOutcome::Converted(out_dir.join("track.mp3")));
        assert!(processed.contains(&input).await);

        let second = gate.transcode(&input, &processed, &out_dir).await;
        assert_eq!(second, TranscodeOutcome::SkippedAlreadyProcessed);
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_input() {
        let temp = TempDir::new().unwrap();
        let encoder = Arc::new(CountingEncoder::default());
        let gate = TranscodeGate::new(encoder.clone());
        let processed = ProcessedSet::new();
        let input = temp.path().join("gone.flac");

        let outcome = gate.transcode(&input, &processed, temp.path()).await;
        assert_eq!(outcome, TranscodeOutcome::SkippedMissingInput);
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
        assert!(!processed.contains(&input).await);
    }

    #[tokio::test]
    async fn test_failure_is_not_marked_processed() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("input.flac");
        tokio::fs::write(&input, b"flac").await.unwrap();

        let encoder = Arc::new(CountingEncoder {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let gate = TranscodeGate::new(encoder.clone());
        let processed = ProcessedSet::new();

        let outcome = gate.transcode(&input, &processed, temp.path()).await;
        assert!(matches!(outcome, TranscodeOutcome::Failed(_)));
        assert!(!processed.contains(&input).await);

        // A later duplicate event retries the conversion
        let retry = gate.transcode(&input, &processed, temp.path()).await;
        assert!(matches!(retry, TranscodeOutcome::Failed(_)));
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ffmpeg_missing_binary_fails() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("input.flac");
        tokio::fs::write(&input, b"flac").await.unwrap();

        let encoder = FfmpegEncoder::new(temp.path().join("no-such-ffmpeg"), "320k");
        let result = encoder.encode(&input, &temp.path().join("input.mp3")).await;
        assert!(matches!(result, Err(RouterError::Transcode(_))));
    }
}
