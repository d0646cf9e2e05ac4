//! Shared fixtures for router integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tunesort_router::{
    registry::{ActivityRegistry, ProcessedSet},
    transcode::{Encoder, TranscodeGate},
    Destinations, Result, Router, RouterError,
};

static INIT: Once = Once::new();

pub fn init_tracing() {
    // Initialize logging once
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Encoder that writes a placeholder output file, or fails on demand
#[derive(Default)]
pub struct FakeEncoder {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl FakeEncoder {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode(&self, _input: &Path, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RouterError::Transcode("simulated encoder failure".to_string()));
        }
        tokio::fs::write(output, b"fake mp3").await?;
        Ok(())
    }
}

/// Temporary folder layout: watch root plus the three destinations
pub struct Layout {
    pub temp: TempDir,
    pub destinations: Destinations,
}

impl Layout {
    pub fn new() -> Self {
        init_tracing();
        let temp = TempDir::new().expect("Failed to create temp dir");
        let destinations = Destinations {
            watch_root: temp.path().join("watch"),
            library: temp.path().join("library"),
            no_artist: temp.path().join("no_artist"),
            transcoded: temp.path().join("transcoded"),
        };
        fs::create_dir_all(&destinations.watch_root).expect("Failed to create watch root");
        Self { temp, destinations }
    }

    /// Write a file below the watch root, creating parent folders
    pub fn drop_file(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.destinations.watch_root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(&path, contents).expect("Failed to write test file");
        path
    }

    pub fn router(&self, encoder: Arc<FakeEncoder>) -> Router {
        Router::new(
            self.destinations.clone(),
            TranscodeGate::new(encoder),
            Arc::new(ActivityRegistry::new()),
            Arc::new(ProcessedSet::new()),
        )
    }
}

/// Bytes of a minimal MP3: optional ID3v2.3 tag with an artist, then
/// a few silent MPEG-1 Layer III frames
pub fn minimal_mp3(artist: Option<&str>) -> Vec<u8> {
    let mut data = Vec::new();

    if let Some(artist) = artist {
        let frames = create_text_frame(b"TPE1", artist);
        let size = frames.len() as u32;

        // ID3v2.3 header (10 bytes)
        data.extend_from_slice(b"ID3");
        data.extend_from_slice(&[0x03, 0x00]); // Version 2.3.0
        data.push(0x00); // Flags
        data.extend_from_slice(&[
            ((size >> 21) & 0x7F) as u8,
            ((size >> 14) & 0x7F) as u8,
            ((size >> 7) & 0x7F) as u8,
            (size & 0x7F) as u8,
        ]);
        data.extend_from_slice(&frames);
    }

    // MPEG Version 1, Layer III, 128 kbps, 44.1 kHz: 417 byte frames
    for _ in 0..4 {
        data.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        data.extend_from_slice(&[0x00; 413]);
    }

    data
}

/// Create a single ID3v2.3 text frame
fn create_text_frame(frame_id: &[u8; 4], text: &str) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(frame_id);

    let text_bytes = text.as_bytes();
    let size = (text_bytes.len() + 1) as u32; // +1 for encoding byte
    frame.extend_from_slice(&size.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00]); // Flags
    frame.push(0x00); // ISO-8859-1
    frame.extend_from_slice(text_bytes);

    frame
}

pub fn write_mp3(path: &Path, artist: Option<&str>) {
    let mut file = fs::File::create(path).expect("Failed to create test file");
    file.write_all(&minimal_mp3(artist))
        .expect("Failed to write mp3");
    file.flush().expect("Failed to flush");
}

/// Names of the entries directly inside `dir`, sorted
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(read) => read
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}
