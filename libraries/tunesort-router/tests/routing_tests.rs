//! End-to-end routing scenarios against a temporary folder layout

mod common;

use common::{entries, write_mp3, FakeEncoder, Layout};
use std::sync::Arc;
use tunesort_router::{Destination, RouteOutcome, RoutingDecision};

#[tokio::test]
async fn test_flac_is_transcoded_then_parked() {
    let layout = Layout::new();
    let encoder = Arc::new(FakeEncoder::default());
    let router = layout.router(Arc::clone(&encoder));

    let flac = layout.drop_file("album/track.flac", b"fLaC");
    let album = flac.parent().unwrap().to_path_buf();

    let outcome = router.route(&flac).await;

    assert_eq!(
        outcome,
        RouteOutcome::Moved {
            destination: Destination::Transcoded,
            path: layout.destinations.transcoded.join("track.flac"),
        }
    );
    assert_eq!(encoder.calls(), 1);
    assert_eq!(
        entries(&layout.destinations.transcoded),
        vec!["track.flac".to_string(), "track.mp3".to_string()]
    );
    assert!(!flac.exists());
    assert!(router.processed().contains(&flac).await);
    assert!(router.registry().contains(&album).await);
}

#[tokio::test]
async fn test_cover_art_is_deleted() {
    let layout = Layout::new();
    let router = layout.router(Arc::new(FakeEncoder::default()));

    let cover = layout.drop_file("cover.jpg", b"jpeg");
    let outcome = router.route(&cover).await;

    assert_eq!(outcome, RouteOutcome::Deleted(cover.clone()));
    assert!(!cover.exists());
    assert!(
        router
            .registry()
            .contains(&layout.destinations.watch_root)
            .await
    );
}

#[tokio::test]
async fn test_playlist_extension_is_case_insensitive() {
    let layout = Layout::new();
    let router = layout.router(Arc::new(FakeEncoder::default()));

    let playlist = layout.drop_file("album/Mix.M3U", b"#EXTM3U");
    assert_eq!(router.route(&playlist).await, RouteOutcome::Deleted(playlist.clone()));
    assert!(!playlist.exists());
}

#[tokio::test]
async fn test_failed_transcode_leaves_file_in_place() {
    let layout = Layout::new();
    let encoder = Arc::new(FakeEncoder::failing());
    let router = layout.router(Arc::clone(&encoder));

    let flac = layout.drop_file("album/track.flac", b"fLaC");
    let outcome = router.route(&flac).await;

    assert!(matches!(outcome, RouteOutcome::Failed(_)));
    assert!(flac.exists());
    assert!(!router.processed().contains(&flac).await);
    assert!(entries(&layout.destinations.transcoded).is_empty());

    // A later event for the same file tries again
    router.route(&flac).await;
    assert_eq!(encoder.calls(), 2);
}

#[tokio::test]
async fn test_tagged_mp3_goes_to_library() {
    let layout = Layout::new();
    let router = layout.router(Arc::new(FakeEncoder::default()));

    let path = layout.destinations.watch_root.join("tagged.mp3");
    write_mp3(&path, Some("Test Artist"));

    assert_eq!(
        router.decide(&path).await,
        RoutingDecision::MoveTo(Destination::Library)
    );
    assert_eq!(
        router.route(&path).await,
        RouteOutcome::Moved {
            destination: Destination::Library,
            path: layout.destinations.library.join("tagged.mp3"),
        }
    );
}

#[tokio::test]
async fn test_untagged_mp3_goes_to_no_artist() {
    let layout = Layout::new();
    let router = layout.router(Arc::new(FakeEncoder::default()));

    let path = layout.destinations.watch_root.join("untagged.mp3");
    write_mp3(&path, None);

    assert_eq!(
        router.route(&path).await,
        RouteOutcome::Moved {
            destination: Destination::NoArtist,
            path: layout.destinations.no_artist.join("untagged.mp3"),
        }
    );
    assert!(entries(&layout.destinations.library).is_empty());
}

#[tokio::test]
async fn test_unparseable_audio_goes_to_library() {
    let layout = Layout::new();
    let router = layout.router(Arc::new(FakeEncoder::default()));

    let path = layout.drop_file("garbage.ogg", b"definitely not an ogg stream");

    assert_eq!(
        router.route(&path).await,
        RouteOutcome::Moved {
            destination: Destination::Library,
            path: layout.destinations.library.join("garbage.ogg"),
        }
    );
}

#[tokio::test]
async fn test_name_conflict_in_library_gets_suffix() {
    let layout = Layout::new();
    let router = layout.router(Arc::new(FakeEncoder::default()));

    std::fs::create_dir_all(&layout.destinations.library).unwrap();
    std::fs::write(layout.destinations.library.join("song.mp3"), b"existing").unwrap();

    let path = layout.destinations.watch_root.join("song.mp3");
    write_mp3(&path, Some("Test Artist"));

    assert_eq!(
        router.route(&path).await,
        RouteOutcome::Moved {
            destination: Destination::Library,
            path: layout.destinations.library.join("song-1.mp3"),
        }
    );
    assert_eq!(
        std::fs::read(layout.destinations.library.join("song.mp3")).unwrap(),
        b"existing"
    );
}

#[tokio::test]
async fn test_concurrent_events_transcode_once() {
    let layout = Layout::new();
    let encoder = Arc::new(FakeEncoder::default());
    let router = layout.router(Arc::clone(&encoder));

    let flac = layout.drop_file("album/track.flac", b"fLaC");

    let first = {
        let router = router.clone();
        let flac = flac.clone();
        tokio::spawn(async move { router.route(&flac).await })
    };
    let second = {
        let router = router.clone();
        let flac = flac.clone();
        tokio::spawn(async move { router.route(&flac).await })
    };

    let _ = first.await.unwrap();
    let _ = second.await.unwrap();

    assert_eq!(encoder.calls(), 1);
    assert_eq!(router.stats().snapshot().transcoded, 1);
    assert!(layout.destinations.transcoded.join("track.mp3").exists());
}
