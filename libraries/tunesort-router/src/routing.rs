//! Per-file routing: classify, transcode if needed, then move or delete

use crate::{
    classify::{ArtistStatus, MetadataClassifier},
    fileops,
    registry::{ActivityRegistry, ProcessedSet},
    transcode::{TranscodeGate, TranscodeOutcome},
    Destination, Destinations, ExtensionRules, FileKind, RouteOutcome, RouterError, RouterStats,
    RoutingDecision, SkipReason,
};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Routes newly created files to their destination folders
///
/// Cheap to clone; clones share the registry, the processed set and the
/// statistics, so one clone can be moved into each event task.
#[derive(Debug, Clone)]
pub struct Router {
    destinations: Destinations,
    rules: ExtensionRules,
    classifier: MetadataClassifier,
    gate: TranscodeGate,
    registry: Arc<ActivityRegistry>,
    processed: Arc<ProcessedSet>,
    stats: Arc<RouterStats>,
    dry_run: bool,
}

impl Router {
    pub fn new(
        destinations: Destinations,
        gate: TranscodeGate,
        registry: Arc<ActivityRegistry>,
        processed: Arc<ProcessedSet>,
    ) -> Self {
        Self {
            destinations,
            rules: ExtensionRules::default(),
            classifier: MetadataClassifier::default(),
            gate,
            registry,
            processed,
            stats: Arc::new(RouterStats::default()),
            dry_run: false,
        }
    }

    pub fn with_rules(mut self, rules: ExtensionRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_classifier(mut self, classifier: MetadataClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_stats(mut self, stats: Arc<RouterStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Log decisions without touching any file
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn destinations(&self) -> &Destinations {
        &self.destinations
    }

    pub fn registry(&self) -> &Arc<ActivityRegistry> {
        &self.registry
    }

    pub fn processed(&self) -> &Arc<ProcessedSet> {
        &self.processed
    }

    pub fn stats(&self) -> &Arc<RouterStats> {
        &self.stats
    }

    /// Compute where `path` should go. Reads tags for ordinary audio files.
    pub async fn decide(&self, path: &Path) -> RoutingDecision {
        match FileKind::for_path(path, &self.rules) {
            FileKind::Extraneous => RoutingDecision::Delete,
            FileKind::Lossless => RoutingDecision::MoveTo(Destination::Transcoded),
            FileKind::Audio => match self.classifier.classify_blocking(path).await {
                ArtistStatus::MissingArtist => {
                    warn!(
                        "No artist found in tags for {:?}, moving to the no-artist folder",
                        path.file_name().unwrap_or_default()
                    );
                    RoutingDecision::MoveTo(Destination::NoArtist)
                }
                ArtistStatus::HasArtist | ArtistStatus::Unreadable => {
                    RoutingDecision::MoveTo(Destination::Library)
                }
            },
        }
    }

    /// Handle one file-creation event end to end
    ///
    /// Never fails: every error is logged and reported in the outcome.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub async fn route(&self, path: &Path) -> RouteOutcome {
        if let Some(folder) = path.parent() {
            self.registry.touch(folder).await;
        }

        let outcome = self.route_inner(path).await;
        self.stats.record(&outcome);
        outcome
    }

    async fn route_inner(&self, path: &Path) -> RouteOutcome {
        if self.dry_run {
            let decision = self.decide(path).await;
            info!("Dry run: {:?} would be handled as {:?}", path, decision);
            return RouteOutcome::Skipped(SkipReason::DryRun(decision));
        }

        if FileKind::for_path(path, &self.rules) == FileKind::Lossless {
            return self.route_lossless(path).await;
        }

        match self.decide(path).await {
            RoutingDecision::Delete => match fileops::delete_file(path).await {
                Ok(()) => RouteOutcome::Deleted(path.to_path_buf()),
                Err(e) => {
                    error!("Error deleting file: {}", e);
                    RouteOutcome::Failed(e.to_string())
                }
            },
            RoutingDecision::MoveTo(destination) => self.move_to(path, destination).await,
        }
    }

    async fn route_lossless(&self, path: &Path) -> RouteOutcome {
        let outcome = self
            .gate
            .transcode(path, &self.processed, &self.destinations.transcoded)
            .await;

        match outcome {
            TranscodeOutcome::Converted(_) => {
                self.stats.record_transcode();
                self.move_to(path, Destination::Transcoded).await
            }
            TranscodeOutcome::SkippedAlreadyProcessed => {
                self.move_to(path, Destination::Transcoded).await
            }
            TranscodeOutcome::SkippedMissingInput => {
                RouteOutcome::Skipped(SkipReason::MissingInput)
            }
            TranscodeOutcome::SkippedInProgress => {
                RouteOutcome::Skipped(SkipReason::TranscodeInProgress)
            }
            TranscodeOutcome::Failed(reason) => {
                warn!("Leaving {:?} in place after failed conversion", path);
                RouteOutcome::Failed(reason)
            }
        }
    }

    async fn move_to(&self, path: &Path, destination: Destination) -> RouteOutcome {
        let folder = self.destinations.folder(destination);
        match fileops::move_file(path, folder).await {
            Ok(moved) => {
                info!(
                    "{:?} routed to {} folder",
                    path.file_name().unwrap_or_default(),
                    destination
                );
                RouteOutcome::Moved {
                    destination,
                    path: moved,
                }
            }
            Err(RouterError::Move { source, .. })
                if source.kind() == ErrorKind::NotFound
                    && !matches!(tokio::fs::try_exists(path).await, Ok(true)) =>
            {
                // A duplicate event for a file another event already moved
                debug!("{:?} is gone, nothing to move", path);
                RouteOutcome::Skipped(SkipReason::MissingInput)
            }
            Err(e) => {
                error!("Error moving file: {}", e);
                RouteOutcome::Failed(e.to_string())
            }
        }
    }
}
