//! Scan orchestration: providers, then enrichers, then the finalizer

use crate::LibraryError;
use crate::context::SearchContext;
use crate::finalize::{Library, finalize};
use crate::providers::{Enricher, Provider};
use ludex_config::LudexConfig;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of a scan
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanReport {
    /// Games reported by each provider, in run order
    pub provider_counts: Vec<(String, usize)>,
    pub metadata_dirs: usize,
    pub games: usize,
    pub collections: usize,
    pub duration_ms: u64,
    pub cancelled: bool,
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub library: Library,
    pub report: ScanReport,
}

/// Providers and enrichers in run order
#[derive(Debug, Clone)]
pub struct ScanPipeline {
    providers: Vec<Provider>,
    enrichers: Vec<Enricher>,
}

impl ScanPipeline {
    pub fn new(providers: Vec<Provider>, enrichers: Vec<Enricher>) -> Self {
        Self {
            providers,
            enrichers,
        }
    }

    /// Every enabled provider and enricher
    pub fn from_config(config: &LudexConfig) -> Self {
        Self::new(Provider::from_config(config), Enricher::from_config(config))
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn enrichers(&self) -> &[Enricher] {
        &self.enrichers
    }

    /// Run a full scan on the current thread. A cancelled scan still
    /// finalizes what it found.
    pub fn run(&self, cancel: &CancellationToken) -> ScanOutcome {
        let start = Instant::now();
        let mut ctx = SearchContext::new();
        let mut report = ScanReport::default();
        let mut metadata_dirs: Vec<PathBuf> = Vec::new();

        for provider in &self.providers {
            if cancel.is_cancelled() {
                break;
            }

            tracing::debug!("Running provider `{}`", provider.name());
            let discovery = provider.find(&mut ctx, cancel);
            for dir in discovery.metadata_dirs {
                if !metadata_dirs.contains(&dir) {
                    metadata_dirs.push(dir);
                }
            }
            report
                .provider_counts
                .push((provider.name().to_string(), discovery.game_count));
        }

        for enricher in &self.enrichers {
            if cancel.is_cancelled() {
                break;
            }

            tracing::debug!("Running enricher `{}`", enricher.name());
            enricher.fill(&mut ctx, &metadata_dirs, cancel);
        }

        let library = finalize(ctx);

        report.metadata_dirs = metadata_dirs.len();
        report.games = library.game_count();
        report.collections = library.collection_count();
        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        report.cancelled = cancel.is_cancelled();

        if report.cancelled {
            tracing::warn!("Scan cancelled after {} ms", report.duration_ms);
        }
        tracing::info!(
            "Scan complete: {} games in {} collections ({} ms)",
            report.games,
            report.collections,
            report.duration_ms
        );

        ScanOutcome { library, report }
    }

    /// Run the scan on a blocking worker thread
    pub async fn spawn(self, cancel: CancellationToken) -> Result<ScanOutcome, LibraryError> {
        tokio::task::spawn_blocking(move || self.run(&cancel))
            .await
            .map_err(|e| LibraryError::Task(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Es2Provider, MediaEnricher, PegasusProvider};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_empty_pipeline() {
        let outcome = ScanPipeline::new(Vec::new(), Vec::new()).run(&CancellationToken::new());
        assert!(outcome.library.is_empty());
        assert_eq!(outcome.report.games, 0);
        assert!(!outcome.report.cancelled);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let pipeline = ScanPipeline::new(
            vec![Provider::Es2(Es2Provider::with_systems_file(Path::new(
                "/nonexistent/es_systems.cfg",
            )))],
            vec![Enricher::Media(MediaEnricher::new())],
        );
        let outcome = pipeline.run(&cancel);
        assert!(outcome.report.cancelled);
        assert!(outcome.report.provider_counts.is_empty());
    }

    #[test]
    fn test_report_counts() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        fs::write(root.join("a.zip"), b"").unwrap();
        fs::write(root.join("b.zip"), b"").unwrap();
        fs::write(root.join("metadata.txt"), "collection: Arcade\nextension: zip\n").unwrap();

        let pipeline = ScanPipeline::new(
            vec![Provider::Pegasus(PegasusProvider::with_game_dirs(vec![root]))],
            Vec::new(),
        );
        let outcome = pipeline.run(&CancellationToken::new());

        assert_eq!(outcome.report.provider_counts, vec![("pegasus".to_string(), 2)]);
        assert_eq!(outcome.report.metadata_dirs, 1);
        assert_eq!(outcome.report.games, 2);
        assert_eq!(outcome.report.collections, 1);
    }

    #[tokio::test]
    async fn test_spawn_on_blocking_worker() {
        let outcome = ScanPipeline::new(Vec::new(), Vec::new())
            .spawn(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.report.collections, 0);
    }
}
