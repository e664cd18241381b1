use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, CatalogFactory, MediaItem};
use crate::config::{Config, PipelineConfig, ProviderConfig};
use crate::error::{Result, SubgenError};
use crate::media::{AudioExtractor, AudioExtractorFactory};
use crate::subtitle::{SubtitleDocument, sidecar_path};
use crate::transcribe::{ProviderFactory, TranscriptionProvider};

/// Where a run currently is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ExtractingAudio,
    Transcribing,
    Persisting,
    RefreshingMetadata,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::ExtractingAudio => "extracting audio",
            Stage::Transcribing => "transcribing",
            Stage::Persisting => "persisting",
            Stage::RefreshingMetadata => "refreshing metadata",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a run that did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RunOutcome {
    Generated { sidecar: PathBuf, entries: usize },
    Skipped { reason: String },
    AlreadyRunning,
}

/// Tally of a batch of runs
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub generated: usize,
    pub skipped: usize,
    pub already_running: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub item_id: String,
    pub error: String,
}

impl BatchReport {
    fn record(&mut self, item: &MediaItem, result: &Result<RunOutcome>) {
        match result {
            Ok(RunOutcome::Generated { .. }) => self.generated += 1,
            Ok(RunOutcome::Skipped { .. }) => self.skipped += 1,
            Ok(RunOutcome::AlreadyRunning) => self.already_running += 1,
            Err(e) if e.is_cancelled() => self.cancelled += 1,
            Err(e) => {
                self.failed += 1;
                self.failures.push(BatchFailure {
                    item_id: item.id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
}

type RunKey = (String, String);

/// Holds an (item, language) slot in the in-flight registry until dropped
struct RunClaim {
    registry: Arc<Mutex<HashSet<RunKey>>>,
    key: RunKey,
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        let mut in_flight = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.key);
    }
}

/// Temporary waveform owned by one run; deleted when dropped
struct TempWaveform {
    path: PathBuf,
}

impl TempWaveform {
    fn new(dir: &Path, item_id: &str) -> Self {
        Self {
            path: waveform_path(dir, item_id),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

// Drop cannot await; a single unlink is cheap enough to do inline.
impl Drop for TempWaveform {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("Removed temporary waveform {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove temporary waveform {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// `<dir>/subgen-<sanitized item id>-<random token>.wav`
fn waveform_path(dir: &Path, item_id: &str) -> PathBuf {
    let id: String = item_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(48)
        .collect();
    dir.join(format!("subgen-{}-{}.wav", id, Uuid::new_v4().simple()))
}

/// Extraction, transcription, persistence and metadata refresh for media items
pub struct SubtitlePipeline {
    provider_config: ProviderConfig,
    pipeline_config: PipelineConfig,
    extractor: Box<dyn AudioExtractor>,
    provider: Box<dyn TranscriptionProvider>,
    catalog: Arc<dyn Catalog>,
    in_flight: Arc<Mutex<HashSet<RunKey>>>,
}

impl SubtitlePipeline {
    pub fn new(config: Config) -> Result<Self> {
        let extractor = AudioExtractorFactory::create_extractor(config.media.clone());
        let provider = ProviderFactory::create(&config.provider);
        let catalog = CatalogFactory::create(&config.catalog)?;

        Ok(Self::with_components(config, extractor, provider, catalog))
    }

    pub fn with_components(
        config: Config,
        extractor: Box<dyn AudioExtractor>,
        provider: Box<dyn TranscriptionProvider>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            provider_config: config.provider,
            pipeline_config: config.pipeline,
            extractor,
            provider,
            catalog,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Generate the sidecar subtitle for one item.
    ///
    /// `language` overrides the configured default. An item without an
    /// existing source file is skipped rather than reported as an error.
    pub async fn run(
        &self,
        item: &MediaItem,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let language = language.unwrap_or(&self.provider_config.language).to_string();
        let span = info_span!("run", item_id = %item.id, language = %language);
        self.run_item(item, &language, cancel).instrument(span).await
    }

    async fn run_item(
        &self,
        item: &MediaItem,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        if item.path.as_os_str().is_empty() {
            warn!("Item {} ({}) has no source path, skipping", item.id, item.name);
            return Ok(RunOutcome::Skipped {
                reason: "no source path".to_string(),
            });
        }
        if !tokio::fs::try_exists(&item.path).await.unwrap_or(false) {
            warn!("Source {} does not exist, skipping", item.path.display());
            return Ok(RunOutcome::Skipped {
                reason: format!("{} does not exist", item.path.display()),
            });
        }

        let Some(_claim) = self.claim(&item.id, language) else {
            warn!("A run for {} ({}) is already in progress", item.id, language);
            return Ok(RunOutcome::AlreadyRunning);
        };

        info!(
            "Generating {} subtitles for {} with {}",
            language,
            item.path.display(),
            self.provider.name()
        );

        let waveform = TempWaveform::new(&self.pipeline_config.temp_dir(), &item.id);
        let mut stage = Stage::Idle;
        let result = self
            .execute(item, language, waveform.path(), &mut stage, cancel)
            .await;
        drop(waveform);

        match &result {
            Ok(RunOutcome::Generated { sidecar, entries }) => {
                info!("Wrote {} entries to {}", entries, sidecar.display())
            }
            Ok(_) => {}
            Err(e) if e.is_cancelled() => {
                warn!("Run for {} cancelled while {}", item.id, stage)
            }
            Err(e) => {
                let failed_at = stage;
                stage = Stage::Failed;
                error!("Run for {} {} while {}: {}", item.id, stage, failed_at, e)
            }
        }

        result
    }

    async fn execute(
        &self,
        item: &MediaItem,
        language: &str,
        waveform: &Path,
        stage: &mut Stage,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        *stage = Stage::ExtractingAudio;
        self.extractor.extract(&item.path, waveform, cancel).await?;

        *stage = Stage::Transcribing;
        if cancel.is_cancelled() {
            return Err(SubgenError::Cancelled);
        }
        let text = self.provider.transcribe(waveform, language, cancel).await?;
        let document = SubtitleDocument::new(text);

        *stage = Stage::Persisting;
        let sidecar = sidecar_path(&item.path, language, &self.provider_config.subtitle_extension);
        document.persist(&sidecar, cancel).await?;

        // The sidecar is durable from here on; a failed refresh only delays
        // the catalog noticing it.
        *stage = Stage::RefreshingMetadata;
        if let Err(e) = self.catalog.refresh_metadata(&item.id, cancel).await {
            warn!("Metadata refresh for {} failed: {}", item.id, e);
        }

        *stage = Stage::Done;
        Ok(RunOutcome::Generated {
            sidecar,
            entries: document.entries().len(),
        })
    }

    fn claim(&self, item_id: &str, language: &str) -> Option<RunClaim> {
        let key = (item_id.to_string(), language.to_string());
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(RunClaim {
            registry: Arc::clone(&self.in_flight),
            key,
        })
    }

    /// Run many items with at most `max_concurrent_runs` in flight.
    ///
    /// One item's failure never stops the batch; cancellation stops scheduling
    /// new items and cancels the running ones.
    pub async fn run_batch<I>(
        self: Arc<Self>,
        items: I,
        language: Option<String>,
        cancel: CancellationToken,
        progress: ProgressBar,
    ) -> BatchReport
    where
        I: IntoIterator<Item = MediaItem>,
    {
        let semaphore = Arc::new(Semaphore::new(self.pipeline_config.max_concurrent_runs.max(1)));
        let mut tasks = JoinSet::new();

        for item in items {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let pipeline = Arc::clone(&self);
            let language = language.clone();
            let cancel = cancel.child_token();
            let progress = progress.clone();
            tasks.spawn(async move {
                let _permit = permit;
                progress.set_message(item.name.clone());
                let result = pipeline.run(&item, language.as_deref(), &cancel).await;
                progress.inc(1);
                (item, result)
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((item, result)) => report.record(&item, &result),
                Err(e) => {
                    error!("Batch task panicked: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Batch finished: {} generated, {} skipped, {} failed, {} cancelled",
            report.generated, report.skipped, report.failed, report.cancelled
        );
        report
    }
}
