//! Per-item conversion with three-tier deduplication.
//!
//! Tiers are checked in order, each one cheaper than the work it saves:
//! 1. the canonical URL already has a source record;
//! 2. another source record resolved to the same `(audio_url, video_url)`;
//! 3. the transcoded bytes hash to an existing result record.
//!
//! Only when all three miss is the output uploaded and a result record
//! created. Uniqueness violations on create mean another worker won a race
//! and are folded into the matching "already done" outcome.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn, Instrument};
use vrddt_media::{md5_file, VideoMetadata};
use vrddt_models::{RecordId, ResultVideoRecord, SourceVideoRecord, WorkItem};
use vrddt_store::{ContentStoreExt, Selector, StoreError};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::ItemLogger;
use crate::services::Services;

/// How an item finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Tier 1: the canonical URL was already recorded.
    AlreadyProcessed {
        source_id: RecordId,
        result_id: Option<RecordId>,
    },
    /// Tier 2: linked to the result of a source with identical streams.
    LinkedByStreams { source_id: RecordId, result_id: RecordId },
    /// Tier 3: linked to an existing result with identical content.
    LinkedByContent { source_id: RecordId, result_id: RecordId },
    /// Full pipeline: uploaded a new result.
    Created { source_id: RecordId, result_id: RecordId },
}

impl ProcessOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyProcessed { .. } => "already_processed",
            Self::LinkedByStreams { .. } => "linked_by_streams",
            Self::LinkedByContent { .. } => "linked_by_content",
            Self::Created { .. } => "created",
        }
    }

    pub fn result_id(&self) -> Option<&RecordId> {
        match self {
            Self::AlreadyProcessed { result_id, .. } => result_id.as_ref(),
            Self::LinkedByStreams { result_id, .. }
            | Self::LinkedByContent { result_id, .. }
            | Self::Created { result_id, .. } => Some(result_id),
        }
    }
}

/// Runs the conversion state machine for one work item at a time.
pub struct Processor {
    services: Services,
    work_dir: PathBuf,
}

impl Processor {
    pub fn new(services: Services, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            services,
            work_dir: work_dir.into(),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Process one decoded work item.
    pub async fn process(&self, item: WorkItem) -> WorkerResult<ProcessOutcome> {
        let shell = match item {
            WorkItem::SourceVideo(record) => record,
            WorkItem::ResultVideo(record) => {
                return Err(WorkerError::UnsupportedWorkItem {
                    kind: "result_video",
                    id: record.id.to_string(),
                })
            }
        };

        let logger = ItemLogger::new(shell.id.as_str(), "convert");
        let span = logger.span();
        self.process_source(shell, &logger).instrument(span).await
    }

    async fn process_source(
        &self,
        shell: SourceVideoRecord,
        logger: &ItemLogger,
    ) -> WorkerResult<ProcessOutcome> {
        let store = &self.services.store;
        logger.log_start(&shell.url);

        let canonical = self.services.fetcher.canonicalize(&shell.url).await?;
        debug!(url = %canonical, "Canonicalized");

        // Tier 1
        if let Some(existing) = store.source_by_url(&canonical).await? {
            logger.log_completion("source URL already recorded");
            return Ok(already_processed(existing));
        }

        let metadata = self.services.fetcher.fetch_metadata(&canonical).await?;
        if !metadata.has_audio() {
            logger.log_warning("no separate audio stream, converting video only");
        }

        // Tier 2
        if let Some(twin) = store
            .source_by_streams(&metadata.audio_url, &metadata.video_url)
            .await?
        {
            let result = store.resolve_result(&twin).await?.ok_or_else(|| {
                WorkerError::consistency(format!(
                    "source {} shares streams but has no result",
                    twin.id
                ))
            })?;
            let record = new_source(&canonical, &metadata).with_result(result.id.clone());
            logger.log_completion(&format!("streams match source {}", twin.id));
            return self
                .link(record, &canonical, |source_id, result_id| {
                    ProcessOutcome::LinkedByStreams { source_id, result_id }
                })
                .await;
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("vrddt-worker-")
            .tempdir_in(&self.work_dir)?;

        let output = self.convert(scratch.path(), &metadata, logger).await?;
        let hash = md5_file(&output).await?;
        debug!(md5 = %hash, "Hashed output");

        // Tier 3
        if let Some(existing) = store.result_by_hash(&hash).await? {
            let record = new_source(&canonical, &metadata).with_result(existing.id.clone());
            logger.log_completion(&format!("content matches result {}", existing.id));
            return self
                .link(record, &canonical, |source_id, result_id| {
                    ProcessOutcome::LinkedByContent { source_id, result_id }
                })
                .await;
        }

        let outcome = self
            .materialize(&output, &hash, &canonical, &metadata, logger)
            .await;
        drop(scratch);
        outcome
    }

    /// Download streams into `dir` and transcode them into `dir/output.mp4`.
    async fn convert(
        &self,
        dir: &Path,
        metadata: &VideoMetadata,
        logger: &ItemLogger,
    ) -> WorkerResult<PathBuf> {
        let fetcher = &self.services.fetcher;

        let video = dir.join("video.mp4");
        fetcher.download(&metadata.video_url, &video).await?;

        let audio = if metadata.has_audio() {
            let path = dir.join("audio.mp4");
            match fetcher.download(&metadata.audio_url, &path).await {
                Ok(_) => Some(path),
                Err(e) => {
                    logger.log_warning(&format!("audio download failed, continuing without: {}", e));
                    None
                }
            }
        } else {
            None
        };

        let output = dir.join("output.mp4");
        self.services
            .transcoder
            .convert(&video, audio.as_deref(), &output)
            .await?;
        logger.log_progress("transcoded");
        Ok(output)
    }

    /// Upload the output and persist a result record and its source record.
    async fn materialize(
        &self,
        output: &Path,
        hash: &str,
        canonical: &str,
        metadata: &VideoMetadata,
        logger: &ItemLogger,
    ) -> WorkerResult<ProcessOutcome> {
        let storage = &self.services.storage;
        let store = &self.services.store;

        let result_id = RecordId::generate();
        let key = format!("{}.mp4", result_id);

        storage.upload(output, &key).await?;
        let location = match storage.location(&key).await {
            Ok(location) => location,
            Err(e) => {
                self.discard_object(&key).await;
                return Err(e.into());
            }
        };

        let result = ResultVideoRecord::with_id(result_id, hash, location);
        match store.create_result_video(&result).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => {
                // Another worker stored the same bytes first; use theirs.
                self.discard_object(&key).await;
                let winner = store.result_by_hash(hash).await?.ok_or_else(|| {
                    WorkerError::consistency(format!("result {} vanished after conflict", hash))
                })?;
                logger.log_completion(&format!("lost content race to result {}", winner.id));
                let record = new_source(canonical, metadata).with_result(winner.id.clone());
                return self
                    .link(record, canonical, |source_id, result_id| {
                        ProcessOutcome::LinkedByContent { source_id, result_id }
                    })
                    .await;
            }
            Err(e) => {
                self.discard_object(&key).await;
                return Err(e.into());
            }
        }

        let record = new_source(canonical, metadata).with_result(result.id.clone());
        match store.create_source_video(&record).await {
            Ok(()) => {
                logger.log_completion(&format!("created result {} at {}", result.id, result.url));
                Ok(ProcessOutcome::Created {
                    source_id: record.id,
                    result_id: result.id,
                })
            }
            Err(StoreError::AlreadyExists(_)) => {
                // The result stays: it is valid content that tier 3 will reuse.
                logger.log_warning("source URL recorded concurrently");
                self.winner(canonical).await
            }
            Err(e) => {
                logger.log_error(&format!("persisting source failed, compensating: {}", e));
                if let Err(del) = store
                    .delete_result_videos(&Selector::by_id(result.id.as_str()))
                    .await
                {
                    warn!(result_id = %result.id, "Compensating result delete failed: {}", del);
                }
                self.discard_object(&key).await;
                Err(e.into())
            }
        }
    }

    /// Persist a linking source record; a concurrent insert of the same URL counts as done.
    async fn link<F>(&self, record: SourceVideoRecord, canonical: &str, outcome: F) -> WorkerResult<ProcessOutcome>
    where
        F: FnOnce(RecordId, RecordId) -> ProcessOutcome,
    {
        let result_id = record.result_ref().cloned().ok_or_else(|| {
            WorkerError::consistency(format!("link for {} has no result", canonical))
        })?;
        match self.services.store.create_source_video(&record).await {
            Ok(()) => Ok(outcome(record.id, result_id)),
            Err(StoreError::AlreadyExists(_)) => self.winner(canonical).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn winner(&self, canonical: &str) -> WorkerResult<ProcessOutcome> {
        match self.services.store.source_by_url(canonical).await? {
            Some(existing) => Ok(already_processed(existing)),
            None => Err(WorkerError::consistency(format!(
                "source {} reported existing but not found",
                canonical
            ))),
        }
    }

    async fn discard_object(&self, key: &str) {
        if let Err(e) = self.services.storage.delete(key).await {
            warn!(key = %key, "Failed to delete uploaded object: {}", e);
        }
    }
}

fn new_source(canonical: &str, metadata: &VideoMetadata) -> SourceVideoRecord {
    SourceVideoRecord::shell(canonical)
        .with_streams(metadata.audio_url.clone(), metadata.video_url.clone())
        .with_title(metadata.title.clone())
}

fn already_processed(existing: SourceVideoRecord) -> ProcessOutcome {
    let result_id = existing.result_ref().cloned();
    ProcessOutcome::AlreadyProcessed {
        source_id: existing.id,
        result_id,
    }
}
