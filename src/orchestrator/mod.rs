//! Drives upload tasks from source file to ledger entry.
//!
//! Each task runs as a unit inside a fixed retry loop:
//! resolve path, publish directly or split and publish segments in order,
//! record the outcome, clean up scratch files. Tasks run one at a time, in
//! the order given, and a failed task never stops the batch.

pub mod error;
pub mod retry;
pub mod task;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::types::PublishConfig;
use crate::config::{Config, ContentType};
use crate::ledger::Ledger;
use crate::resolver::{PathResolver, DOWNLOADS_DIR};
use crate::source::SourceRecord;
use crate::split::SplitPlanner;
use crate::tools::{MediaTool, PublishClient, PublishRequest};

pub use error::TaskError;
pub use retry::RetryPolicy;
pub use task::{TaskMode, TaskOutcome, TaskState, UploadTask};

pub const SPLITS_DIR: &str = "splits";
pub const COVERS_DIR: &str = "covers";

/// Counters accumulated over one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    /// The batch stopped early on an interrupt.
    pub interrupted: bool,
}

impl BatchStats {
    pub fn total(&self) -> usize {
        self.success + self.failed + self.skipped
    }
}

enum TaskResult {
    Success,
    Failed,
    Skipped,
    Interrupted,
}

pub struct UploadOrchestrator {
    ledger: Ledger,
    resolver: PathResolver,
    planner: SplitPlanner,
    media: Arc<dyn MediaTool>,
    publisher: Arc<dyn PublishClient>,
    policy: RetryPolicy,
    publish: PublishConfig,
    scratch_root: PathBuf,
    max_file_size_gb: f64,
    cover_time: f64,
}

impl UploadOrchestrator {
    pub fn new(
        config: &Config,
        ledger: Ledger,
        resolver: PathResolver,
        media: Arc<dyn MediaTool>,
        publisher: Arc<dyn PublishClient>,
    ) -> Self {
        Self {
            ledger,
            resolver,
            planner: SplitPlanner::new(media.clone(), config.upload.split_part_size_gb),
            media,
            publisher,
            policy: RetryPolicy::from(&config.retry),
            publish: config.publish.clone(),
            scratch_root: config.upload.local_cache_path.clone(),
            max_file_size_gb: config.upload.max_file_size_gb,
            cover_time: config.cover.extract_time_sec,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn needs_split(&self, record: &SourceRecord) -> bool {
        record.size_gb() > self.max_file_size_gb
    }

    /// Runs `tasks` in order. Stops advancing once `shutdown` turns true; the
    /// task in flight at that moment is abandoned without a ledger entry.
    pub async fn run_batch(
        &mut self,
        tasks: Vec<UploadTask>,
        mut shutdown: watch::Receiver<bool>,
    ) -> BatchStats {
        let mut stats = BatchStats::default();
        let total = tasks.len();

        for (i, task) in tasks.iter().enumerate() {
            if *shutdown.borrow() {
                stats.interrupted = true;
                break;
            }

            info!(
                task = i + 1,
                of = total,
                path = %task.record.path(),
                size = %crate::source::format_size(task.record.size),
                "Processing task"
            );

            match self.run_task(task, &mut shutdown).await {
                TaskResult::Success => stats.success += 1,
                TaskResult::Failed => stats.failed += 1,
                TaskResult::Skipped => stats.skipped += 1,
                TaskResult::Interrupted => {
                    stats.interrupted = true;
                    break;
                }
            }
        }

        info!(
            success = stats.success,
            failed = stats.failed,
            skipped = stats.skipped,
            interrupted = stats.interrupted,
            "Batch finished"
        );
        stats
    }

    async fn run_task(
        &mut self,
        task: &UploadTask,
        shutdown: &mut watch::Receiver<bool>,
    ) -> TaskResult {
        let record = &task.record;
        let path = record.path();

        if self.ledger.is_uploaded(&path, record.size) {
            info!(path = %path, "Already uploaded, skipping");
            return TaskResult::Skipped;
        }

        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            transition(record, TaskState::Pending);

            let result = tokio::select! {
                r = self.attempt(task) => r,
                _ = wait_for_shutdown(shutdown) => Err(TaskError::Interrupted),
            };
            self.cleanup_task(record).await;

            match result {
                Ok(outcome) => {
                    self.record_success(record, outcome);
                    return TaskResult::Success;
                }
                Err(TaskError::Interrupted) => {
                    warn!(path = %path, "Interrupted, task not recorded");
                    return TaskResult::Interrupted;
                }
                Err(e) => {
                    error!(path = %path, attempt, of = self.policy.attempts, error = %e, "Upload attempt failed");
                    if !self.policy.should_retry(attempt, &e) {
                        break e;
                    }
                }
            }

            info!(delay = ?self.policy.delay, "Retrying after delay");
            let interrupted = tokio::select! {
                _ = tokio::time::sleep(self.policy.delay) => false,
                _ = wait_for_shutdown(shutdown) => true,
            };
            if interrupted {
                warn!(path = %path, "Interrupted while waiting to retry, task not recorded");
                return TaskResult::Interrupted;
            }
        };

        if let Err(e) = self.ledger.add_failed(&path, &last_error.to_string()) {
            error!(path = %path, error = %e, "Failed to record upload failure");
        }
        TaskResult::Failed
    }

    /// One pass through resolve, publish. Cleanup is the caller's job so it
    /// also runs when this future is dropped on interrupt.
    async fn attempt(&mut self, task: &UploadTask) -> Result<TaskOutcome, TaskError> {
        let record = &task.record;
        let needs_split = self.needs_split(record);

        transition(record, TaskState::ResolvingPath);
        let resolved = self
            .resolver
            .resolve(&record.path(), record.size, needs_split)
            .await?;
        debug!(path = %resolved.path.display(), origin = ?resolved.origin, "Path resolved");

        if needs_split {
            transition(record, TaskState::Splitting);
            self.publish_split(task, &resolved.path).await
        } else {
            transition(record, TaskState::Direct);
            self.publish_direct(task, &resolved.path).await
        }
    }

    async fn publish_direct(
        &self,
        task: &UploadTask,
        video: &Path,
    ) -> Result<TaskOutcome, TaskError> {
        let record = &task.record;

        let remote_id = match &task.mode {
            TaskMode::CreateNew { content_type } => {
                let cover = self.extract_cover(video).await;
                transition(record, TaskState::Publishing);
                let request = self.publish_request(record, video, cover, *content_type);
                self.publisher.create(&request).await?
            }
            TaskMode::AppendTo { remote_id } => {
                transition(record, TaskState::Publishing);
                self.publisher
                    .append(video, remote_id, &record.title)
                    .await?;
                remote_id.clone()
            }
        };

        info!(path = %record.path(), remote_id = %remote_id, "Published");
        Ok(TaskOutcome {
            remote_id,
            is_split: false,
            parts: Vec::new(),
        })
    }

    async fn publish_split(
        &self,
        task: &UploadTask,
        video: &Path,
    ) -> Result<TaskOutcome, TaskError> {
        let record = &task.record;
        let split_dir = self.split_dir(record);

        let segments = self
            .planner
            .split(video, &split_dir, record.size_gb())
            .await;
        if segments.is_empty() {
            return Err(TaskError::SplitPlanning(format!(
                "no segments produced for {}",
                record.path()
            )));
        }

        transition(record, TaskState::Publishing);
        let total = segments.len();
        let (mut remote_id, content_type) = match &task.mode {
            TaskMode::AppendTo { remote_id } => (Some(remote_id.clone()), self.publish.content_type),
            TaskMode::CreateNew { content_type } => (None, *content_type),
        };

        for (i, segment) in segments.iter().enumerate() {
            let index = i + 1;
            info!(part = index, of = total, segment = %segment.display(), "Publishing segment");

            // Segment 1 creates the video unless appending; every later one appends to it
            let published = match remote_id.as_deref() {
                None => {
                    let cover = self.extract_cover(segment).await;
                    let request = self.publish_request(record, segment, cover, content_type);
                    self.publisher.create(&request).await.map(Some)
                }
                Some(id) => self
                    .publisher
                    .append(segment, id, &record.part_title(index))
                    .await
                    .map(|_| None),
            };

            match published {
                Ok(Some(id)) => remote_id = Some(id),
                Ok(None) => {}
                Err(source) => {
                    return Err(TaskError::SegmentPublish {
                        index,
                        total,
                        source,
                    })
                }
            }
            info!(part = index, of = total, "Segment published");
        }

        let remote_id = remote_id.ok_or_else(|| {
            TaskError::SplitPlanning(format!("no remote id after publishing {}", record.path()))
        })?;

        Ok(TaskOutcome {
            remote_id,
            is_split: true,
            parts: segments
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
        })
    }

    fn record_success(&mut self, record: &SourceRecord, outcome: TaskOutcome) {
        transition(record, TaskState::Recorded);
        // The upload already happened; a ledger write error must not trigger a re-upload.
        if let Err(e) = self.ledger.add_success(
            &record.path(),
            record.size,
            Some(outcome.remote_id),
            outcome.is_split,
            outcome.parts,
        ) {
            error!(path = %record.path(), error = %e, "Upload succeeded but could not be recorded");
        }
    }

    fn publish_request(
        &self,
        record: &SourceRecord,
        video: &Path,
        cover: Option<PathBuf>,
        content_type: ContentType,
    ) -> PublishRequest {
        let mut tags = self.publish.tags.clone();
        let streamer = &record.group.streamer_name;
        if !streamer.is_empty() && !tags.contains(streamer) {
            tags.push(streamer.clone());
        }

        PublishRequest {
            video: video.to_path_buf(),
            title: record.title.clone(),
            description: record.description(&self.publish.description_template),
            category: self.publish.category,
            tags,
            source_note: record.source_note(&self.publish.source_template),
            cover,
            content_type,
        }
    }

    /// Best effort: a missing cover only means publishing without one.
    async fn extract_cover(&self, video: &Path) -> Option<PathBuf> {
        let stem = video.file_stem()?.to_string_lossy().into_owned();
        let out = self
            .scratch_root
            .join(COVERS_DIR)
            .join(format!("{}.jpg", stem));

        if self.media.extract_cover(video, self.cover_time, &out).await && out.exists() {
            Some(out)
        } else {
            warn!(video = %video.display(), "No cover extracted, publishing without one");
            None
        }
    }

    fn split_dir(&self, record: &SourceRecord) -> PathBuf {
        self.scratch_root.join(SPLITS_DIR).join(file_stem(&record.filename))
    }

    /// Removes everything an attempt may have left in scratch for `record`.
    async fn cleanup_task(&self, record: &SourceRecord) {
        let downloaded = self.scratch_root.join(DOWNLOADS_DIR).join(&record.filename);
        remove_file(&downloaded).await;
        remove_dir(&self.split_dir(record)).await;
        remove_dir(&self.scratch_root.join(COVERS_DIR)).await;
    }

    /// Unmounts the remote and empties the scratch subdirectories. Runs once
    /// at the end of every run, however it ended.
    pub async fn teardown(&mut self) {
        self.resolver.teardown().await;
        for dir in [DOWNLOADS_DIR, SPLITS_DIR, COVERS_DIR] {
            remove_dir(&self.scratch_root.join(dir)).await;
        }
        info!("Teardown complete");
    }
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone
/// without having requested it.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn transition(record: &SourceRecord, state: TaskState) {
    debug!(path = %record.path(), state = %state, "Task state");
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary file"),
    }
}

async fn remove_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed temporary directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary directory"),
    }
}

#[cfg(test)]
mod tests;
