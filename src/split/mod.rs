//! Time-based splitting of recordings that exceed the platform size limit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::tools::MediaTool;

/// Segmentation of one source file into equal-duration parts.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPlan {
    pub total_duration: f64,
    pub part_count: usize,
    pub part_duration: f64,
    /// Output paths in publish order.
    pub outputs: Vec<PathBuf>,
}

impl SplitPlan {
    /// Start offset in seconds of segment `index` (0-based).
    pub fn start_of(&self, index: usize) -> f64 {
        index as f64 * self.part_duration
    }
}

/// Number of parts needed so that no part exceeds `max_part_gb`. Never below one.
pub fn part_count(size_gb: f64, max_part_gb: f64) -> usize {
    if max_part_gb <= 0.0 || size_gb <= 0.0 {
        return 1;
    }
    ((size_gb / max_part_gb).ceil() as usize).max(1)
}

/// Output name of segment `index` (0-based): `<stem>_part<index+1>.<ext>`.
pub fn segment_path(video: &Path, out_dir: &Path, index: usize) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "segment".to_string());

    let name = match video.extension() {
        Some(ext) => format!("{}_part{}.{}", stem, index + 1, ext.to_string_lossy()),
        None => format!("{}_part{}", stem, index + 1),
    };
    out_dir.join(name)
}

pub struct SplitPlanner {
    media: Arc<dyn MediaTool>,
    max_part_gb: f64,
}

impl SplitPlanner {
    pub fn new(media: Arc<dyn MediaTool>, max_part_gb: f64) -> Self {
        Self { media, max_part_gb }
    }

    /// Builds the plan; `None` when the duration cannot be determined.
    pub async fn plan(&self, video: &Path, out_dir: &Path, size_gb: f64) -> Option<SplitPlan> {
        let part_count = part_count(size_gb, self.max_part_gb);

        let Some(total_duration) = self.media.duration(video).await else {
            error!(video = %video.display(), "Cannot determine duration, not splitting");
            return None;
        };

        let outputs = (0..part_count)
            .map(|i| segment_path(video, out_dir, i))
            .collect();

        Some(SplitPlan {
            total_duration,
            part_count,
            part_duration: total_duration / part_count as f64,
            outputs,
        })
    }

    /// Cuts `video` into segments under `out_dir` and returns the ones that
    /// were written, in order. A segment that fails is logged and skipped;
    /// an empty result means the split failed.
    pub async fn split(&self, video: &Path, out_dir: &Path, size_gb: f64) -> Vec<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(out_dir).await {
            error!(dir = %out_dir.display(), error = %e, "Cannot create split directory");
            return Vec::new();
        }

        let Some(plan) = self.plan(video, out_dir, size_gb).await else {
            return Vec::new();
        };

        info!(
            video = %video.display(),
            parts = plan.part_count,
            part_duration = format!("{:.1}s", plan.part_duration),
            total_duration = format!("{:.1}s", plan.total_duration),
            "Splitting video"
        );

        let mut produced = Vec::with_capacity(plan.part_count);
        for (i, output) in plan.outputs.iter().enumerate() {
            info!(part = i + 1, of = plan.part_count, "Cutting segment");
            let ok = self
                .media
                .cut(video, plan.start_of(i), plan.part_duration, output)
                .await;

            // Judged by the output file, not the exit status
            if output.exists() {
                if !ok {
                    warn!(part = i + 1, output = %output.display(), "Cut reported failure but segment exists, keeping it");
                }
                produced.push(output.clone());
            } else {
                warn!(part = i + 1, output = %output.display(), "Segment was not produced, skipping");
            }
        }

        info!(produced = produced.len(), planned = plan.part_count, "Split finished");
        produced
    }
}
