use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::process::{command, program_name, run_captured, run_checked, run_streaming};
use super::MediaTool;
use crate::config::Config;

/// [`MediaTool`] backed by ffmpeg and ffprobe.
pub struct FfmpegTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    cover_quality: u32,
}

impl FfmpegTool {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg: config.tools.ffmpeg.clone(),
            ffprobe: config.tools.ffprobe.clone(),
            cover_quality: config.cover.quality,
        }
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn duration(&self, path: &Path) -> Option<f64> {
        let mut cmd = command(&self.ffprobe);
        cmd.arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(path);

        match run_checked(&mut cmd, &program_name(&self.ffprobe)).await {
            Ok(stdout) => {
                let parsed = parse_duration(&stdout);
                if parsed.is_none() {
                    warn!(path = %path.display(), output = stdout.trim(), "Unparseable duration");
                }
                parsed
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to probe duration");
                None
            }
        }
    }

    async fn extract_cover(&self, path: &Path, at_second: f64, out_path: &Path) -> bool {
        if let Some(parent) = out_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(dir = %parent.display(), error = %e, "Cannot create cover directory");
                return false;
            }
        }

        let mut cmd = command(&self.ffmpeg);
        cmd.arg("-y")
            .arg("-ss")
            .arg(format_seconds(at_second))
            .arg("-i")
            .arg(path)
            .arg("-vframes")
            .arg("1")
            .arg("-q:v")
            .arg(self.cover_quality.to_string())
            .arg(out_path);

        match run_captured(&mut cmd, &program_name(&self.ffmpeg)).await {
            Ok(output) if !output.status.success() => {
                warn!(
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "ffmpeg reported an error while extracting cover"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to run ffmpeg for cover"),
        }

        let exists = out_path.exists();
        if exists {
            info!(cover = %out_path.display(), "Cover extracted");
        }
        exists
    }

    async fn cut(&self, path: &Path, start: f64, duration: f64, out_path: &Path) -> bool {
        let mut cmd = command(&self.ffmpeg);
        cmd.arg("-y")
            .arg("-ss")
            .arg(format_seconds(start))
            .arg("-i")
            .arg(path)
            .arg("-t")
            .arg(format_seconds(duration))
            .arg("-c")
            .arg("copy")
            .arg("-loglevel")
            .arg("warning")
            .arg(out_path);

        match run_streaming(&mut cmd, &program_name(&self.ffmpeg), "  ").await {
            Ok(_) => true,
            Err(e) => {
                warn!(output = %out_path.display(), error = %e, "Segment cut failed");
                false
            }
        }
    }
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}

fn format_seconds(seconds: f64) -> String {
    format!("{:.3}", seconds)
}
