//! Seams to the external programs recpub drives.
//!
//! The orchestration core only sees the traits below; the `rclone`, `ffmpeg`
//! and `biliup` modules implement them by spawning the real tools.

pub mod biliup;
pub mod ffmpeg;
pub mod process;
pub mod rclone;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ContentType;

pub use biliup::BiliupClient;
pub use ffmpeg::FfmpegTool;
pub use rclone::RcloneStorage;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status}: {output}")]
    Exit {
        program: String,
        status: String,
        output: String,
    },

    #[error("unexpected output from {program}: {message}")]
    Output { program: String, message: String },
}

/// Remote file store holding the recordings (one folder per group).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<String>, ToolError>;

    /// Recording filenames in `group`, sorted lexicographically (which is
    /// chronological under the naming convention).
    async fn list_files(&self, group: &str) -> Result<Vec<String>, ToolError>;

    async fn file_size(&self, group: &str, filename: &str) -> Result<u64, ToolError>;

    async fn bulk_sizes(&self, group: &str) -> Result<HashMap<String, u64>, ToolError>;

    async fn mount(&self) -> Result<(), ToolError>;

    async fn unmount(&self) -> Result<(), ToolError>;

    /// Copies `remote_path` (group-relative) into `local_dir`, keeping its filename.
    async fn download(&self, remote_path: &str, local_dir: &Path) -> Result<(), ToolError>;

    /// Checks that `target` (or the configured remote) answers a listing.
    async fn test_connection<'a>(&self, target: Option<&'a str>) -> Result<bool, ToolError>;

    async fn list_remotes(&self) -> Result<Vec<String>, ToolError>;
}

/// Media probing and cutting.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Total duration in seconds, `None` when it cannot be determined.
    async fn duration(&self, path: &Path) -> Option<f64>;

    /// Writes one frame at `at_second` to `out_path`. Returns whether the file exists afterwards.
    async fn extract_cover(&self, path: &Path, at_second: f64, out_path: &Path) -> bool;

    /// Lossless (stream copy) cut of `duration` seconds starting at `start`.
    async fn cut(&self, path: &Path, start: f64, duration: f64, out_path: &Path) -> bool;
}

/// Everything needed to create a new remote video.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub video: PathBuf,
    pub title: String,
    pub description: String,
    pub category: u32,
    pub tags: Vec<String>,
    pub source_note: String,
    pub cover: Option<PathBuf>,
    pub content_type: ContentType,
}

/// A video as listed by the publish client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVideo {
    pub id: String,
    pub title: String,
    pub status: String,
}

/// Client for the video platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PublishClient: Send + Sync {
    /// Creates a new remote video and returns its id.
    async fn create(&self, request: &PublishRequest) -> Result<String, ToolError>;

    /// Appends `path` as a new part of `remote_id`.
    async fn append(&self, path: &Path, remote_id: &str, part_title: &str)
        -> Result<(), ToolError>;

    async fn list_recent(&self, count: usize) -> Result<Vec<RemoteVideo>, ToolError>;

    async fn exists(&self, remote_id: &str) -> bool;

    /// Interactive login; inherits the terminal.
    async fn login(&self) -> Result<(), ToolError>;

    async fn check_login(&self) -> bool;
}
