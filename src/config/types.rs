use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    #[serde(default)]
    pub source: SourceConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cover: CoverConfig,
    pub publish: PublishConfig,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// rclone remote name, without the trailing colon
    pub name: String,
    pub backup_path: String,
    pub mount_point: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            filename_prefix: default_filename_prefix(),
            extension: default_extension(),
        }
    }
}

fn default_filename_prefix() -> String {
    "录制".to_string()
}

fn default_extension() -> String {
    "flv".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size_gb")]
    pub max_file_size_gb: f64,
    #[serde(default = "default_split_part_size_gb")]
    pub split_part_size_gb: f64,
    pub local_cache_path: PathBuf,
    #[serde(default = "default_min_free_space_gb")]
    pub min_free_space_gb: f64,
}

fn default_max_file_size_gb() -> f64 {
    15.0
}

fn default_split_part_size_gb() -> f64 {
    14.5
}

fn default_min_free_space_gb() -> f64 {
    5.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub delay: Duration,
    /// Stop retrying errors that cannot succeed on a second attempt
    /// (disk space, empty split plan).
    #[serde(default)]
    pub skip_non_retryable: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            delay: default_retry_delay(),
            skip_non_retryable: false,
        }
    }
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverConfig {
    #[serde(default = "default_cover_time")]
    pub extract_time_sec: f64,
    /// ffmpeg `-q:v` value, 2 (best) to 31 (worst)
    #[serde(default = "default_cover_quality")]
    pub quality: u32,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            extract_time_sec: default_cover_time(),
            quality: default_cover_quality(),
        }
    }
}

fn default_cover_time() -> f64 {
    1.0
}

fn default_cover_quality() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_publish_executable")]
    pub executable: PathBuf,
    pub cookie_file: PathBuf,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub submit: SubmitMode,
    pub category: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub description_template: String,
    pub source_template: String,
    #[serde(default)]
    pub content_type: ContentType,
}

fn default_publish_executable() -> PathBuf {
    PathBuf::from("/usr/local/bin/biliup")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    #[default]
    Client,
    App,
    Web,
}

impl SubmitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitMode::Client => "client",
            SubmitMode::App => "app",
            SubmitMode::Web => "web",
        }
    }
}

/// Whether a published video is the uploader's own work or a repost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Original,
    #[default]
    Repost,
}

impl ContentType {
    /// Numeric copyright code understood by the publish client.
    pub fn code(&self) -> &'static str {
        match self {
            ContentType::Original => "1",
            ContentType::Repost => "2",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub history_path: PathBuf,
    pub failed_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_rclone")]
    pub rclone: PathBuf,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    #[serde(default = "default_fusermount")]
    pub fusermount: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            rclone: default_rclone(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            fusermount: default_fusermount(),
        }
    }
}

fn default_rclone() -> PathBuf {
    PathBuf::from("rclone")
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_fusermount() -> PathBuf {
    PathBuf::from("fusermount")
}

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Converts a size in GiB to bytes.
pub fn gb_to_bytes(gb: f64) -> u64 {
    (gb * BYTES_PER_GB) as u64
}

/// Converts a byte count to GiB.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}
