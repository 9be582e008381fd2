use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use super::process::{command, program_name, run_captured, run_checked, run_streaming};
use super::{RemoteStorage, ToolError};
use crate::config::Config;

/// Time given to a daemonised `rclone mount` before the mount point is checked.
const MOUNT_SETTLE: Duration = Duration::from_secs(3);

/// [`RemoteStorage`] backed by the rclone CLI.
pub struct RcloneStorage {
    rclone: PathBuf,
    fusermount: PathBuf,
    remote: String,
    backup_path: String,
    mount_point: PathBuf,
    extension: String,
    mounted: AtomicBool,
}

impl RcloneStorage {
    pub fn new(config: &Config) -> Self {
        Self {
            rclone: config.tools.rclone.clone(),
            fusermount: config.tools.fusermount.clone(),
            remote: config.remote.name.clone(),
            backup_path: config.remote.backup_path.clone(),
            mount_point: config.remote.mount_point.clone(),
            extension: config.source.extension.clone(),
            mounted: AtomicBool::new(false),
        }
    }

    /// `<remote>:<backup_path>[/<sub_path>]`
    pub fn remote_path(&self, sub_path: &str) -> String {
        if sub_path.is_empty() {
            format!("{}:{}", self.remote, self.backup_path)
        } else {
            format!("{}:{}/{}", self.remote, self.backup_path, sub_path)
        }
    }

    fn name(&self) -> String {
        program_name(&self.rclone)
    }
}

#[async_trait]
impl RemoteStorage for RcloneStorage {
    async fn list_groups(&self) -> Result<Vec<String>, ToolError> {
        let mut cmd = command(&self.rclone);
        cmd.arg("lsd").arg(self.remote_path(""));
        let stdout = run_checked(&mut cmd, &self.name()).await?;
        Ok(parse_lsd(&stdout))
    }

    async fn list_files(&self, group: &str) -> Result<Vec<String>, ToolError> {
        let mut cmd = command(&self.rclone);
        cmd.arg("lsf")
            .arg("--files-only")
            .arg("--include")
            .arg(format!("*.{}", self.extension))
            .arg(self.remote_path(group));
        let stdout = run_checked(&mut cmd, &self.name()).await?;

        let mut files: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        files.sort();
        Ok(files)
    }

    async fn file_size(&self, group: &str, filename: &str) -> Result<u64, ToolError> {
        let mut cmd = command(&self.rclone);
        cmd.arg("size")
            .arg("--json")
            .arg(self.remote_path(&format!("{}/{}", group, filename)));
        let stdout = run_checked(&mut cmd, &self.name()).await?;
        parse_size_json(&stdout).map_err(|message| ToolError::Output {
            program: self.name(),
            message,
        })
    }

    async fn bulk_sizes(&self, group: &str) -> Result<HashMap<String, u64>, ToolError> {
        let mut cmd = command(&self.rclone);
        cmd.arg("ls").arg(self.remote_path(group));
        let stdout = run_checked(&mut cmd, &self.name()).await?;
        Ok(parse_ls(&stdout))
    }

    async fn mount(&self) -> Result<(), ToolError> {
        if self.mounted.load(Ordering::SeqCst) {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.mount_point)
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.name(),
                source,
            })?;

        let mut cmd = command(&self.rclone);
        cmd.arg("mount")
            .arg(self.remote_path(""))
            .arg(&self.mount_point)
            .arg("--daemon")
            .arg("--vfs-cache-mode")
            .arg("writes")
            .arg("--allow-other");
        run_checked(&mut cmd, &self.name()).await?;

        tokio::time::sleep(MOUNT_SETTLE).await;

        let populated = std::fs::read_dir(&self.mount_point)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);

        if !populated {
            warn!(mount_point = %self.mount_point.display(), "Mount point is empty after mounting");
            return Err(ToolError::Output {
                program: self.name(),
                message: format!(
                    "mount point {} is empty after mounting",
                    self.mount_point.display()
                ),
            });
        }

        self.mounted.store(true, Ordering::SeqCst);
        info!(mount_point = %self.mount_point.display(), "Remote mounted");
        Ok(())
    }

    async fn unmount(&self) -> Result<(), ToolError> {
        if !self.mounted.load(Ordering::SeqCst) {
            return Ok(());
        }

        let name = program_name(&self.fusermount);
        let mut cmd = command(&self.fusermount);
        cmd.arg("-u").arg(&self.mount_point);
        run_checked(&mut cmd, &name).await?;

        self.mounted.store(false, Ordering::SeqCst);
        info!(mount_point = %self.mount_point.display(), "Remote unmounted");
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_dir: &Path) -> Result<(), ToolError> {
        tokio::fs::create_dir_all(local_dir)
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.name(),
                source,
            })?;

        info!(remote_path, local_dir = %local_dir.display(), "Downloading from remote");

        let mut cmd = command(&self.rclone);
        cmd.arg("copy")
            .arg(self.remote_path(remote_path))
            .arg(local_dir)
            .arg("--progress")
            .arg("--stats")
            .arg("1s");
        run_streaming(&mut cmd, &self.name(), "").await?;
        Ok(())
    }

    async fn test_connection<'a>(&self, target: Option<&'a str>) -> Result<bool, ToolError> {
        let remote = target.unwrap_or(&self.remote);
        let mut cmd = command(&self.rclone);
        cmd.arg("lsd")
            .arg(format!("{}:{}", remote, self.backup_path))
            .arg("--max-depth")
            .arg("1");
        let output = run_captured(&mut cmd, &self.name()).await?;
        Ok(output.status.success())
    }

    async fn list_remotes(&self) -> Result<Vec<String>, ToolError> {
        let mut cmd = command(&self.rclone);
        cmd.arg("listremotes");
        let stdout = run_checked(&mut cmd, &self.name()).await?;
        Ok(stdout
            .lines()
            .map(|l| l.trim().trim_end_matches(':').to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

/// Directory names from `rclone lsd`, whose lines look like
/// `          -1 2025-09-27 06:31:34        -1 22603245-Streamer`.
fn parse_lsd(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() > 4 {
                Some(parts[4..].join(" "))
            } else {
                None
            }
        })
        .collect()
}

/// `<bytes> <name>` pairs from `rclone ls`.
fn parse_ls(stdout: &str) -> HashMap<String, u64> {
    stdout
        .lines()
        .filter_map(|line| {
            let (size, name) = line.trim().split_once(char::is_whitespace)?;
            let size = size.parse().ok()?;
            Some((name.trim_start().to_string(), size))
        })
        .collect()
}

#[derive(Deserialize)]
struct SizeOutput {
    bytes: u64,
}

fn parse_size_json(stdout: &str) -> Result<u64, String> {
    serde_json::from_str::<SizeOutput>(stdout)
        .map(|s| s.bytes)
        .map_err(|e| format!("invalid size JSON: {}", e))
}
