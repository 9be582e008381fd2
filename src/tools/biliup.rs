use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

use super::process::{command, program_name, run_captured, run_interactive, run_streaming};
use super::{PublishClient, PublishRequest, RemoteVideo, ToolError};
use crate::config::types::{PublishConfig, SubmitMode};

/// [`PublishClient`] backed by the biliup CLI.
pub struct BiliupClient {
    executable: PathBuf,
    cookie_file: PathBuf,
    proxy: Option<String>,
    submit: SubmitMode,
}

impl BiliupClient {
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            cookie_file: config.cookie_file.clone(),
            proxy: config.proxy.clone().filter(|p| !p.is_empty()),
            submit: config.submit,
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// `biliup -u <cookies> [-p <proxy>] <subcommand...>`
    fn base_command(&self, subcommand: &[&str]) -> Command {
        let mut cmd = command(&self.executable);
        cmd.arg("-u").arg(&self.cookie_file);
        if let Some(proxy) = &self.proxy {
            cmd.arg("-p").arg(proxy);
        }
        cmd.args(subcommand);
        cmd
    }

    fn name(&self) -> String {
        program_name(&self.executable)
    }
}

#[async_trait]
impl PublishClient for BiliupClient {
    async fn create(&self, request: &PublishRequest) -> Result<String, ToolError> {
        let mut cmd = self.base_command(&["upload"]);
        cmd.arg("--submit")
            .arg(self.submit.as_str())
            .arg("--title")
            .arg(&request.title)
            .arg("--desc")
            .arg(&request.description)
            .arg("--tid")
            .arg(request.category.to_string())
            .arg("--tag")
            .arg(request.tags.join(","))
            .arg("--source")
            .arg(&request.source_note)
            .arg("--copyright")
            .arg(request.content_type.code());
        if let Some(cover) = request.cover.as_ref().filter(|c| c.exists()) {
            cmd.arg("--cover").arg(cover);
        }
        cmd.arg(&request.video);

        info!(title = %request.title, tags = %request.tags.join(","), "Uploading new video");
        let output = run_streaming(&mut cmd, &self.name(), "").await?;

        parse_video_id(&output).ok_or_else(|| ToolError::Output {
            program: self.name(),
            message: "upload finished but no video id found in output".to_string(),
        })
    }

    async fn append(
        &self,
        path: &Path,
        remote_id: &str,
        part_title: &str,
    ) -> Result<(), ToolError> {
        info!(remote_id, part_title, "Appending part");
        let mut cmd = self.base_command(&["append", "--vid", remote_id]);
        cmd.arg(path);
        run_streaming(&mut cmd, &self.name(), "").await?;
        Ok(())
    }

    async fn list_recent(&self, count: usize) -> Result<Vec<RemoteVideo>, ToolError> {
        let mut cmd = self.base_command(&["list", "--max-pages", "1", "--from-page", "1"]);
        let output = run_captured(&mut cmd, &self.name()).await?;
        if !output.status.success() {
            return Err(ToolError::Exit {
                program: self.name(),
                status: output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "terminated by signal".to_string()),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut videos = parse_video_list(&String::from_utf8_lossy(&output.stdout));
        videos.truncate(count);
        Ok(videos)
    }

    async fn exists(&self, remote_id: &str) -> bool {
        if remote_id.is_empty() {
            return false;
        }

        let mut cmd = self.base_command(&["show", remote_id]);
        let output = match run_captured(&mut cmd, &self.name()).await {
            Ok(output) => output,
            Err(e) => {
                warn!(remote_id, error = %e, "Existence check could not run");
                return false;
            }
        };

        if !output.status.success() {
            warn!(remote_id, status = ?output.status.code(), "Existence check failed");
            return false;
        }

        show_output_is_valid(&String::from_utf8_lossy(&output.stdout))
    }

    async fn login(&self) -> Result<(), ToolError> {
        let mut cmd = self.base_command(&["login"]);
        run_interactive(&mut cmd, &self.name()).await
    }

    async fn check_login(&self) -> bool {
        let mut cmd = self.base_command(&["list", "--max-pages", "1"]);
        match run_captured(&mut cmd, &self.name()).await {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                warn!(
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Login check failed"
                );
                false
            }
            Err(e) => {
                warn!(error = %e, "Login check could not run");
                false
            }
        }
    }
}

fn parse_video_id(output: &str) -> Option<String> {
    let re = Regex::new(r"bvid:\s*(BV\w+)").unwrap();
    re.captures(output).map(|caps| caps[1].to_string())
}

/// Tab-separated `<id>\t<title>\t<status>` lines, possibly colored.
fn parse_video_list(stdout: &str) -> Vec<RemoteVideo> {
    let ansi = Regex::new(r"\x1b\[[0-9;]*m").unwrap();

    stdout
        .lines()
        .filter_map(|raw| {
            let line = ansi.replace_all(raw, "");
            let parts: Vec<&str> = line.trim().split('\t').map(str::trim).collect();
            if parts.len() < 3 {
                return None;
            }
            Some(RemoteVideo {
                id: parts[0].to_string(),
                title: parts[1].to_string(),
                status: parts[2].to_string(),
            })
        })
        .collect()
}

/// `show` prints JSON for existing videos; a non-zero `code` means the video is gone.
/// Non-JSON output is accepted as success.
fn show_output_is_valid(stdout: &str) -> bool {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return false;
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => match map.get("code").and_then(|c| c.as_i64()) {
            Some(code) => code == 0,
            None => true,
        },
        _ => true,
    }
}
