//! Decides where the media tool reads a recording from: the remote mount when
//! possible, a local download otherwise.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::types::{bytes_to_gb, gb_to_bytes};
use crate::config::Config;
use crate::tools::{RemoteStorage, ToolError};

/// Scratch subdirectory holding downloaded sources.
pub const DOWNLOADS_DIR: &str = "downloads";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(
        "insufficient disk space: {free} bytes free, file needs {size} bytes and {floor} bytes must stay free"
    )]
    InsufficientSpace { free: u64, size: u64, floor: u64 },

    #[error("cannot determine free space on '{path}': {source}")]
    SpaceProbe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download failed: {0}")]
    Download(#[from] ToolError),

    #[error("file not found after download: {0}")]
    MissingFile(PathBuf),
}

/// Free-space probe for the scratch filesystem.
#[cfg_attr(test, mockall::automock)]
pub trait DiskSpace: Send + Sync {
    fn available(&self, path: &Path) -> std::io::Result<u64>;
}

/// [`DiskSpace`] answered by `statvfs` through `fs2`.
pub struct Fs2DiskSpace;

impl DiskSpace for Fs2DiskSpace {
    fn available(&self, path: &Path) -> std::io::Result<u64> {
        fs2::available_space(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOrigin {
    Mounted,
    Downloaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: PathBuf,
    pub origin: PathOrigin,
}

pub struct PathResolver {
    storage: Arc<dyn RemoteStorage>,
    disk: Box<dyn DiskSpace>,
    mount_point: PathBuf,
    scratch_root: PathBuf,
    min_free: u64,
    mount_attempted: bool,
    mounted: bool,
}

impl PathResolver {
    pub fn new(config: &Config, storage: Arc<dyn RemoteStorage>, disk: Box<dyn DiskSpace>) -> Self {
        Self {
            storage,
            disk,
            mount_point: config.remote.mount_point.clone(),
            scratch_root: config.upload.local_cache_path.clone(),
            min_free: gb_to_bytes(config.upload.min_free_space_gb),
            mount_attempted: false,
            mounted: false,
        }
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.scratch_root.join(DOWNLOADS_DIR)
    }

    /// Returns a readable path for `remote_path` (`<group>/<filename>`).
    ///
    /// Tasks that need splitting always get a local copy; other tasks use the
    /// mount when it is up and holds the file.
    pub async fn resolve(
        &mut self,
        remote_path: &str,
        size: u64,
        needs_split: bool,
    ) -> Result<ResolvedPath, ResolveError> {
        if !needs_split {
            if let Some(path) = self.mounted_path(remote_path).await {
                info!(path = %path.display(), "Using mounted file");
                return Ok(ResolvedPath {
                    path,
                    origin: PathOrigin::Mounted,
                });
            }
        }

        self.download(remote_path, size).await
    }

    async fn mounted_path(&mut self, remote_path: &str) -> Option<PathBuf> {
        if !self.mount_attempted {
            self.mount_attempted = true;
            match self.storage.mount().await {
                Ok(()) => self.mounted = true,
                Err(e) => warn!(error = %e, "Mount failed, falling back to downloads for this run"),
            }
        }

        if !self.mounted {
            return None;
        }

        let path = self.mount_point.join(remote_path);
        if path.exists() {
            Some(path)
        } else {
            debug!(path = %path.display(), "File not present under mount point");
            None
        }
    }

    async fn download(&self, remote_path: &str, size: u64) -> Result<ResolvedPath, ResolveError> {
        let local_dir = self.downloads_dir();
        std::fs::create_dir_all(&local_dir).map_err(|source| ResolveError::SpaceProbe {
            path: local_dir.clone(),
            source,
        })?;

        let free = self
            .disk
            .available(&local_dir)
            .map_err(|source| ResolveError::SpaceProbe {
                path: local_dir.clone(),
                source,
            })?;

        if size > free || free - size < self.min_free {
            warn!(
                free_gb = format!("{:.2}", bytes_to_gb(free)),
                size_gb = format!("{:.2}", bytes_to_gb(size)),
                floor_gb = format!("{:.2}", bytes_to_gb(self.min_free)),
                "Not enough disk space to download"
            );
            return Err(ResolveError::InsufficientSpace {
                free,
                size,
                floor: self.min_free,
            });
        }

        self.storage.download(remote_path, &local_dir).await?;

        let filename = Path::new(remote_path)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(remote_path));
        let path = local_dir.join(filename);
        if !path.exists() {
            return Err(ResolveError::MissingFile(path));
        }

        info!(path = %path.display(), "Download complete");
        Ok(ResolvedPath {
            path,
            origin: PathOrigin::Downloaded,
        })
    }

    /// Unmounts the remote if this run mounted it.
    pub async fn teardown(&mut self) {
        if !self.mounted {
            return;
        }
        if let Err(e) = self.storage.unmount().await {
            warn!(error = %e, "Failed to unmount remote");
        }
        self.mounted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::tools::MockRemoteStorage;
    use tempfile::TempDir;

    const GB: u64 = 1024 * 1024 * 1024;

    fn config_in(dir: &TempDir) -> Config {
        config_with_floor(dir, 5)
    }

    fn config_with_floor(dir: &TempDir, floor_gb: u64) -> Config {
        let yaml = format!(
            r#"
remote:
  name: gdrive
  backup_path: backup
  mount_point: {root}/mnt
upload:
  local_cache_path: {root}/cache
  min_free_space_gb: {floor_gb}
publish:
  cookie_file: {root}/cookies.json
  category: 171
  description_template: "{{streamer_name}}"
  source_template: "{{room_id}}"
ledger:
  history_path: {root}/history.json
  failed_path: {root}/failed.json
"#,
            root = dir.path().display(),
            floor_gb = floor_gb
        );
        parse_config(&yaml).unwrap()
    }

    fn disk_with(free: u64) -> Box<MockDiskSpace> {
        let mut disk = MockDiskSpace::new();
        disk.expect_available().returning(move |_| Ok(free));
        Box::new(disk)
    }

    #[tokio::test]
    async fn test_space_floor_rejects_before_download() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let mut storage = MockRemoteStorage::new();
        storage.expect_download().times(0);

        let mut resolver = PathResolver::new(&config, Arc::new(storage), disk_with(10 * GB));
        let result = resolver.resolve("1-a/big.flv", 8 * GB, true).await;

        assert!(matches!(
            result,
            Err(ResolveError::InsufficientSpace { free, size, .. }) if free == 10 * GB && size == 8 * GB
        ));
    }

    #[tokio::test]
    async fn test_zero_floor_rejects_file_larger_than_free() {
        let dir = TempDir::new().unwrap();
        let config = config_with_floor(&dir, 0);

        let mut storage = MockRemoteStorage::new();
        storage.expect_download().times(0);

        let mut resolver = PathResolver::new(&config, Arc::new(storage), disk_with(GB));
        let result = resolver.resolve("1-a/big.flv", 8 * GB, true).await;

        assert!(matches!(
            result,
            Err(ResolveError::InsufficientSpace { free, size, floor })
                if free == GB && size == 8 * GB && floor == 0
        ));
    }

    #[tokio::test]
    async fn test_zero_floor_allows_exact_fit() {
        let dir = TempDir::new().unwrap();
        let config = config_with_floor(&dir, 0);

        let mut storage = MockRemoteStorage::new();
        storage
            .expect_download()
            .times(1)
            .returning(|remote, local_dir| {
                let name = Path::new(remote).file_name().unwrap();
                std::fs::write(local_dir.join(name), b"video").unwrap();
                Ok(())
            });

        let mut resolver = PathResolver::new(&config, Arc::new(storage), disk_with(8 * GB));
        let resolved = resolver.resolve("1-a/fit.flv", 8 * GB, true).await.unwrap();
        assert_eq!(resolved.origin, PathOrigin::Downloaded);
    }

    #[tokio::test]
    async fn test_mounted_file_is_used_without_download() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        std::fs::create_dir_all(dir.path().join("mnt/1-a")).unwrap();
        std::fs::write(dir.path().join("mnt/1-a/rec.flv"), b"video").unwrap();

        let mut storage = MockRemoteStorage::new();
        storage.expect_mount().times(1).returning(|| Ok(()));
        storage.expect_download().times(0);
        storage.expect_unmount().times(1).returning(|| Ok(()));

        let mut resolver =
            PathResolver::new(&config, Arc::new(storage), Box::new(MockDiskSpace::new()));

        let first = resolver.resolve("1-a/rec.flv", 5, false).await.unwrap();
        assert_eq!(first.origin, PathOrigin::Mounted);
        assert_eq!(first.path, dir.path().join("mnt/1-a/rec.flv"));

        // Mount is attempted once per run
        let second = resolver.resolve("1-a/rec.flv", 5, false).await.unwrap();
        assert_eq!(second.origin, PathOrigin::Mounted);

        resolver.teardown().await;
    }

    #[tokio::test]
    async fn test_split_task_downloads_even_when_mounted() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let mut storage = MockRemoteStorage::new();
        storage.expect_mount().times(0);
        storage
            .expect_download()
            .times(1)
            .returning(|remote, local_dir| {
                let name = Path::new(remote).file_name().unwrap();
                std::fs::write(local_dir.join(name), b"video").unwrap();
                Ok(())
            });

        let mut resolver = PathResolver::new(&config, Arc::new(storage), disk_with(100 * GB));
        let resolved = resolver.resolve("1-a/rec.flv", 20 * GB, true).await.unwrap();

        assert_eq!(resolved.origin, PathOrigin::Downloaded);
        assert_eq!(resolved.path, dir.path().join("cache/downloads/rec.flv"));
    }

    #[tokio::test]
    async fn test_failed_mount_falls_back_to_download() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let mut storage = MockRemoteStorage::new();
        storage.expect_mount().times(1).returning(|| {
            Err(ToolError::Output {
                program: "rclone".into(),
                message: "empty mount".into(),
            })
        });
        storage.expect_download().times(1).returning(|_, _| Ok(()));

        let mut resolver = PathResolver::new(&config, Arc::new(storage), disk_with(100 * GB));
        let result = resolver.resolve("1-a/rec.flv", GB, false).await;

        // Download "succeeded" but produced nothing
        assert!(matches!(result, Err(ResolveError::MissingFile(_))));
    }
}
