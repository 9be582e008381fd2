//! Persisted upload history.
//!
//! Two JSON arrays on disk: the success log (dedup source of truth) and the
//! failure log (attempt history). Both are read fully at startup and rewritten
//! through a temp file + rename on every mutation.

pub mod entry;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub use entry::{FailureEntry, LedgerEntry};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

pub struct Ledger {
    history_path: PathBuf,
    failed_path: PathBuf,
    successes: Vec<LedgerEntry>,
    failures: Vec<FailureEntry>,
}

impl Ledger {
    /// Loads both logs. A missing or unreadable file yields an empty log and a
    /// warning, so a damaged ledger never blocks new uploads.
    pub fn open(history_path: impl Into<PathBuf>, failed_path: impl Into<PathBuf>) -> Self {
        let history_path = history_path.into();
        let failed_path = failed_path.into();

        let successes: Vec<LedgerEntry> = load_list(&history_path, "upload history");
        let failures: Vec<FailureEntry> = load_list(&failed_path, "failure log");

        info!(
            successes = successes.len(),
            failures = failures.len(),
            path = %history_path.display(),
            "Ledger loaded"
        );

        Self {
            history_path,
            failed_path,
            successes,
            failures,
        }
    }

    pub fn successes(&self) -> &[LedgerEntry] {
        &self.successes
    }

    pub fn failures(&self) -> &[FailureEntry] {
        &self.failures
    }

    /// True iff a success entry with exactly this (path, size) fingerprint exists.
    pub fn is_uploaded(&self, path: &str, size: u64) -> bool {
        self.successes.iter().any(|e| e.matches(path, size))
    }

    /// Records a completed upload and persists the success log.
    ///
    /// A fingerprint that is already recorded is left as is.
    pub fn add_success(
        &mut self,
        path: &str,
        size: u64,
        remote_id: Option<String>,
        is_split: bool,
        parts: Vec<String>,
    ) -> Result<()> {
        if self.is_uploaded(path, size) {
            debug!(path, size, "Fingerprint already recorded, not adding a second entry");
            return Ok(());
        }

        self.successes.push(LedgerEntry {
            source_path: path.to_string(),
            size,
            remote_id: remote_id.clone(),
            timestamp: Utc::now(),
            is_split,
            parts,
        });

        if let Err(e) = write_json_atomic(&self.history_path, &self.successes) {
            self.successes.pop();
            return Err(e);
        }

        info!(path, remote_id = ?remote_id, "Recorded upload success");
        Ok(())
    }

    /// Appends a failure entry and persists the failure log.
    pub fn add_failed(&mut self, path: &str, message: &str) -> Result<()> {
        self.failures.push(FailureEntry {
            source_path: path.to_string(),
            error: message.to_string(),
            timestamp: Utc::now(),
        });

        if let Err(e) = write_json_atomic(&self.failed_path, &self.failures) {
            self.failures.pop();
            return Err(e);
        }

        warn!(path, error = message, "Recorded upload failure");
        Ok(())
    }

    /// Splits `filenames` of `group` into (uploaded, not uploaded) counts.
    /// Keyed by path only, which is enough for summary display.
    pub fn count_uploaded(&self, filenames: &[String], group: &str) -> (usize, usize) {
        let recorded: HashSet<&str> = self
            .successes
            .iter()
            .map(|e| e.source_path.as_str())
            .collect();

        let uploaded = filenames
            .iter()
            .filter(|name| recorded.contains(format!("{}/{}", group, name).as_str()))
            .count();

        (uploaded, filenames.len() - uploaded)
    }

    /// Checks every success entry's remote id with `exists` and drops the ones
    /// that no longer resolve (or never had an id), logging each as a failure.
    ///
    /// The success log is rewritten as a whole; if that write fails the ledger
    /// is left untouched and the error is returned.
    pub async fn revalidate<F, Fut>(&mut self, mut exists: F) -> Result<(usize, usize)>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut valid = Vec::with_capacity(self.successes.len());
        let mut invalid = Vec::new();

        for entry in &self.successes {
            let keep = match &entry.remote_id {
                Some(id) if !id.is_empty() => exists(id.clone()).await,
                _ => false,
            };

            if keep {
                valid.push(entry.clone());
            } else {
                invalid.push(entry.clone());
            }
        }

        let checked = self.successes.len();
        let removed = invalid.len();

        if removed == 0 {
            info!(checked, "Ledger revalidated, all entries valid");
            return Ok((checked, 0));
        }

        write_json_atomic(&self.history_path, &valid)?;
        self.successes = valid;

        for entry in &invalid {
            let remote_id = entry.remote_id.as_deref().unwrap_or("<none>");
            warn!(
                path = %entry.source_path,
                remote_id,
                "Remote video missing, removing from upload history"
            );
            self.failures.push(FailureEntry {
                source_path: entry.source_path.clone(),
                error: format!(
                    "history revalidation failed: remote video {} no longer exists",
                    remote_id
                ),
                timestamp: Utc::now(),
            });
        }

        // The success log is already committed at this point; a failure-log
        // write error only loses the explanatory entries.
        if let Err(e) = write_json_atomic(&self.failed_path, &self.failures) {
            warn!(error = %e, "Failed to persist revalidation failures");
        }

        info!(checked, removed, "Ledger revalidated");
        Ok((checked, removed))
    }
}

fn load_list<T: DeserializeOwned>(path: &Path, what: &str) -> Vec<T> {
    if !path.exists() {
        return Vec::new();
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|data| serde_json::from_str::<Vec<T>>(&data).map_err(|e| e.to_string()));

    match parsed {
        Ok(list) => list,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load {}, starting empty", what);
            Vec::new()
        }
    }
}

/// Writes `value` as pretty JSON to a sibling temp file, then renames it over `path`.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let io_err = |source: std::io::Error| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    debug!(path = %path.display(), "Ledger file written");
    Ok(())
}
