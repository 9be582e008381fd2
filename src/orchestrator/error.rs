use std::path::PathBuf;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::resolver::ResolveError;
use crate::tools::ToolError;

/// Why one attempt at an upload task failed.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(
        "insufficient disk space: {free} bytes free, file needs {size} bytes and {floor} bytes must stay free"
    )]
    InsufficientSpace { free: u64, size: u64, floor: u64 },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("split failed: {0}")]
    SplitPlanning(String),

    #[error("segment {index} of {total} failed to publish: {source}")]
    SegmentPublish {
        index: usize,
        total: usize,
        #[source]
        source: ToolError,
    },

    #[error("file not found: {0}")]
    MissingFile(PathBuf),

    #[error("scratch directory error on '{path}': {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl TaskError {
    /// Whether a later attempt can plausibly succeed. Space exhaustion and an
    /// unsplittable file will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskError::InsufficientSpace { .. } | TaskError::SplitPlanning(_) => false,
            TaskError::Interrupted => false,
            TaskError::Tool(_)
            | TaskError::SegmentPublish { .. }
            | TaskError::MissingFile(_)
            | TaskError::Scratch { .. }
            | TaskError::Ledger(_) => true,
        }
    }
}

impl From<ResolveError> for TaskError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::InsufficientSpace { free, size, floor } => {
                TaskError::InsufficientSpace { free, size, floor }
            }
            ResolveError::SpaceProbe { path, source } => TaskError::Scratch { path, source },
            ResolveError::Download(e) => TaskError::Tool(e),
            ResolveError::MissingFile(path) => TaskError::MissingFile(path),
        }
    }
}
