use std::fmt;

use crate::config::ContentType;
use crate::source::SourceRecord;

/// Where a task's video ends up on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMode {
    CreateNew { content_type: ContentType },
    AppendTo { remote_id: String },
}

/// One recording to publish. Lives for a single batch, retries included.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub record: SourceRecord,
    pub mode: TaskMode,
}

impl UploadTask {
    pub fn create(record: SourceRecord, content_type: ContentType) -> Self {
        Self {
            record,
            mode: TaskMode::CreateNew { content_type },
        }
    }

    pub fn append(record: SourceRecord, remote_id: impl Into<String>) -> Self {
        Self {
            record,
            mode: TaskMode::AppendTo {
                remote_id: remote_id.into(),
            },
        }
    }
}

/// Progress of a task through one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    ResolvingPath,
    Direct,
    Splitting,
    Publishing,
    Recorded,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::ResolvingPath => "resolving-path",
            TaskState::Direct => "direct",
            TaskState::Splitting => "splitting",
            TaskState::Publishing => "publishing",
            TaskState::Recorded => "recorded",
        };
        f.write_str(name)
    }
}

/// Result of a successful attempt, before it is written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub remote_id: String,
    pub is_split: bool,
    pub parts: Vec<String>,
}
