use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A completed upload. Never mutated once written; only revalidation removes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub source_path: String,
    pub size: u64,
    #[serde(default)]
    pub remote_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_split: bool,
    /// Segment names in publish order, empty unless `is_split`.
    #[serde(default)]
    pub parts: Vec<String>,
}

impl LedgerEntry {
    pub fn matches(&self, path: &str, size: u64) -> bool {
        self.source_path == path && self.size == size
    }
}

/// One failed attempt history item. Repeated failures are all kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub source_path: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}
