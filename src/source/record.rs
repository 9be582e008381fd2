use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::path::Path;

use crate::config::types::bytes_to_gb;

const UNKNOWN_STREAMER: &str = "unknown";
const UNKNOWN_DATE: &str = "unknown";

/// Identity of a remote group (one folder per live room).
///
/// Folders are named `<room-id>-<streamer-name>`; a folder without a dash is
/// the room id and has no streamer name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub name: String,
    pub room_id: String,
    pub streamer_name: String,
}

impl GroupInfo {
    pub fn parse(name: &str) -> Self {
        let (room_id, streamer_name) = match name.split_once('-') {
            Some((room, streamer)) => (room.to_string(), streamer.to_string()),
            None => (name.to_string(), String::new()),
        };

        Self {
            name: name.to_string(),
            room_id,
            streamer_name,
        }
    }
}

/// One recording file on the remote, with the identity parsed from its name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    pub group: GroupInfo,
    pub filename: String,
    /// Byte size; together with `path()` this is the dedup fingerprint.
    pub size: u64,
    pub streamer_id: String,
    /// `None` when the name did not match or carried an impossible date.
    pub captured_at: Option<NaiveDateTime>,
    pub sequence: u32,
    pub title: String,
}

impl SourceRecord {
    /// Remote-relative path, `<group>/<filename>`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.group.name, self.filename)
    }

    pub fn size_gb(&self) -> f64 {
        bytes_to_gb(self.size)
    }

    pub fn formatted_date(&self) -> String {
        match self.captured_at {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => UNKNOWN_DATE.to_string(),
        }
    }

    /// Whether the filename matched the recording naming convention.
    pub fn is_degraded(&self) -> bool {
        self.streamer_id == UNKNOWN_STREAMER && self.captured_at.is_none()
    }

    /// Renders the publish description. Supports `{streamer_name}` and `{date}`.
    pub fn description(&self, template: &str) -> String {
        template
            .replace("{streamer_name}", &self.group.streamer_name)
            .replace("{date}", &self.formatted_date())
    }

    /// Renders the publish source note. Supports `{room_id}`.
    pub fn source_note(&self, template: &str) -> String {
        template.replace("{room_id}", &self.group.room_id)
    }

    /// Title for segment `index` (1-based) of a split upload.
    pub fn part_title(&self, index: usize) -> String {
        format!("{} - P{}", self.title, index)
    }
}

/// Parses recording filenames of the form
/// `<prefix>-<owner-id>-<YYYYMMDD>-<HHMMSS>-<sequence>-<title>.<ext>`.
#[derive(Debug, Clone)]
pub struct RecordParser {
    pattern: Regex,
    extension: String,
}

impl RecordParser {
    pub fn new(prefix: &str, extension: &str) -> Self {
        let pattern = format!(
            r"^{}-(\d+)-(\d{{8}})-(\d{{6}})-(\d+)-(.+)\.{}$",
            regex::escape(prefix),
            regex::escape(extension)
        );

        Self {
            // Both user-supplied parts are escaped, so the pattern always compiles
            pattern: Regex::new(&pattern).expect("escaped filename pattern is valid"),
            extension: extension.to_string(),
        }
    }

    /// Parses `filename` into a record. Never fails: names that do not match
    /// fall back to an unknown streamer with the file stem as title.
    pub fn parse(&self, filename: &str, group: &GroupInfo, size: u64) -> SourceRecord {
        let Some(captures) = self.pattern.captures(filename) else {
            return self.degraded(filename, group, size);
        };

        let date = &captures[2];
        let time = &captures[3];
        let captured_at =
            NaiveDateTime::parse_from_str(&format!("{}{}", date, time), "%Y%m%d%H%M%S").ok();

        SourceRecord {
            group: group.clone(),
            filename: filename.to_string(),
            size,
            streamer_id: captures[1].to_string(),
            captured_at,
            sequence: captures[4].parse().unwrap_or(0),
            title: captures[5].to_string(),
        }
    }

    fn degraded(&self, filename: &str, group: &GroupInfo, size: u64) -> SourceRecord {
        let suffix = format!(".{}", self.extension);
        let title = filename
            .strip_suffix(&suffix)
            .map(str::to_string)
            .or_else(|| {
                Path::new(filename)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| filename.to_string());

        SourceRecord {
            group: group.clone(),
            filename: filename.to_string(),
            size,
            streamer_id: UNKNOWN_STREAMER.to_string(),
            captured_at: None,
            sequence: 0,
            title,
        }
    }
}

/// Formats a byte count for display, e.g. `1.50 GB`.
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{:.2} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2} PB", size)
}
