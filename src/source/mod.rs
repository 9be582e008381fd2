//! Recording identity: group folders and recording filenames.

pub mod record;

pub use record::{format_size, GroupInfo, RecordParser, SourceRecord};
