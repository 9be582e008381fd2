use recpub::source::{format_size, GroupInfo, RecordParser};

#[test]
fn test_recording_name_round_trip_into_metadata() {
    let group = GroupInfo::parse("1001-Streamer");
    let record = RecordParser::new("REC", "flv").parse(
        "REC-1001-20240115-140000-1-Title.flv",
        &group,
        5 * 1024 * 1024 * 1024,
    );

    assert_eq!(record.path(), "1001-Streamer/REC-1001-20240115-140000-1-Title.flv");
    assert_eq!(record.streamer_id, "1001");
    assert_eq!(record.sequence, 1);
    assert_eq!(record.title, "Title");
    assert_eq!(record.formatted_date(), "2024-01-15 14:00:00");
    assert_eq!(record.size_gb(), 5.0);
    assert!(!record.is_degraded());

    assert_eq!(
        record.description("{streamer_name} recorded {date}"),
        "Streamer recorded 2024-01-15 14:00:00"
    );
    assert_eq!(
        record.source_note("https://live.example.com/{room_id}"),
        "https://live.example.com/1001"
    );
    assert_eq!(record.part_title(2), "Title - P2");
}

#[test]
fn test_foreign_filename_degrades() {
    let group = GroupInfo::parse("1001-Streamer");
    let record = RecordParser::new("REC", "flv").parse("holiday clip.flv", &group, 10);

    assert!(record.is_degraded());
    assert_eq!(record.title, "holiday clip");
    assert_eq!(record.streamer_id, "unknown");
    assert_eq!(record.formatted_date(), "unknown");
    assert_eq!(record.description("{date}"), "unknown");
}

#[test]
fn test_impossible_date_keeps_other_fields() {
    let group = GroupInfo::parse("1001-Streamer");
    let record =
        RecordParser::new("REC", "flv").parse("REC-1001-20241345-250000-7-Late.flv", &group, 10);

    assert!(record.captured_at.is_none());
    assert_eq!(record.streamer_id, "1001");
    assert_eq!(record.sequence, 7);
    assert_eq!(record.title, "Late");
    assert!(!record.is_degraded());
}

#[test]
fn test_group_without_dash() {
    let group = GroupInfo::parse("archive");
    assert_eq!(group.room_id, "archive");
    assert_eq!(group.streamer_name, "");

    let record = RecordParser::new("REC", "flv").parse(
        "REC-1001-20240115-140000-1-Title.flv",
        &group,
        10,
    );
    assert_eq!(record.description("by {streamer_name}"), "by ");
    assert_eq!(record.source_note("{room_id}"), "archive");
}

#[test]
fn test_format_size() {
    assert_eq!(format_size(512), "512.00 B");
    assert_eq!(format_size(1536), "1.50 KB");
    assert_eq!(format_size(15 * 1024 * 1024 * 1024), "15.00 GB");
}
