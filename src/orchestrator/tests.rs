use super::*;
use crate::config::parse_config;
use crate::config::types::gb_to_bytes;
use crate::resolver::MockDiskSpace;
use crate::source::{GroupInfo, RecordParser};
use crate::tools::{
    MockMediaTool, MockPublishClient, MockRemoteStorage, RemoteVideo, ToolError,
};
use async_trait::async_trait;
use mockall::Sequence;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const GROUP: &str = "1001-Streamer";
const FILENAME: &str = "REC-1001-20240115-140000-1-Title.flv";

fn test_config(dir: &TempDir, attempts: u32, skip_non_retryable: bool) -> Config {
    config_with_delay(dir, attempts, skip_non_retryable, "0s")
}

fn config_with_delay(
    dir: &TempDir,
    attempts: u32,
    skip_non_retryable: bool,
    delay: &str,
) -> Config {
    let yaml = format!(
        r#"
remote:
  name: gdrive
  backup_path: backup
  mount_point: {root}/mnt
source:
  filename_prefix: REC
  extension: flv
upload:
  max_file_size_gb: 15
  split_part_size_gb: 14.5
  local_cache_path: {root}/cache
  min_free_space_gb: 5
retry:
  attempts: {attempts}
  delay: {delay}
  skip_non_retryable: {skip_non_retryable}
cover:
  extract_time_sec: 1
publish:
  cookie_file: {root}/cookies.json
  category: 171
  tags: [live]
  description_template: "{{streamer_name}} {{date}}"
  source_template: "https://live.example.com/{{room_id}}"
ledger:
  history_path: {root}/history.json
  failed_path: {root}/failed.json
"#,
        root = dir.path().display(),
        delay = delay,
    );
    parse_config(&yaml).unwrap()
}

fn record(size_gb: f64) -> SourceRecord {
    record_named(FILENAME, size_gb)
}

fn record_named(filename: &str, size_gb: f64) -> SourceRecord {
    RecordParser::new("REC", "flv").parse(filename, &GroupInfo::parse(GROUP), gb_to_bytes(size_gb))
}

/// Puts the recording where the mount would expose it.
fn place_under_mount(dir: &TempDir) {
    let group_dir = dir.path().join("mnt").join(GROUP);
    fs::create_dir_all(&group_dir).unwrap();
    fs::write(group_dir.join(FILENAME), b"video").unwrap();
}

fn no_cover() -> MockMediaTool {
    let mut media = MockMediaTool::new();
    media.expect_extract_cover().returning(|_, _, _| false);
    media
}

fn mounted_storage() -> MockRemoteStorage {
    let mut storage = MockRemoteStorage::new();
    storage.expect_mount().times(1).returning(|| Ok(()));
    storage.expect_unmount().returning(|| Ok(()));
    storage
}

fn downloading_storage() -> MockRemoteStorage {
    let mut storage = MockRemoteStorage::new();
    storage.expect_download().returning(|remote, local_dir| {
        let name = Path::new(remote).file_name().unwrap();
        fs::write(local_dir.join(name), b"video").unwrap();
        Ok(())
    });
    storage
}

fn plenty_of_space() -> MockDiskSpace {
    let mut disk = MockDiskSpace::new();
    disk.expect_available()
        .returning(|_| Ok(gb_to_bytes(1000.0)));
    disk
}

fn splitting_media(duration: f64) -> MockMediaTool {
    let mut media = MockMediaTool::new();
    media.expect_duration().returning(move |_| Some(duration));
    media.expect_cut().returning(|_, _, _, out| {
        fs::write(out, b"segment").unwrap();
        true
    });
    media.expect_extract_cover().returning(|_, _, _| false);
    media
}

fn publish_error() -> ToolError {
    ToolError::Exit {
        program: "biliup".into(),
        status: "1".into(),
        output: "upload rejected".into(),
    }
}

fn build(
    config: &Config,
    storage: MockRemoteStorage,
    disk: MockDiskSpace,
    media: MockMediaTool,
    publisher: MockPublishClient,
) -> UploadOrchestrator {
    let ledger = Ledger::open(
        config.ledger.history_path.clone(),
        config.ledger.failed_path.clone(),
    );
    let resolver = PathResolver::new(config, Arc::new(storage), Box::new(disk));
    UploadOrchestrator::new(
        config,
        ledger,
        resolver,
        Arc::new(media),
        Arc::new(publisher),
    )
}

#[tokio::test]
async fn test_direct_upload_end_to_end() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 3, false);
    place_under_mount(&dir);

    let mut media = MockMediaTool::new();
    media
        .expect_extract_cover()
        .withf(|_, at, _| *at == 1.0)
        .times(1)
        .returning(|_, _, out| {
            fs::create_dir_all(out.parent().unwrap()).unwrap();
            fs::write(out, b"jpg").unwrap();
            true
        });

    let mut publisher = MockPublishClient::new();
    publisher
        .expect_create()
        .withf(|req| {
            req.title == "Title"
                && req.cover.is_some()
                && req.tags == vec!["live".to_string(), "Streamer".to_string()]
                && req.description == "Streamer 2024-01-15 14:00:00"
                && req.source_note == "https://live.example.com/1001"
        })
        .times(1)
        .returning(|_| Ok("BV1e2e".to_string()));

    let mut orch = build(&config, mounted_storage(), MockDiskSpace::new(), media, publisher);
    let (_tx, rx) = watch::channel(false);
    let stats = orch
        .run_batch(vec![UploadTask::create(record(5.0), ContentType::Repost)], rx)
        .await;

    assert_eq!(stats.success, 1);
    assert_eq!(stats.failed, 0);

    let entries = orch.ledger().successes();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source_path, format!("{}/{}", GROUP, FILENAME));
    assert_eq!(entries[0].remote_id.as_deref(), Some("BV1e2e"));
    assert!(!entries[0].is_split);

    orch.teardown().await;
    assert!(!dir.path().join("cache/covers").exists());
}

#[tokio::test]
async fn test_same_fingerprint_twice_uploads_once() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 3, false);
    place_under_mount(&dir);

    let mut media = MockMediaTool::new();
    media.expect_extract_cover().returning(|_, _, _| false);

    let mut publisher = MockPublishClient::new();
    publisher
        .expect_create()
        .times(1)
        .returning(|_| Ok("BV1once".to_string()));

    let mut orch = build(&config, mounted_storage(), MockDiskSpace::new(), media, publisher);
    let (_tx, rx) = watch::channel(false);
    let tasks = vec![
        UploadTask::create(record(5.0), ContentType::Original),
        UploadTask::create(record(5.0), ContentType::Original),
    ];
    let stats = orch.run_batch(tasks, rx).await;

    assert_eq!(stats.success, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(orch.ledger().successes().len(), 1);
}

#[tokio::test]
async fn test_segment_two_failure_stops_before_segment_three() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 1, false);

    let mut publisher = MockPublishClient::new();
    let mut seq = Sequence::new();
    publisher
        .expect_create()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok("BVsplit".to_string()));
    publisher
        .expect_append()
        .withf(|_, id, title| id == "BVsplit" && title == "Title - P2")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _| Err(publish_error()));
    publisher
        .expect_append()
        .withf(|_, _, title| title == "Title - P3")
        .times(0);

    // 40 GB at 14.5 GB per part is three segments
    let mut orch = build(
        &config,
        downloading_storage(),
        plenty_of_space(),
        splitting_media(300.0),
        publisher,
    );
    let (_tx, rx) = watch::channel(false);
    let stats = orch
        .run_batch(vec![UploadTask::create(record(40.0), ContentType::Repost)], rx)
        .await;

    assert_eq!(stats.failed, 1);
    assert!(orch.ledger().successes().is_empty());
    let failures = orch.ledger().failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].error.contains("segment 2 of 3"));

    // Scratch artifacts of the task are gone
    assert!(!dir.path().join("cache/downloads").join(FILENAME).exists());
    assert!(!dir.path().join("cache/splits/REC-1001-20240115-140000-1-Title").exists());
}

#[tokio::test]
async fn test_split_upload_records_parts_in_order() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 3, false);

    let mut publisher = MockPublishClient::new();
    let mut seq = Sequence::new();
    publisher
        .expect_create()
        .withf(|req| {
            req.video
                .to_string_lossy()
                .ends_with("REC-1001-20240115-140000-1-Title_part1.flv")
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok("BVtwo".to_string()));
    publisher
        .expect_append()
        .withf(|_, id, title| id == "BVtwo" && title == "Title - P2")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _| Ok(()));

    let mut orch = build(
        &config,
        downloading_storage(),
        plenty_of_space(),
        splitting_media(7200.0),
        publisher,
    );
    let (_tx, rx) = watch::channel(false);
    let stats = orch
        .run_batch(vec![UploadTask::create(record(29.0), ContentType::Repost)], rx)
        .await;

    assert_eq!(stats.success, 1);
    let entry = &orch.ledger().successes()[0];
    assert!(entry.is_split);
    assert_eq!(entry.remote_id.as_deref(), Some("BVtwo"));
    assert_eq!(
        entry.parts,
        vec![
            "REC-1001-20240115-140000-1-Title_part1.flv".to_string(),
            "REC-1001-20240115-140000-1-Title_part2.flv".to_string(),
        ]
    );
    // Keyed by the original source, not the segments
    assert!(orch
        .ledger()
        .is_uploaded(&format!("{}/{}", GROUP, FILENAME), gb_to_bytes(29.0)));
}

#[tokio::test]
async fn test_split_append_mode_appends_every_segment() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 1, false);

    let mut publisher = MockPublishClient::new();
    publisher.expect_create().times(0);
    publisher
        .expect_append()
        .withf(|_, id, _| id == "BVexisting")
        .times(2)
        .returning(|_, _, _| Ok(()));

    let mut orch = build(
        &config,
        downloading_storage(),
        plenty_of_space(),
        splitting_media(7200.0),
        publisher,
    );
    let (_tx, rx) = watch::channel(false);
    let stats = orch
        .run_batch(vec![UploadTask::append(record(29.0), "BVexisting")], rx)
        .await;

    assert_eq!(stats.success, 1);
    assert_eq!(
        orch.ledger().successes()[0].remote_id.as_deref(),
        Some("BVexisting")
    );
}

#[tokio::test]
async fn test_retry_exhaustion_records_one_failure() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 3, false);
    place_under_mount(&dir);

    let mut media = MockMediaTool::new();
    media.expect_extract_cover().returning(|_, _, _| false);

    let mut publisher = MockPublishClient::new();
    publisher
        .expect_create()
        .times(3)
        .returning(|_| Err(publish_error()));

    let mut orch = build(&config, mounted_storage(), MockDiskSpace::new(), media, publisher);
    let (_tx, rx) = watch::channel(false);
    let stats = orch
        .run_batch(vec![UploadTask::create(record(5.0), ContentType::Repost)], rx)
        .await;

    assert_eq!(stats.failed, 1);
    assert!(orch.ledger().successes().is_empty());
    assert_eq!(orch.ledger().failures().len(), 1);
}

#[tokio::test]
async fn test_non_retryable_error_fails_fast_when_configured() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 3, true);

    let mut storage = MockRemoteStorage::new();
    storage.expect_download().times(0);

    let mut disk = MockDiskSpace::new();
    disk.expect_available()
        .times(1)
        .returning(|_| Ok(gb_to_bytes(20.0)));

    let mut orch = build(
        &config,
        storage,
        disk,
        MockMediaTool::new(),
        MockPublishClient::new(),
    );
    let (_tx, rx) = watch::channel(false);
    let stats = orch
        .run_batch(vec![UploadTask::create(record(16.0), ContentType::Repost)], rx)
        .await;

    assert_eq!(stats.failed, 1);
    assert!(orch.ledger().failures()[0]
        .error
        .contains("insufficient disk space"));
}

#[tokio::test]
async fn test_interrupt_before_start_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 3, false);

    let mut publisher = MockPublishClient::new();
    publisher.expect_create().times(0);

    let mut orch = build(
        &config,
        MockRemoteStorage::new(),
        MockDiskSpace::new(),
        MockMediaTool::new(),
        publisher,
    );
    let (_tx, rx) = watch::channel(true);
    let stats = orch
        .run_batch(vec![UploadTask::create(record(5.0), ContentType::Repost)], rx)
        .await;

    assert!(stats.interrupted);
    assert_eq!(stats.total(), 0);
    assert!(orch.ledger().failures().is_empty());
}

/// Publisher whose `create` requests shutdown and then never returns, like an
/// upload that is still running when Ctrl+C arrives.
struct StalledPublisher {
    shutdown: watch::Sender<bool>,
    creates: AtomicUsize,
}

#[async_trait]
impl PublishClient for StalledPublisher {
    async fn create(&self, _request: &PublishRequest) -> Result<String, ToolError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let _ = self.shutdown.send(true);
        std::future::pending().await
    }

    async fn append(&self, _: &Path, _: &str, _: &str) -> Result<(), ToolError> {
        Ok(())
    }

    async fn list_recent(&self, _: usize) -> Result<Vec<RemoteVideo>, ToolError> {
        Ok(Vec::new())
    }

    async fn exists(&self, _: &str) -> bool {
        true
    }

    async fn login(&self) -> Result<(), ToolError> {
        Ok(())
    }

    async fn check_login(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn test_interrupt_during_publish_abandons_task_and_batch() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 3, false);
    place_under_mount(&dir);

    let (tx, rx) = watch::channel(false);
    let publisher = Arc::new(StalledPublisher {
        shutdown: tx,
        creates: AtomicUsize::new(0),
    });

    let ledger = Ledger::open(
        config.ledger.history_path.clone(),
        config.ledger.failed_path.clone(),
    );
    let resolver = PathResolver::new(
        &config,
        Arc::new(mounted_storage()),
        Box::new(MockDiskSpace::new()),
    );
    let mut orch = UploadOrchestrator::new(
        &config,
        ledger,
        resolver,
        Arc::new(no_cover()),
        publisher.clone(),
    );

    let tasks = vec![
        UploadTask::create(record(5.0), ContentType::Repost),
        UploadTask::create(
            record_named("REC-1001-20240115-160000-2-Later.flv", 5.0),
            ContentType::Repost,
        ),
    ];
    let stats = orch.run_batch(tasks, rx).await;

    assert!(stats.interrupted);
    assert_eq!(stats.total(), 0);
    // The second task never reached the publisher
    assert_eq!(publisher.creates.load(Ordering::SeqCst), 1);
    assert!(orch.ledger().successes().is_empty());
    assert!(orch.ledger().failures().is_empty());
}

#[tokio::test]
async fn test_interrupt_while_waiting_to_retry_records_nothing() {
    let dir = TempDir::new().unwrap();
    let config = config_with_delay(&dir, 3, false, "1h");
    place_under_mount(&dir);

    let (tx, rx) = watch::channel(false);
    let mut publisher = MockPublishClient::new();
    publisher.expect_create().times(1).returning(move |_| {
        let _ = tx.send(true);
        Err(publish_error())
    });

    let mut orch = build(&config, mounted_storage(), MockDiskSpace::new(), no_cover(), publisher);
    let stats = orch
        .run_batch(vec![UploadTask::create(record(5.0), ContentType::Repost)], rx)
        .await;

    assert!(stats.interrupted);
    assert_eq!(stats.failed, 0);
    assert!(orch.ledger().failures().is_empty());
}

#[tokio::test]
async fn test_direct_append_publishes_to_target() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 1, false);
    place_under_mount(&dir);

    let mut media = MockMediaTool::new();
    media.expect_extract_cover().times(0);

    let mut publisher = MockPublishClient::new();
    publisher.expect_create().times(0);
    publisher
        .expect_append()
        .withf(|video, id, title| {
            video.ends_with(Path::new(GROUP).join(FILENAME)) && id == "BVtarget" && title == "Title"
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    let mut orch = build(&config, mounted_storage(), MockDiskSpace::new(), media, publisher);
    let (_tx, rx) = watch::channel(false);
    let stats = orch
        .run_batch(vec![UploadTask::append(record(5.0), "BVtarget")], rx)
        .await;

    assert_eq!(stats.success, 1);
    let entry = &orch.ledger().successes()[0];
    assert_eq!(entry.remote_id.as_deref(), Some("BVtarget"));
    assert!(!entry.is_split);
    assert!(entry.parts.is_empty());
}

#[tokio::test]
async fn test_unknown_duration_fails_split_task() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 1, false);

    let mut media = MockMediaTool::new();
    media.expect_duration().times(1).returning(|_| None);
    media.expect_cut().times(0);

    let mut publisher = MockPublishClient::new();
    publisher.expect_create().times(0);
    publisher.expect_append().times(0);

    let mut orch = build(
        &config,
        downloading_storage(),
        plenty_of_space(),
        media,
        publisher,
    );
    let (_tx, rx) = watch::channel(false);
    let stats = orch
        .run_batch(vec![UploadTask::create(record(40.0), ContentType::Repost)], rx)
        .await;

    assert_eq!(stats.failed, 1);
    assert!(orch.ledger().successes().is_empty());
    let failures = orch.ledger().failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].error.contains("split failed"));
    assert!(!dir.path().join("cache/downloads").join(FILENAME).exists());
}

#[tokio::test]
async fn test_downloaded_source_removed_after_success() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 1, false);
    let downloaded = dir.path().join("cache/downloads").join(FILENAME);

    let mut storage = downloading_storage();
    storage.expect_mount().times(1).returning(|| {
        Err(ToolError::Output {
            program: "rclone".into(),
            message: "mount failed".into(),
        })
    });

    let mut publisher = MockPublishClient::new();
    let expected = downloaded.clone();
    publisher
        .expect_create()
        .withf(move |req| req.video == expected && expected.exists())
        .times(1)
        .returning(|_| Ok("BVdl".to_string()));

    let mut orch = build(&config, storage, plenty_of_space(), no_cover(), publisher);
    let (_tx, rx) = watch::channel(false);
    let stats = orch
        .run_batch(vec![UploadTask::create(record(5.0), ContentType::Repost)], rx)
        .await;

    assert_eq!(stats.success, 1);
    assert!(!downloaded.exists());
    assert_eq!(
        orch.ledger().successes()[0].remote_id.as_deref(),
        Some("BVdl")
    );
}

#[tokio::test]
async fn test_group_without_streamer_adds_no_tag() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 1, false);
    let group_dir = dir.path().join("mnt/archive");
    fs::create_dir_all(&group_dir).unwrap();
    fs::write(group_dir.join(FILENAME), b"video").unwrap();

    let mut publisher = MockPublishClient::new();
    publisher
        .expect_create()
        .withf(|req| {
            req.tags == vec!["live".to_string()]
                && req.description == " 2024-01-15 14:00:00"
                && req.source_note == "https://live.example.com/archive"
        })
        .times(1)
        .returning(|_| Ok("BVarchive".to_string()));

    let record = RecordParser::new("REC", "flv").parse(
        FILENAME,
        &GroupInfo::parse("archive"),
        gb_to_bytes(5.0),
    );
    let mut orch = build(&config, mounted_storage(), MockDiskSpace::new(), no_cover(), publisher);
    let (_tx, rx) = watch::channel(false);
    let stats = orch
        .run_batch(vec![UploadTask::create(record, ContentType::Repost)], rx)
        .await;

    assert_eq!(stats.success, 1);
}
