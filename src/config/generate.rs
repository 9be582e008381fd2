pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# RECPUB CONFIGURATION
# =============================================================================
# recpub publishes live-stream recordings kept on an rclone remote to the video
# platform through the biliup CLI. Recordings are deduplicated by (path, size),
# oversized files are split with ffmpeg, and failed uploads are retried.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/recpub/config.yml
#   3. /etc/recpub/config.yml
#
# Any value may reference an environment variable with $env{NAME}.

# =============================================================================
# REMOTE STORAGE
# =============================================================================
# Recordings live under <name>:<backup_path>/<room-id>-<streamer-name>/

remote:
  # rclone remote name (as listed by `rclone listremotes`, without ':')
  name: gdrive
  backup_path: backup
  # Where the remote is mounted for uploads that need no splitting
  mount_point: /mnt/recpub

# =============================================================================
# SOURCE FILES
# =============================================================================
# Recording names follow <prefix>-<owner-id>-<YYYYMMDD>-<HHMMSS>-<seq>-<title>.<ext>

source:
  filename_prefix: 录制
  extension: flv

# =============================================================================
# UPLOAD
# =============================================================================

upload:
  # Files larger than this are split before publishing
  max_file_size_gb: 15
  # Target size of each split segment
  split_part_size_gb: 14.5
  # Scratch directory for downloads, split segments and covers
  local_cache_path: ~/.cache/recpub
  # Downloads are refused when they would leave less free space than this
  min_free_space_gb: 5

retry:
  attempts: 3
  delay: 2s
  # When true, errors that cannot succeed on retry (disk space, empty split)
  # fail the task immediately instead of using up the remaining attempts
  skip_non_retryable: false

cover:
  # Second of the video the cover frame is taken from
  extract_time_sec: 1
  # ffmpeg -q:v, 2 (best) to 31 (worst)
  quality: 2

# =============================================================================
# PUBLISHING
# =============================================================================

publish:
  executable: /usr/local/bin/biliup
  cookie_file: ~/.config/recpub/cookies.json
  # proxy: socks5://127.0.0.1:1080
  # Submission API used by biliup: client, app or web
  submit: client
  category: 171
  tags:
    - 直播录像
  # Placeholders: {streamer_name}, {date}
  description_template: "{streamer_name} 直播录像 {date}"
  # Placeholders: {room_id}
  source_template: "https://live.bilibili.com/{room_id}"
  # original or repost; can be overridden per batch
  content_type: repost

# =============================================================================
# LEDGER
# =============================================================================

ledger:
  history_path: ~/.local/share/recpub/upload_history.json
  failed_path: ~/.local/share/recpub/failed_uploads.json

# =============================================================================
# EXTERNAL TOOLS (optional)
# =============================================================================

tools:
  rclone: rclone
  ffmpeg: ffmpeg
  ffprobe: ffprobe
  fusermount: fusermount
"#
    .to_string()
}
