//! Wires config, tools, ledger and orchestrator together for each command.

use console::style;
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{load_config, Config, ConfigError, ContentType, Overrides};
use crate::ledger::{Ledger, LedgerError};
use crate::orchestrator::{BatchStats, UploadOrchestrator, UploadTask};
use crate::resolver::{Fs2DiskSpace, PathResolver};
use crate::source::{format_size, GroupInfo, RecordParser, SourceRecord};
use crate::tools::process::{probe, program_name};
use crate::tools::{
    BiliupClient, FfmpegTool, PublishClient, RcloneStorage, RemoteStorage, ToolError,
};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config not found; searched ~/.config/recpub/config.yml and /etc/recpub/config.yml (use --config <path> or run 'recpub config init')")]
    ConfigNotFound,

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("required tool '{program}' is not available: {source}")]
    MissingTool {
        program: String,
        #[source]
        source: ToolError,
    },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("not logged in to the video platform; run 'recpub login' first")]
    NotLoggedIn,

    #[error("no recordings found for {0}")]
    NoFiles(String),

    #[error("file '{file}' not found in group '{group}'")]
    UnknownFile { group: String, file: String },

    #[error("no target video given; use --target <ID> or run interactively")]
    NoTarget,

    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}

/// Everything a command needs, built once from the loaded config.
pub struct App {
    pub config: Config,
    pub storage: Arc<RcloneStorage>,
    pub media: Arc<FfmpegTool>,
    pub publisher: Arc<BiliupClient>,
    pub parser: RecordParser,
}

impl App {
    pub fn load(config_path: Option<PathBuf>, overrides: &Overrides) -> Result<Self, RunError> {
        let path = config_path.ok_or(RunError::ConfigNotFound)?;
        info!(config_path = %path.display(), "Loading configuration");
        let config = overrides.apply(load_config(&path)?)?;
        if overrides.remote.is_some() || overrides.proxy.is_some() {
            info!(
                remote = %config.remote.name,
                proxy = config.publish.proxy.as_deref().unwrap_or("none"),
                "Applied command-line overrides"
            );
        }
        Ok(Self::new(config))
    }

    pub fn new(config: Config) -> Self {
        Self {
            storage: Arc::new(RcloneStorage::new(&config)),
            media: Arc::new(FfmpegTool::new(&config)),
            publisher: Arc::new(BiliupClient::new(&config.publish)),
            parser: RecordParser::new(&config.source.filename_prefix, &config.source.extension),
            config,
        }
    }

    pub fn open_ledger(&self) -> Ledger {
        Ledger::open(
            self.config.ledger.history_path.clone(),
            self.config.ledger.failed_path.clone(),
        )
    }

    /// Fails when any of the programs a command depends on cannot be spawned.
    pub async fn require_tools(&self, publishing: bool) -> Result<(), RunError> {
        let tools = &self.config.tools;
        let mut checks: Vec<(&Path, &str)> = vec![(tools.rclone.as_path(), "version")];
        if publishing {
            checks.push((tools.ffmpeg.as_path(), "-version"));
            checks.push((tools.ffprobe.as_path(), "-version"));
            checks.push((self.publisher.executable(), "--version"));
        }

        for (program, arg) in checks {
            probe(program, arg)
                .await
                .map_err(|source| RunError::MissingTool {
                    program: program_name(program),
                    source,
                })?;
        }
        Ok(())
    }

    pub async fn require_login(&self) -> Result<(), RunError> {
        if self.publisher.check_login().await {
            Ok(())
        } else {
            Err(RunError::NotLoggedIn)
        }
    }

    /// Lists `group` as records, sorted by filename (chronological).
    pub async fn list_records(&self, group: &str) -> Result<Vec<SourceRecord>, RunError> {
        let files = self.storage.list_files(group).await?;
        let sizes: HashMap<String, u64> = match self.storage.bulk_sizes(group).await {
            Ok(sizes) => sizes,
            Err(e) => {
                warn!(group, error = %e, "Bulk size listing failed, querying sizes one by one");
                HashMap::new()
            }
        };

        let info = GroupInfo::parse(group);
        let mut records = Vec::with_capacity(files.len());
        for file in files {
            let size = match sizes.get(&file) {
                Some(size) => *size,
                None => self.storage.file_size(group, &file).await?,
            };
            records.push(self.parser.parse(&file, &info, size));
        }
        Ok(records)
    }

    pub fn orchestrator(&self) -> UploadOrchestrator {
        let storage: Arc<dyn RemoteStorage> = self.storage.clone();
        let resolver = PathResolver::new(&self.config, storage, Box::new(Fs2DiskSpace));
        UploadOrchestrator::new(
            &self.config,
            self.open_ledger(),
            resolver,
            self.media.clone(),
            self.publisher.clone(),
        )
    }
}

/// Selection of files for `upload` / `append`.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub group: String,
    /// Empty means every file not yet uploaded.
    pub files: Vec<String>,
    pub assume_yes: bool,
}

pub async fn upload(
    app: &App,
    selection: Selection,
    content_type: Option<ContentType>,
) -> Result<BatchStats, RunError> {
    app.require_tools(true).await?;
    app.require_login().await?;

    let records = select_records(app, &selection).await?;
    let content_type = content_type.unwrap_or(app.config.publish.content_type);

    if !confirm_batch(&records, selection.assume_yes)? {
        return Ok(BatchStats::default());
    }

    let tasks = records
        .into_iter()
        .map(|r| UploadTask::create(r, content_type))
        .collect();
    Ok(execute_batch(app, tasks).await)
}

pub async fn append(
    app: &App,
    selection: Selection,
    target: Option<String>,
) -> Result<BatchStats, RunError> {
    app.require_tools(true).await?;
    app.require_login().await?;

    let target = match target {
        Some(t) => t,
        None if std::io::stdin().is_terminal() => {
            let recent = app.publisher.list_recent(20).await?;
            crate::cli::interactive::select_target(&recent)?
        }
        None => return Err(RunError::NoTarget),
    };

    let records = select_records(app, &selection).await?;
    println!("Target video: {}", style(&target).cyan());
    if !confirm_batch(&records, selection.assume_yes)? {
        return Ok(BatchStats::default());
    }

    let tasks = records
        .into_iter()
        .map(|r| UploadTask::append(r, target.clone()))
        .collect();
    Ok(execute_batch(app, tasks).await)
}

/// Drops every ledger entry whose remote video no longer exists.
pub async fn validate(app: &App) -> Result<(usize, usize), RunError> {
    app.require_tools(true).await?;
    app.require_login().await?;

    let mut ledger = app.open_ledger();
    let publisher = app.publisher.clone();
    let (checked, removed) = ledger
        .revalidate(|id| {
            let publisher = publisher.clone();
            async move { publisher.exists(&id).await }
        })
        .await?;

    println!(
        "{} checked {}, removed {}",
        style("Validation:").bold(),
        checked,
        style(removed).yellow()
    );
    Ok((checked, removed))
}

pub async fn login(app: &App) -> Result<(), RunError> {
    app.publisher.login().await?;
    if app.publisher.check_login().await {
        println!("{}", style("✓ Logged in").green());
    } else {
        println!("{}", style("✗ Login did not take effect").red());
    }
    Ok(())
}

pub async fn groups(app: &App) -> Result<(), RunError> {
    app.require_tools(false).await?;
    let ledger = app.open_ledger();

    for group in app.storage.list_groups().await? {
        let files = app.storage.list_files(&group).await?;
        let (uploaded, pending) = ledger.count_uploaded(&files, &group);
        println!(
            "{:<40} {} uploaded, {} pending",
            group,
            style(uploaded).green(),
            style(pending).yellow()
        );
    }
    Ok(())
}

pub async fn files(app: &App, group: &str) -> Result<(), RunError> {
    app.require_tools(false).await?;
    let ledger = app.open_ledger();
    let records = app.list_records(group).await?;
    if records.is_empty() {
        return Err(RunError::NoFiles(group.to_string()));
    }

    for record in &records {
        let status = if ledger.is_uploaded(&record.path(), record.size) {
            style("uploaded").green()
        } else {
            style("pending").yellow()
        };
        println!(
            "{}  {:>10}  {:<8}  {}",
            record.formatted_date(),
            format_size(record.size),
            status,
            record.filename
        );
    }
    Ok(())
}

pub async fn remote_list(app: &App) -> Result<(), RunError> {
    app.require_tools(false).await?;
    for remote in app.storage.list_remotes().await? {
        let marker = if remote == app.config.remote.name { "*" } else { " " };
        println!("{} {}", marker, remote);
    }
    Ok(())
}

pub async fn remote_test(app: &App, name: Option<&str>) -> Result<bool, RunError> {
    app.require_tools(false).await?;
    let target = name.unwrap_or(&app.config.remote.name);
    let ok = app.storage.test_connection(Some(target)).await?;
    if ok {
        println!("{} {}", style("✓ Connected to").green(), target);
    } else {
        println!("{} {}", style("✗ Cannot reach").red(), target);
    }
    Ok(ok)
}

async fn select_records(app: &App, selection: &Selection) -> Result<Vec<SourceRecord>, RunError> {
    let records = app.list_records(&selection.group).await?;
    let ledger = app.open_ledger();

    let chosen: Vec<SourceRecord> = if selection.files.is_empty() {
        records
            .into_iter()
            .filter(|r| !ledger.is_uploaded(&r.path(), r.size))
            .collect()
    } else {
        let mut chosen = Vec::with_capacity(selection.files.len());
        for file in &selection.files {
            let record = records
                .iter()
                .find(|r| &r.filename == file)
                .ok_or_else(|| RunError::UnknownFile {
                    group: selection.group.clone(),
                    file: file.clone(),
                })?;
            chosen.push(record.clone());
        }
        chosen
    };

    if chosen.is_empty() {
        return Err(RunError::NoFiles(selection.group.clone()));
    }
    Ok(chosen)
}

fn confirm_batch(records: &[SourceRecord], assume_yes: bool) -> Result<bool, RunError> {
    println!("{}", style(format!("{} file(s) selected:", records.len())).bold());
    for record in records {
        println!("  {}  {}", format_size(record.size), record.filename);
    }

    if assume_yes || !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    Ok(dialoguer::Confirm::new()
        .with_prompt("Start uploading?")
        .default(true)
        .interact()?)
}

/// Runs the batch with Ctrl+C wired to the shutdown channel, then tears down
/// the mount and scratch directories whatever happened.
pub async fn execute_batch(app: &App, tasks: Vec<UploadTask>) -> BatchStats {
    let mut orchestrator = app.orchestrator();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let signal_handle = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping after the current step");
            let _ = shutdown_tx.send(true);
        }
    });

    let stats = orchestrator.run_batch(tasks, shutdown_rx).await;
    signal_handle.abort();
    orchestrator.teardown().await;

    print_summary(&stats);
    stats
}

pub fn print_summary(stats: &BatchStats) {
    println!();
    println!("{}", style("Upload summary").bold().underlined());
    println!("  {} {}", style("success:").green(), stats.success);
    println!("  {} {}", style("failed: ").red(), stats.failed);
    println!("  {} {}", style("skipped:").dim(), stats.skipped);
    if stats.interrupted {
        println!("  {}", style("interrupted before the batch finished").yellow());
    }
}
