//! Menu shown when recpub runs without a subcommand. It only gathers choices;
//! the work goes through the same functions as the subcommands.

use console::style;
use dialoguer::{Confirm, Input, MultiSelect, Select};
use std::io::{self, IsTerminal};

use super::run::{self, App, RunError};
use crate::config::ContentType;
use crate::orchestrator::UploadTask;
use crate::source::{format_size, SourceRecord};
use crate::tools::{PublishClient, RemoteStorage, RemoteVideo};

const MENU: &[&str] = &[
    "Upload recordings as new videos",
    "Append recordings to an existing video",
    "Validate upload history",
    "Log in to the video platform",
    "Test remote connection",
    "Quit",
];

pub async fn menu(app: &App) -> Result<(), RunError> {
    if !io::stdin().is_terminal() {
        println!("No command given and stdin is not a terminal; see 'recpub --help'.");
        return Ok(());
    }

    app.require_tools(true).await?;

    loop {
        println!();
        let choice = Select::new()
            .with_prompt(style("recpub").cyan().bold().to_string())
            .items(MENU)
            .default(0)
            .interact()?;

        let result = match choice {
            0 => upload_flow(app, false).await,
            1 => upload_flow(app, true).await,
            2 => run::validate(app).await.map(|_| ()),
            3 => run::login(app).await,
            4 => run::remote_test(app, None).await.map(|_| ()),
            _ => return Ok(()),
        };

        // Keep the menu alive after a failed action
        if let Err(e) = result {
            eprintln!("{} {}", style("Error:").red().bold(), e);
        }
    }
}

async fn upload_flow(app: &App, append: bool) -> Result<(), RunError> {
    app.require_login().await?;

    let Some(group) = select_group(app).await? else {
        return Ok(());
    };

    let records = app.list_records(&group).await?;
    let ledger = app.open_ledger();
    let pending: Vec<SourceRecord> = records
        .into_iter()
        .filter(|r| !ledger.is_uploaded(&r.path(), r.size))
        .collect();

    if pending.is_empty() {
        println!("{}", style("Every recording in this group is already uploaded").green());
        return Ok(());
    }

    let chosen = select_records(&pending)?;
    if chosen.is_empty() {
        return Ok(());
    }

    let tasks: Vec<UploadTask> = if append {
        let recent = app.publisher.list_recent(20).await?;
        let target = select_target(&recent)?;
        chosen
            .into_iter()
            .map(|r| UploadTask::append(r, target.clone()))
            .collect()
    } else {
        let content_type = select_content_type(app.config.publish.content_type)?;
        chosen
            .into_iter()
            .map(|r| UploadTask::create(r, content_type))
            .collect()
    };

    let confirmed = Confirm::new()
        .with_prompt(format!("Upload {} file(s)?", tasks.len()))
        .default(true)
        .interact()?;
    if confirmed {
        run::execute_batch(app, tasks).await;
    }
    Ok(())
}

async fn select_group(app: &App) -> Result<Option<String>, RunError> {
    let groups = app.storage.list_groups().await?;
    if groups.is_empty() {
        println!("{}", style("No groups found on the remote").yellow());
        return Ok(None);
    }

    let ledger = app.open_ledger();
    let mut labels = Vec::with_capacity(groups.len());
    for group in &groups {
        let files = app.storage.list_files(group).await?;
        let (uploaded, pending) = ledger.count_uploaded(&files, group);
        labels.push(format!("{}  ({} uploaded, {} pending)", group, uploaded, pending));
    }

    let choice = Select::new()
        .with_prompt("Select a group")
        .items(&labels)
        .default(0)
        .interact_opt()?;
    Ok(choice.map(|i| groups[i].clone()))
}

fn select_records(records: &[SourceRecord]) -> Result<Vec<SourceRecord>, RunError> {
    let choice = Select::new()
        .with_prompt(format!("{} pending recording(s)", records.len()))
        .items(&["Upload all pending", "Choose files"])
        .default(0)
        .interact()?;

    if choice == 0 {
        return Ok(records.to_vec());
    }

    let labels: Vec<String> = records
        .iter()
        .map(|r| format!("{}  {:>10}  {}", r.formatted_date(), format_size(r.size), r.title))
        .collect();
    let picked = MultiSelect::new()
        .with_prompt("Space to toggle, Enter to confirm")
        .items(&labels)
        .interact()?;

    Ok(picked.into_iter().map(|i| records[i].clone()).collect())
}

fn select_content_type(default: ContentType) -> Result<ContentType, RunError> {
    let options = [ContentType::Original, ContentType::Repost];
    let labels = ["Original work", "Repost"];
    let default_index = options.iter().position(|c| *c == default).unwrap_or(1);

    let choice = Select::new()
        .with_prompt("Content type")
        .items(&labels)
        .default(default_index)
        .interact()?;
    Ok(options[choice])
}

/// Picks the append target from recent videos, or asks for an id.
pub fn select_target(recent: &[RemoteVideo]) -> Result<String, RunError> {
    let mut labels: Vec<String> = recent
        .iter()
        .map(|v| format!("{} | {} | {}", v.id, v.title, v.status))
        .collect();
    labels.push("Enter a video id".to_string());

    let choice = Select::new()
        .with_prompt("Append to which video?")
        .items(&labels)
        .default(0)
        .interact()?;

    if let Some(video) = recent.get(choice) {
        return Ok(video.id.clone());
    }

    let id: String = Input::new()
        .with_prompt("Video id")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("id cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    Ok(id.trim().to_string())
}
