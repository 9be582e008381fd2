use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recpub::cli::run::{self, App, Selection};
use recpub::config::{resolve_config_path, ContentType, Overrides};

#[derive(Parser)]
#[command(name = "recpub")]
#[command(about = "Publish live-stream recordings from remote storage to a video platform", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// rclone remote to use instead of remote.name for this run
    #[arg(long, global = true, value_name = "NAME")]
    remote: Option<String>,

    /// Proxy for the publish tool for this run; an empty value disables it
    #[arg(long, global = true, value_name = "URL")]
    proxy: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish recordings of a group as new videos
    Upload {
        #[command(flatten)]
        files: FileArgs,
        #[arg(long, value_enum)]
        content_type: Option<ContentTypeArg>,
    },
    /// Append recordings of a group as parts of an existing video
    Append {
        #[command(flatten)]
        files: FileArgs,
        /// Remote video id; chosen from recent uploads when omitted
        #[arg(long)]
        target: Option<String>,
    },
    /// Drop history entries whose remote video no longer exists
    Validate,
    /// Log in to the video platform
    Login,
    /// List remote groups with upload counts
    Groups,
    /// List the recordings of a group
    Files {
        #[arg(long)]
        group: String,
    },
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
struct FileArgs {
    #[arg(long)]
    group: String,
    /// Filename within the group; repeat for several. Defaults to every pending file.
    #[arg(long = "file")]
    files: Vec<String>,
    /// Skip the confirmation prompt
    #[arg(long, short)]
    yes: bool,
}

impl From<FileArgs> for Selection {
    fn from(args: FileArgs) -> Self {
        Selection {
            group: args.group,
            files: args.files,
            assume_yes: args.yes,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ContentTypeArg {
    Original,
    Repost,
}

impl From<ContentTypeArg> for ContentType {
    fn from(arg: ContentTypeArg) -> Self {
        match arg {
            ContentTypeArg::Original => ContentType::Original,
            ContentTypeArg::Repost => ContentType::Repost,
        }
    }
}

#[derive(Subcommand)]
enum RemoteAction {
    /// List configured rclone remotes
    List,
    /// Test the connection to a remote (the configured one by default)
    Test { name: Option<String> },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recpub=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let overrides = Overrides {
        remote: cli.remote,
        proxy: cli.proxy,
    };

    match cli.command {
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => recpub::cli::config::init(stdout)?,
            ConfigAction::Validate => recpub::cli::config::validate(config_path)?,
        },
        None => {
            let app = App::load(config_path, &overrides)?;
            recpub::cli::interactive::menu(&app).await?;
        }
        Some(command) => {
            let app = App::load(config_path, &overrides)?;
            dispatch(&app, command).await?;
        }
    }

    Ok(())
}

async fn dispatch(app: &App, command: Commands) -> Result<(), run::RunError> {
    match command {
        Commands::Upload {
            files,
            content_type,
        } => {
            let stats = run::upload(app, files.into(), content_type.map(Into::into)).await?;
            if stats.failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Append { files, target } => {
            let stats = run::append(app, files.into(), target).await?;
            if stats.failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Validate => {
            run::validate(app).await?;
        }
        Commands::Login => run::login(app).await?,
        Commands::Groups => run::groups(app).await?,
        Commands::Files { group } => run::files(app, &group).await?,
        Commands::Remote { action } => match action {
            RemoteAction::List => run::remote_list(app).await?,
            RemoteAction::Test { name } => {
                if !run::remote_test(app, name.as_deref()).await? {
                    std::process::exit(1);
                }
            }
        },
        Commands::Config { .. } => unreachable!("handled before loading the app"),
    }
    Ok(())
}
