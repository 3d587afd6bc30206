//! Harvester CLI - incremental personal-data sync into a data-sharing hub.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use harvester::source::SourceKind;
use tracing_subscriber::EnvFilter;

use crate::commands::status::OutputFormat;

#[derive(Parser)]
#[command(name = "harvester")]
#[command(version)]
#[command(about = "Incremental personal-data sync into a data-sharing hub")]
#[command(
    long_about = "Harvester copies members' data from third-party sources (Moves, RescueTime) \
into their data-sharing hub accounts. Each sync resumes from the last published artifact, \
re-fetches only the trailing window that may have changed, and replaces the artifact \
with the merged result."
)]
#[command(after_long_help = r#"EXAMPLES
    Create the database schema:
        $ harvester migrate up

    Import members from a legacy export:
        $ harvester import --infile members.csv --source moves

    Sync every link that has not synced in four days:
        $ harvester update

    Sync one member right now:
        $ harvester sync 12345678 --source rescuetime

    Run continuously, checking for stale links every hour:
        $ harvester daemon --interval 60

CONFIGURATION
    Harvester reads configuration from:
      1. ~/.config/harvester/config.toml (or $XDG_CONFIG_HOME/harvester/config.toml)
      2. ./harvester.toml
      3. Environment variables (HARVESTER_<SECTION>__<KEY>)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    DATABASE_URL                        Database connection string (default: ~/.local/state/harvester/harvester.db)
    HARVESTER_HUB__CLIENT_ID            Hub OAuth client id
    HARVESTER_HUB__CLIENT_SECRET        Hub OAuth client secret
    HARVESTER_MOVES__CLIENT_ID          Moves OAuth client id
    HARVESTER_MOVES__CLIENT_SECRET      Moves OAuth client secret
    HARVESTER_RESCUETIME__CLIENT_ID     RescueTime OAuth client id
    HARVESTER_RESCUETIME__CLIENT_SECRET RescueTime OAuth client secret
"#)]
struct Cli {
    /// Database URL (overrides [database] url)
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Sync one member now
    Sync {
        /// Hub member id
        member: String,

        /// Only this source (default: every linked source)
        #[arg(short, long)]
        source: Option<SourceKind>,

        /// Concurrent sync runs (default from config or 4)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Sync every link that is due
    Update {
        /// Sync every link, not only stale ones
        #[arg(short, long)]
        all: bool,

        /// Concurrent sync runs (default from config or 4)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Run the scheduler and workers until Ctrl+C
    Daemon {
        /// Minutes between scheduler passes
        #[arg(short, long, default_value_t = 60)]
        interval: u64,

        /// Concurrent sync runs (default from config or 4)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Import members from a delimited file
    ///
    /// Each line is `member_id<DELIM>hub_refresh_token<DELIM>source_refresh_token`.
    /// New members are stored, their tokens refreshed, and a first sync queued.
    Import {
        /// File to read
        #[arg(short, long)]
        infile: PathBuf,

        /// Field delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: String,

        /// Source the third column belongs to
        #[arg(short, long, default_value = "moves")]
        source: SourceKind,
    },
    /// Link a member to a source using a refresh token
    Link {
        /// Hub member id
        member: String,

        #[arg(short, long)]
        source: SourceKind,

        /// The member's refresh token at the source
        #[arg(short, long)]
        refresh_token: String,
    },
    /// Delete a member's artifact for a source and remove the link
    Unlink {
        /// Hub member id
        member: String,

        #[arg(short, long)]
        source: SourceKind,
    },
    /// Print the download URL of a member's current artifact
    Artifact {
        /// Hub member id
        member: String,

        #[arg(short, long)]
        source: SourceKind,
    },
    /// Show linked sources and when they last synced
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

/// Create the parent directory of a SQLite database file.
fn ensure_sqlite_dir(database_url: &str) -> std::io::Result<()> {
    let Some(db_path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    // Strip query parameters (e.g., ?mode=rwc) before path operations
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    let db_path = std::path::Path::new(db_path);

    if db_path.is_relative() && !db_path.as_os_str().is_empty() {
        tracing::warn!(
            "Database path '{}' is relative - behavior depends on current directory. \
             Consider using an absolute path.",
            db_path.display()
        );
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    shutdown::setup_shutdown_handler();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("harvester=info,harvester_cli=info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    // Handle commands that don't require database access first
    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let database_url = cli
        .database_url
        .or_else(|| config.database_url())
        .ok_or("Could not determine a database URL; set [database] url or DATABASE_URL")?;
    ensure_sqlite_dir(&database_url)?;

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Sync {
            member,
            source,
            workers,
        } => {
            commands::sync::handle_sync(&member, source, workers, &config, &database_url).await?;
        }
        Commands::Update { all, workers } => {
            commands::update::handle_update(all, workers, &config, &database_url).await?;
        }
        Commands::Daemon { interval, workers } => {
            let interval = Duration::from_secs(interval.max(1) * 60);
            commands::daemon::handle_daemon(interval, workers, &config, &database_url).await?;
        }
        Commands::Import {
            infile,
            delimiter,
            source,
        } => {
            commands::import::handle_import(&infile, &delimiter, source, &config, &database_url)
                .await?;
        }
        Commands::Link {
            member,
            source,
            refresh_token,
        } => {
            commands::link::handle_link(&member, source, &refresh_token, &config, &database_url)
                .await?;
        }
        Commands::Unlink { member, source } => {
            commands::link::handle_unlink(&member, source, &config, &database_url).await?;
        }
        Commands::Artifact { member, source } => {
            commands::artifact::handle_artifact(&member, source, &config, &database_url).await?;
        }
        Commands::Status { output } => {
            commands::status::handle_status(output, &config, &database_url).await?;
        }
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}
