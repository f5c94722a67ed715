use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::io::{AsyncBufReadExt, BufReader};

use citation_feed::db::{self, PgCitationSource};
use citation_feed::location::CoordinateTable;
use citation_feed::recency::Selection;
use citation_feed::render;
use citation_feed::scheduler::{run_cycle, RefreshScheduler};
use citation_feed::{FeedConfig, SystemClock};

#[derive(Parser)]
#[command(name = "citation-feed")]
#[command(about = "Live parking citation feed per enforcement officer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a few recent citations for local testing
    Seed,
    /// Import scraped citations from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the current feed once
    Feed {
        #[command(flatten)]
        feed: FeedArgs,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Keep the feed on screen, refreshing on an interval
    Watch {
        #[command(flatten)]
        feed: FeedArgs,
    },
}

#[derive(Args)]
struct FeedArgs {
    /// JSON file with feed settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Officer prefixes in display order, comma separated
    #[arg(long, env = "CITATION_PREFIXES", value_delimiter = ',')]
    prefixes: Option<Vec<String>>,
    #[arg(long, env = "RECENCY_WINDOW_MINUTES")]
    recency_window_minutes: Option<i64>,
    #[arg(long, env = "REFRESH_INTERVAL_MS")]
    refresh_interval_ms: Option<u64>,
}

impl FeedArgs {
    fn resolve(self) -> anyhow::Result<FeedConfig> {
        let mut config = match &self.config {
            Some(path) => FeedConfig::from_json_file(path)?,
            None => FeedConfig::default(),
        };

        if let Some(prefixes) = self.prefixes {
            config.officer_prefixes = prefixes
                .into_iter()
                .map(|p| p.trim().to_string())
                .collect();
        }
        if let Some(minutes) = self.recency_window_minutes {
            config.recency_window_minutes = minutes;
        }
        if let Some(ms) = self.refresh_interval_ms {
            config.refresh_interval_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the citations Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect().await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&connect().await?).await?;
            println!("Seeded {inserted} citations.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&connect().await?, &csv).await?;
            println!("Inserted {inserted} citations from {}.", csv.display());
        }
        Commands::Feed { feed, json } => {
            let config = feed.resolve()?;
            let source = PgCitationSource::new(connect().await?);
            let snapshot =
                run_cycle(&source, &config, &CoordinateTable::default(), &SystemClock).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print!("{}", render::render_feed(&snapshot.entries));
            }
        }
        Commands::Watch { feed } => {
            let config = feed.resolve()?;
            let source = Arc::new(PgCitationSource::new(connect().await?));
            watch(source, config).await?;
        }
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum ViewCommand<'a> {
    Quit,
    Refresh,
    /// Stdin reached EOF; keep rendering until Ctrl-C.
    InputClosed,
    CloseDetails,
    ToggleMarker(&'a str),
}

fn parse_command(line: Option<&str>) -> ViewCommand<'_> {
    match line.map(str::trim) {
        None => ViewCommand::InputClosed,
        Some("q") => ViewCommand::Quit,
        Some("r") => ViewCommand::Refresh,
        Some("") => ViewCommand::CloseDetails,
        Some(prefix) => ViewCommand::ToggleMarker(prefix),
    }
}

/// Redraws on every refresh. Stdin: an officer prefix toggles its popup,
/// an empty line closes it, `r` refreshes, `q` quits.
async fn watch(source: Arc<PgCitationSource>, config: FeedConfig) -> anyhow::Result<()> {
    let handle = RefreshScheduler::new(source, config)?.spawn();
    let mut state_rx = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut selection = Selection::default();

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match parse_command(line?.as_deref()) {
                    ViewCommand::Quit => break,
                    ViewCommand::Refresh => {
                        handle.refresh();
                        continue;
                    }
                    ViewCommand::InputClosed => {
                        stdin_open = false;
                        continue;
                    }
                    ViewCommand::CloseDetails => selection.click_background(),
                    ViewCommand::ToggleMarker(prefix) => selection.click_marker(prefix),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        let state = state_rx.borrow_and_update().clone();
        if let Some(snapshot) = &state.snapshot {
            selection.retain_visible(&snapshot.markers);
        } else {
            selection.click_background();
        }
        println!("{}", render::render_state(&state, &selection));
    }

    handle.shutdown().await;
    Ok(())
}
