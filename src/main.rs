use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod aggregate;
mod config;
mod lifecycle;
mod models;
mod report;
mod store;

use aggregate::Dashboard;
use config::{Config, Overrides};
use lifecycle::{LifecycleError, NewReport, Target};
use models::STATUS_CHOICES;
use store::Store;

#[derive(Parser)]
#[command(name = "health-watch")]
#[command(about = "Community health reports, alerts and hotspots per village", long_about = None)]
struct Cli {
    /// Path to a config file (defaults to ./.health-watch.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the report slot for the file backend
    #[arg(long, global = true, env = "HEALTH_WATCH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Store reports in Postgres instead of a local file
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Name of the slot reports are stored under
    #[arg(long, global = true)]
    slot: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .health-watch.toml
    InitConfig,
    /// Create the data directory or database schema
    InitDb,
    /// Load demo reports
    Seed,
    /// Import reports from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Export all reports to a CSV file
    Export {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Submit a new report
    Submit(SubmitArgs),
    /// List reports, newest first
    List,
    /// Change the status of a report
    #[command(group(
        ArgGroup::new("target")
            .args(["id", "index"])
            .required(true)
            .multiple(false)
    ))]
    SetStatus {
        #[arg(long)]
        id: Option<Uuid>,
        /// Position in the `list` output
        #[arg(long)]
        index: Option<usize>,
        /// One of: solved, processing, not_solved (prompts when omitted)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show KPIs, alerts and hotspots
    Dashboard,
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "health-report.md")]
        out: PathBuf,
    },
}

#[derive(Args)]
struct SubmitArgs {
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, alias = "location", default_value = "")]
    village: String,
    /// Comma-separated, e.g. fever,diarrhea
    #[arg(long = "symptom", value_delimiter = ',')]
    symptoms: Vec<String>,
    /// e.g. good, poor, contaminated, none
    #[arg(long, default_value = "")]
    water_quality: String,
    #[arg(long, default_value = "")]
    comments: String,
    /// Number of affected people
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    count: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig = cli.command {
        return init_config();
    }

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?.unwrap_or_default(),
    };
    config.merge(Overrides {
        data_dir: cli.data_dir.clone(),
        database_url: cli.database_url.clone(),
        slot: cli.slot.clone(),
    });

    init_logging(&cli, &config);
    debug!(backend = ?config.storage.backend, slot = %config.storage.slot, "configuration loaded");

    let store = Store::connect(&config.storage).await?;

    match cli.command {
        Commands::InitConfig => init_config()?,
        Commands::InitDb => {
            store.init().await?;
            println!("Storage ready at {}.", store.describe());
        }
        Commands::Seed => {
            let inserted = store::seed(&store).await?;
            println!("Inserted {inserted} demo reports.");
        }
        Commands::Import { csv } => {
            let inserted = store::import_csv(&store, &csv).await?;
            println!("Imported {inserted} reports from {}.", csv.display());
        }
        Commands::Export { csv } => {
            let reports = store.load().await;
            let written = store::export_csv(&reports, &csv)?;
            println!("Exported {written} reports to {}.", csv.display());
        }
        Commands::Submit(args) => {
            let form = NewReport {
                name: args.name,
                village: args.village,
                symptoms: args.symptoms,
                water_quality: args.water_quality,
                comments: args.comments,
                count: args.count,
            };
            match lifecycle::submit_report(&store, form).await {
                Ok(_) => {
                    println!("Report submitted successfully!");
                    show_dashboard(&store).await;
                }
                Err(err) => recover(err)?,
            }
        }
        Commands::List => {
            print!("{}", report::render_list(&store.load().await));
        }
        Commands::SetStatus { id, index, status } => {
            let target = match (id, index) {
                (Some(id), _) => Target::Id(id),
                (None, Some(index)) => Target::DisplayIndex(index),
                (None, None) => unreachable!("clap requires one of --id or --index"),
            };
            set_status(&store, target, status).await?;
        }
        Commands::Dashboard => show_dashboard(&store).await,
        Commands::Report { out } => {
            let reports = store.load().await;
            let report = report::build_report(&store.describe(), &reports);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn init_config() -> anyhow::Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE);
    if path.exists() {
        println!("{} already exists; edit it or remove it first.", path.display());
        return Ok(());
    }
    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Created {} with default settings.", path.display());
    Ok(())
}

fn init_logging(cli: &Cli, config: &Config) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Prints recoverable errors and swallows them; storage failures propagate.
fn recover(err: LifecycleError) -> anyhow::Result<()> {
    if err.is_recoverable() {
        debug!("recoverable: {err:?}");
        eprintln!("{err}");
        Ok(())
    } else {
        match err {
            LifecycleError::Store(inner) => Err(inner),
            other => Err(other.into()),
        }
    }
}

async fn show_dashboard(store: &Store) {
    let reports = store.load().await;
    print!("{}", report::render_dashboard(&Dashboard::from_reports(&reports)));
}

async fn set_status(store: &Store, target: Target, status: Option<String>) -> anyhow::Result<()> {
    let input = match status {
        Some(status) => Some(status),
        None => {
            let reports = store.load().await;
            let index = match lifecycle::resolve(&reports, target) {
                Ok(index) => index,
                Err(err) => return recover(err),
            };
            let current = &reports[index];
            let line = prompt_status(&current.village, current.status.as_str()).await?;
            lifecycle::prompt_answer(line.as_deref(), &current.status)
        }
    };

    let status = match lifecycle::parse_status_input(input.as_deref()) {
        Ok(Some(status)) => status,
        Ok(None) => return Ok(()),
        Err(err) => return recover(err.into()),
    };

    match lifecycle::change_status(store, target, status).await {
        Ok(change) => {
            println!("Status updated to \"{}\"", change.current);
            show_dashboard(store).await;
            Ok(())
        }
        Err(err) => recover(err),
    }
}

/// Reads one line from stdin; `None` on EOF.
async fn prompt_status(village: &str, current: &str) -> anyhow::Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(
            format!(
                "Change status for report at {village} (current: {current})\n\
                 Enter one of: {} [{current}]: ",
                STATUS_CHOICES.join(", ")
            )
            .as_bytes(),
        )
        .await?;
    stdout.flush().await?;

    let mut line = String::new();
    let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok((read > 0).then_some(line))
}
