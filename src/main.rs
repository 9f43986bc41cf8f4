use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use repo_stats::analyzer::{
    resolve_report_range, resolve_series_range, Command, ProcessOptions, RepoStatsAnalyzer,
};
use repo_stats::config::Config;
use repo_stats::logging::init_logging;
use repo_stats::store::{EntityFilter, MemoryStore};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "repo-stats")]
#[command(about = "Pull request and issue timeline analytics")]
#[command(version)]
struct Cli {
    /// Store snapshot file
    #[arg(long, short = 'c', global = true, env = "REPO_STATS_STORE")]
    store: Option<PathBuf>,

    /// Repositories to include (comma separated)
    #[arg(long, short = 'r', global = true, env = "GITHUB_REPOS", value_delimiter = ',')]
    repos: Vec<String>,

    /// Authors to include (comma separated)
    #[arg(long, short = 'a', global = true, env = "GITHUB_AUTHORS", value_delimiter = ',')]
    authors: Vec<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Also write series as CSV into the output directory
    #[arg(long, global = true)]
    csv: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct RangeArgs {
    /// Start date (YYYY-MM-DD), defaults to the 1st of the month a year ago
    #[arg(long)]
    from: Option<String>,
    /// End date (YYYY-MM-DD, inclusive), defaults to today
    #[arg(long)]
    to: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and store derived metrics for every entity
    Compute,
    /// Pull requests open daily by state
    Open {
        #[command(flatten)]
        range: RangeArgs,
        /// Break the series down per repository
        #[arg(long)]
        by_repo: bool,
    },
    /// Issues open daily by type
    Issues {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Pull requests open daily by author group
    Authors {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Pull requests opened daily by current status
    Opened {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Summary of pull requests created in range
    Summary {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Monthly report of weekly pull request summaries
    Report {
        /// First month (YYYY-MM), defaults to last month
        from_month: Option<String>,
        /// Last month (YYYY-MM), defaults to the current month
        to_month: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli) {
        handle_error(e, json);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(store) = &cli.store {
        config.paths.store_file = store.clone();
    }

    if config.logging.output != "console" {
        std::fs::create_dir_all(&config.paths.log_directory)
            .context("Failed to create log directory")?;
    }
    let _guard = init_logging(&config.logging, &config.paths.log_directory);

    let today = chrono::Utc::now().date_naive();
    let (command, range) = match &cli.command {
        Commands::Compute => (
            Command::Compute,
            resolve_series_range(None, None, today)?,
        ),
        Commands::Open { range, by_repo } => (
            Command::Open { by_repo: *by_repo },
            resolve_series_range(range.from.as_deref(), range.to.as_deref(), today)?,
        ),
        Commands::Issues { range } => (
            Command::Issues,
            resolve_series_range(range.from.as_deref(), range.to.as_deref(), today)?,
        ),
        Commands::Authors { range } => (
            Command::Authors,
            resolve_series_range(range.from.as_deref(), range.to.as_deref(), today)?,
        ),
        Commands::Opened { range } => (
            Command::Opened,
            resolve_series_range(range.from.as_deref(), range.to.as_deref(), today)?,
        ),
        Commands::Summary { range } => (
            Command::Summary,
            resolve_series_range(range.from.as_deref(), range.to.as_deref(), today)?,
        ),
        Commands::Report {
            from_month,
            to_month,
        } => (
            Command::Report,
            resolve_report_range(from_month.as_deref(), to_month.as_deref(), today)?,
        ),
    };

    let store_file = config.paths.store_file.clone();
    if !store_file.exists() {
        anyhow::bail!("Store file not found: {}", store_file.display());
    }
    let store = MemoryStore::load_from_file(&store_file)?;

    let options = ProcessOptions {
        range,
        filter: EntityFilter::new()
            .repos(cli.repos.iter().map(|r| r.trim()).filter(|r| !r.is_empty()))
            .authors(cli.authors.iter().map(|a| a.trim()).filter(|a| !a.is_empty())),
        json_output: cli.json,
        csv_output: cli.csv,
    };

    let analyzer = RepoStatsAnalyzer::new(store, config);
    analyzer.run_command(&command, &options)
}

fn handle_error(e: anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
    } else {
        eprintln!("Error: {:#}", e);
    }
    process::exit(1);
}
