//! Star-Ripple main entry point
//!
//! This is the command-line interface for the Star-Ripple repository crawler.

use clap::Parser;
use std::path::{Path, PathBuf};
use star_ripple::config::{load_config_with_hash, validate, Config};
use star_ripple::crawler::crawl;
use star_ripple::CrawlState;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Star-Ripple: a resumable, quota-aware GitHub repository crawler
///
/// Star-Ripple pages through GitHub repository search, stores every result in
/// SQLite and checkpoints its progress so an interrupted crawl picks up where
/// it stopped.
#[derive(Parser, Debug)]
#[command(name = "star-ripple")]
#[command(version)]
#[command(about = "A resumable, quota-aware repository crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume from the active checkpoint (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, overwriting the active checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Override the number of repositories to collect
    #[arg(long, value_name = "COUNT")]
    target: Option<u64>,

    /// Override the search query
    #[arg(long, value_name = "QUERY")]
    query: Option<String>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(target) = cli.target {
        config.crawler.target_count = target;
    }
    if let Some(query) = cli.query {
        config.crawler.query = query;
    }
    validate(&config)?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("star_ripple=info,warn"),
            1 => EnvFilter::new("star_ripple=debug,info"),
            2 => EnvFilter::new("star_ripple=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Star-Ripple Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Query: {}", config.crawler.query);
    println!("  Target count: {}", config.crawler.target_count);
    println!("  Page size: {}", config.crawler.page_size);

    println!("\nAPI:");
    println!("  Endpoint: {}", config.api.endpoint);
    println!("  Token variable: {}", config.api.token_env);
    println!(
        "  Token present: {}",
        std::env::var(&config.api.token_env).is_ok()
    );
    println!("  Timeout: {}s", config.api.timeout_secs);

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Delay: {}ms doubling up to {}ms (jitter: {})",
        config.retry.base_delay_ms, config.retry.max_delay_ms, config.retry.jitter
    );

    println!("\nRate Limit:");
    println!("  Low-water mark: {}", config.rate_limit.low_water_mark);
    println!("  Reset buffer: {}ms", config.rate_limit.reset_buffer_ms);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use star_ripple::output::{load_statistics, print_statistics, TOP_REPOSITORIES};
    use star_ripple::storage::SqliteStorage;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage, TOP_REPOSITORIES)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        tracing::info!("Starting fresh crawl (overwriting any active checkpoint)");
    } else {
        tracing::info!("Starting crawl (will resume from an active checkpoint)");
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing current page...");
            let _ = cancel_tx.send(true);
        }
    });

    let summary = match crawl(&config, !fresh, Some(cancel_rx)).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Crawl could not start: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!(
        "Crawl finished: state {}, {} processed, {} pages, {} rows written, {} quota pauses",
        summary.final_state,
        summary.processed_count,
        summary.pages_fetched,
        summary.rows_written,
        summary.quota_pauses
    );

    match summary.final_state {
        CrawlState::Failed => {
            tracing::error!("Crawl failed. Rerun to resume from the last checkpoint");
            Err(summary
                .last_error
                .map(Into::into)
                .unwrap_or_else(|| "crawl failed".into()))
        }
        CrawlState::Interrupted => {
            tracing::info!("Crawl interrupted; rerun to resume");
            Ok(())
        }
        _ => Ok(()),
    }
}
