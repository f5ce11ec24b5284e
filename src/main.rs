//! FlyTeam collector main entry point
//!
//! This is the command-line interface for the aircraft registry collector.

use clap::Parser;
use flyteam_collector::config::{load_config_with_hash, validate, Config};
use flyteam_collector::crawler::run_crawl;
use flyteam_collector::model::normalize_registration;
use flyteam_collector::output::{load_statistics, print_statistics, print_summary};
use flyteam_collector::storage::{open_storage, spawn_writer, ArchiveTarget};
use flyteam_collector::url::resolve_start_url;
use flyteam_collector::CollectorError;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// FlyTeam collector: an aircraft registry crawler
///
/// Walks the registry from the region index (or any lower start page) down
/// to aircraft detail pages, following alias links between registrations,
/// and stores aircraft, operating histories and alias links in SQLite.
#[derive(Parser, Debug)]
#[command(name = "flyteam-collector")]
#[command(version)]
#[command(about = "An aircraft registry crawler", long_about = None)]
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

    /// Override the start page (absolute URL or path under the base URL)
    #[arg(long, value_name = "URL")]
    start_url: Option<String>,

    /// Override the maximum number of concurrent requests
    #[arg(long, value_name = "N")]
    concurrency: Option<u32>,

    /// Override the number of records per committed batch
    #[arg(long, value_name = "K")]
    batch_size: Option<usize>,

    /// Only follow countries of this region from the region index
    #[arg(long, value_name = "SLUG")]
    region: Option<String>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "archive"])]
    dry_run: bool,

    /// Show row counts from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "archive"])]
    stats: bool,

    /// Move one aircraft, with its histories and alias links, into the archive tables
    #[arg(long, value_name = "REGISTRATION", conflicts_with_all = ["dry_run", "stats"])]
    archive: Option<String>,
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

    apply_overrides(&mut config, &cli);
    validate(&config)?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(registration) = &cli.archive {
        handle_archive(&config, registration).await?;
    } else {
        handle_crawl(config).await?;
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
            0 => EnvFilter::new("flyteam_collector=info,warn"),
            1 => EnvFilter::new("flyteam_collector=debug,info"),
            2 => EnvFilter::new("flyteam_collector=trace,debug"),
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

/// Applies command-line overrides on top of the file configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(start_url) = &cli.start_url {
        config.crawler.start_url = start_url.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawler.max_concurrent_requests = concurrency;
    }
    if let Some(batch_size) = cli.batch_size {
        config.writer.batch_size = batch_size;
    }
    if let Some(region) = &cli.region {
        config.crawler.region = Some(region.clone());
    }
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== FlyTeam Collector Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Base URL: {}", config.crawler.base_url);
    println!("  Start URL: {}", config.crawler.start_url);
    println!(
        "  Region filter: {}",
        config.crawler.region.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!(
        "  Backoff: {}ms base, {}ms jitter",
        config.crawler.retry_base_delay_ms, config.crawler.retry_jitter_ms
    );
    println!(
        "  Max Retry-After: {}s",
        config.crawler.max_retry_after_secs
    );
    println!(
        "  Timeouts: {}s total, {}s connect",
        config.crawler.request_timeout_secs, config.crawler.connect_timeout_secs
    );

    println!("\nWriter:");
    println!("  Batch size: {}", config.writer.batch_size);
    println!("  Queue capacity: {}", config.writer.queue_capacity);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    if let Some(seed) = resolve_start_url(&config.crawler.base_url, &config.crawler.start_url) {
        println!("✓ Would start crawling at {} ({})", seed.url, seed.kind);
    }

    Ok(())
}

/// Handles the --stats mode: shows row counts from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let store = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(store.connection())?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --archive mode: archives one aircraft through the writer
async fn handle_archive(
    config: &Config,
    registration: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let registration = normalize_registration(registration)?;
    let store = open_storage(Path::new(&config.output.database_path))?;
    let (writer, writer_task) = spawn_writer(
        store.into_connection(),
        config.writer.batch_size,
        config.writer.queue_capacity,
    );

    let target = ArchiveTarget::Aircraft { registration };
    tracing::info!("Archiving {}", target);

    // A failed send means the writer stopped; join surfaces its error
    if writer.archive(target.clone()).await.is_ok() {
        let _ = writer.finish().await;
    }
    drop(writer);

    let stats = writer_task.join().await?;
    if stats.archived_rows == 0 {
        println!("Nothing to archive for {}", target);
    } else {
        println!("✓ Archived {} rows for {}", stats.archived_rows, target);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(cancel.clone()));

    let mut summary = match run_crawl(&config, cancel).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    if let Some(e) = &summary.writer_error {
        tracing::error!("Crawl aborted by store error: {}", e);
    } else if summary.report.interrupted {
        tracing::warn!("Crawl interrupted; committed batches are kept");
    } else {
        tracing::info!("Crawl completed successfully");
    }
    print_summary(&summary);

    // Exit non-zero only after the operator has seen the summary
    match summary.writer_error.take() {
        Some(e) => Err(CollectorError::from(e).into()),
        None => Ok(()),
    }
}

/// Cancels `cancel` on Ctrl+C, or SIGTERM on unix
async fn wait_for_shutdown(cancel: CancellationToken) {
    if let Err(e) = shutdown_signal().await {
        tracing::error!("Failed to wait for shutdown signal: {}", e);
        return;
    }

    tracing::info!("Shutdown signal received, finishing in-flight pages...");
    cancel.cancel();
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
