//! Division crawler main entry point
//!
//! This is the command-line interface for the incremental administrative
//! division crawler.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use division_crawler::cache::{CacheJanitor, PageCache};
use division_crawler::config::{load_config_with_hash, Config};
use division_crawler::crawler::{run_detail_pass, Coordinator, RunOptions};
use division_crawler::history::RunHistoryTracker;
use division_crawler::output::{
    export_run_history, print_statistics, write_clean_audit, RunStatistics,
};
use division_crawler::storage::{open_history_store, open_page_cache_store};
use division_crawler::CrawlerError;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Division Crawler: incremental administrative-division code crawler
///
/// Crawls every published release of the statistical division codes down to
/// village level, reusing cached pages for releases that have not changed
/// since the last run.
#[derive(Parser, Debug)]
#[command(name = "division-crawler")]
#[command(version = "1.0.0")]
#[command(about = "Incremental administrative-division code crawler", long_about = None)]
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

    /// Ignore run history and fetch every page from origin
    #[arg(long)]
    fresh: bool,

    /// Only crawl the given release year (repeatable)
    #[arg(long = "only", value_name = "YEAR")]
    only: Vec<String>,

    /// Discover datasets and show trust decisions without crawling
    #[arg(long, conflicts_with_all = ["clean_cache", "export_history", "details"])]
    dry_run: bool,

    /// Remove invalid page-cache entries and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_history", "details"])]
    clean_cache: bool,

    /// Export run history under the log directory and exit
    #[arg(long, conflicts_with_all = ["dry_run", "clean_cache", "details"])]
    export_history: bool,

    /// Run the GB/T 2260 detail-page pass and exit
    #[arg(long, conflicts_with_all = ["dry_run", "clean_cache", "export_history"])]
    details: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let options = RunOptions {
        fresh: cli.fresh,
        only_years: cli.only.clone(),
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(config, options).await
    } else if cli.clean_cache {
        handle_clean_cache(&config)
    } else if cli.export_history {
        handle_export_history(&config)
    } else if cli.details {
        handle_details(&config).await
    } else {
        handle_crawl(config, options).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("division_crawler=info,warn"),
            1 => EnvFilter::new("division_crawler=debug,info"),
            2 => EnvFilter::new("division_crawler=trace,debug"),
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

/// Handles the --dry-run mode: shows what would be crawled and how
async fn handle_dry_run(config: Config, options: RunOptions) -> anyhow::Result<()> {
    println!("=== Division Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Entry page: {}", config.crawler.entry_url);
    println!("  Encoding: {}", config.crawler.encoding);
    println!("  Timeout: {}s", config.crawler.timeout_secs);
    println!(
        "  Request delay: {}-{}ms",
        config.crawler.min_delay_ms, config.crawler.max_delay_ms
    );

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Data: {}", config.output.data_dir);
    println!("  Logs: {}", config.output.log_dir);

    println!("\nSkip-level rules ({}):", config.skip_level.len());
    for rule in &config.skip_level {
        println!("  - {} -> {} in {}", rule.code, rule.skip_to, rule.years.join(", "));
    }

    let coordinator = Coordinator::new(config, options)?;
    let plans = coordinator
        .preview()
        .await
        .context("dataset discovery failed")?;

    println!("\nDatasets ({}):", plans.len());
    for plan in &plans {
        println!(
            "  - {} published {} -> {} [{}]",
            plan.queue.year,
            plan.queue.last_modified,
            plan.queue.file_name,
            if plan.use_cache { "cache trusted" } else { "full fetch" }
        );
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --clean-cache mode: audits, then purges invalid entries
fn handle_clean_cache(config: &Config) -> anyhow::Result<()> {
    let run_date = Utc::now().timestamp();
    let log_dir = Path::new(&config.output.log_dir);

    let store = open_page_cache_store(Path::new(&config.storage.database_path))?;
    let mut cache = PageCache::new(store);
    let mut janitor = CacheJanitor::new(&mut cache);

    let report = janitor
        .clean(|scan| {
            write_clean_audit(log_dir, run_date, scan)
                .map(|_| ())
                .map_err(CrawlerError::from)
        })
        .context("cache clean aborted")?;

    println!(
        "Scanned {} entries: {} valid, {} invalid",
        report.scan.all_keys.len(),
        report.scan.valid_keys.len(),
        report.scan.invalid_keys.len()
    );
    println!("Deleted {} entries", report.purge.deleted);

    if !report.purge.failed.is_empty() {
        bail!(
            "{} invalid entries could not be deleted: {:?}",
            report.purge.failed.len(),
            report.purge.failed
        );
    }
    Ok(())
}

/// Handles the --export-history mode
fn handle_export_history(config: &Config) -> anyhow::Result<()> {
    let store = open_history_store(Path::new(&config.storage.database_path))?;
    let tracker = RunHistoryTracker::open(store).context("run history is unreadable")?;

    let written = export_run_history(Path::new(&config.output.log_dir), tracker.history())?;

    for run in tracker.history() {
        print_statistics(&RunStatistics::from_record(run));
        println!();
    }
    println!(
        "✓ Exported {} records to {}/run-records",
        written.len(),
        config.output.log_dir
    );
    Ok(())
}

/// Handles the --details mode: the GB/T 2260 pass
async fn handle_details(config: &Config) -> anyhow::Result<()> {
    let Some(detail) = &config.detail else {
        bail!("no [detail] section in configuration");
    };

    let outcomes = run_detail_pass(&config.crawler, detail).await?;
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();

    println!(
        "Detail pass: {} pages, {} written, {} failed",
        outcomes.len(),
        outcomes.len() - failed,
        failed
    );
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, options: RunOptions) -> anyhow::Result<()> {
    if options.fresh {
        tracing::info!("Starting fresh crawl (cache not trusted)");
    } else {
        tracing::info!("Starting incremental crawl");
    }

    let mut coordinator = Coordinator::new(config, options)?;
    match coordinator.run().await {
        Ok(stats) => {
            tracing::info!("Crawl completed successfully");
            print_statistics(&stats);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
