//! Clawdgle main entry point
//!
//! This is the command-line interface for the Clawdgle crawl worker.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use clawdgle::config::{load_config_with_hash, Config};
use clawdgle::crawler::{CrawlContext, CrawlTask, WorkerPool};
use clawdgle::publish::{
    BlobStore, FsBlobStore, MemoryBlobStore, MemoryIndex, Publisher, SearchIndex, SqliteIndex,
};
use clawdgle::stats::{load_status, print_status, CrawlStats};
use clawdgle::storage::{open_storage, FrontierStore, MemoryStore, PolitenessStore, StatsStore};
use clawdgle::url::normalize_url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Clawdgle: a polite crawler feeding a markdown search index
///
/// Workers pull URLs from a shared frontier, respect robots.txt and per-host
/// delays, store each page as markdown and index it for search.
#[derive(Parser, Debug)]
#[command(name = "clawdgle")]
#[command(version)]
#[command(about = "A polite crawl worker feeding a markdown search index", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "clawdgle.toml", global = true)]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run crawl workers until Ctrl-C
    Worker {
        /// Override the configured number of workers
        #[arg(long)]
        concurrency: Option<u32>,

        /// Keep frontier, blobs and index in memory (nothing is persisted)
        #[arg(long)]
        in_memory: bool,

        /// URLs to enqueue at depth 0 before starting
        #[arg(long = "seed", value_name = "URL")]
        seeds: Vec<String>,
    },

    /// Add URLs to the frontier
    Seed {
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Depth recorded on the seeded tasks
        #[arg(long, default_value_t = 0)]
        depth: u32,
    },

    /// Show counters, queue depth and worker liveness
    Stats,

    /// Search indexed documents
    Search {
        query: String,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 10)]
        per_page: u32,
    },

    /// Print the stored markdown for a crawled URL
    Doc { url: String },

    /// Validate the configuration and print the effective settings
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Worker {
            concurrency,
            in_memory,
            seeds,
        } => handle_worker(config, concurrency, in_memory, seeds).await,
        Command::Seed { urls, depth } => handle_seed(&config, &urls, depth).await,
        Command::Stats => handle_stats(&config).await,
        Command::Search {
            query,
            page,
            per_page,
        } => handle_search(&config, &query, page, per_page).await,
        Command::Doc { url } => handle_doc(&config, &url).await,
        Command::Check => handle_check(&config, &config_hash),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG`, when set, wins over the flags.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("clawdgle=info,warn"),
                1 => EnvFilter::new("clawdgle=debug,info"),
                2 => EnvFilter::new("clawdgle=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn database_path(config: &Config) -> &Path {
    Path::new(&config.storage.database_path)
}

/// Builds the publisher over the on-disk blob directory and the SQLite index
fn disk_publisher(config: &Config, index: SqliteIndex) -> Publisher {
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.blob.root));
    let index: Arc<dyn SearchIndex> = Arc::new(index);
    Publisher::new(blobs, index, &config.blob, &config.index)
}

/// Handles `worker`: runs the pool until Ctrl-C
async fn handle_worker(
    mut config: Config,
    concurrency: Option<u32>,
    in_memory: bool,
    seeds: Vec<String>,
) -> anyhow::Result<()> {
    if let Some(concurrency) = concurrency {
        if !(1..=100).contains(&concurrency) {
            bail!("--concurrency must be between 1 and 100, got {}", concurrency);
        }
        config.crawler.concurrency = concurrency;
    }

    if in_memory {
        tracing::info!("Running with in-memory storage; nothing will be persisted");
        let store = Arc::new(MemoryStore::new());
        let publisher = Publisher::new(
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MemoryIndex::new()),
            &config.blob,
            &config.index,
        );
        run_workers(&config, store, publisher, &seeds).await
    } else {
        let store = Arc::new(
            open_storage(database_path(&config))
                .with_context(|| format!("Failed to open {}", config.storage.database_path))?,
        );
        let publisher = disk_publisher(&config, SqliteIndex::new(store.connection()));
        run_workers(&config, store, publisher, &seeds).await
    }
}

async fn run_workers<S>(
    config: &Config,
    store: Arc<S>,
    publisher: Publisher,
    seeds: &[String],
) -> anyhow::Result<()>
where
    S: FrontierStore + PolitenessStore + StatsStore + 'static,
{
    publisher
        .prepare()
        .await
        .context("Failed to prepare the search index")?;

    for seed in seeds {
        store
            .enqueue(&CrawlTask::seed(seed.clone()))
            .await
            .with_context(|| format!("Failed to enqueue seed {}", seed))?;
    }

    tracing::info!(
        "Crawler settings: max depth {}, {} allowed domains, robots {}, polite delay {}s",
        config.crawler.max_depth,
        config.crawler.allow_domains.len(),
        if config.crawler.respect_robots { "respected" } else { "ignored" },
        config.crawler.polite_delay_secs
    );

    let ctx = CrawlContext::from_config(config, store, publisher)?;
    let pool = WorkerPool::new(Arc::new(ctx), config.crawler.concurrency as usize);
    let handled = pool.run_until_ctrl_c().await;

    tracing::info!("Worker pool exited after {} tasks", handled);
    Ok(())
}

/// Handles `seed`: enqueues URLs for the workers
async fn handle_seed(config: &Config, urls: &[String], depth: u32) -> anyhow::Result<()> {
    let store = open_storage(database_path(config))
        .with_context(|| format!("Failed to open {}", config.storage.database_path))?;

    let mut queued = 0;
    for url in urls {
        match normalize_url(url) {
            Ok(normalized) => {
                store
                    .enqueue(&CrawlTask::new(normalized.to_string(), depth))
                    .await
                    .with_context(|| format!("Failed to enqueue {}", url))?;
                queued += 1;
            }
            Err(e) => tracing::warn!("Not queueing {}: {}", url, e),
        }
    }

    println!("Queued {} of {} URLs at depth {}", queued, urls.len(), depth);
    Ok(())
}

/// Handles `stats`: prints counters, queue depth and heartbeat
async fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let store = Arc::new(
        open_storage(database_path(config))
            .with_context(|| format!("Failed to open {}", config.storage.database_path))?,
    );
    let stats = CrawlStats::new(store.clone());
    let report = load_status(&stats, store.as_ref()).await?;

    print_status(&report);
    Ok(())
}

/// Handles `search`: queries the index and prints the hits
async fn handle_search(
    config: &Config,
    query: &str,
    page: u32,
    per_page: u32,
) -> anyhow::Result<()> {
    let index = SqliteIndex::open(database_path(config))?;
    let publisher = disk_publisher(config, index);

    let results = publisher.search(query, page, per_page).await?;
    println!(
        "{} results for {:?} (page {}, {} per page)\n",
        results.found, query, results.page, results.per_page
    );
    for hit in &results.hits {
        let title = if hit.title.is_empty() { "(untitled)" } else { hit.title.as_str() };
        println!("  {}\n    {}", title, hit.url);
    }
    Ok(())
}

/// Handles `doc`: looks up a crawled URL and prints its markdown
async fn handle_doc(config: &Config, url: &str) -> anyhow::Result<()> {
    let index = SqliteIndex::open(database_path(config))?;
    let publisher = disk_publisher(config, index);

    let lookup = normalize_url(url)
        .map(|normalized| normalized.to_string())
        .unwrap_or_else(|_| url.to_string());

    let Some(document) = publisher.find_by_url(&lookup).await? else {
        bail!("No indexed document for {}", lookup);
    };
    let markdown = publisher
        .load(&document.storage_key)
        .await
        .with_context(|| format!("Failed to read {}", document.storage_key))?;

    println!("URL: {}", document.url);
    println!("Title: {}", document.title);
    println!("Fetched at: {}", document.fetched_at);
    println!();
    println!("{}", markdown);
    Ok(())
}

/// Handles `check`: prints the validated configuration
fn handle_check(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    println!("=== Clawdgle Configuration ===\n");

    println!("Crawler:");
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Timeout: {}s", config.crawler.timeout_secs);
    println!("  Max bytes: {}", config.crawler.max_bytes);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Respect robots.txt: {}", config.crawler.respect_robots);
    println!("  Polite delay: {}s", config.crawler.polite_delay_secs);
    println!("  Dequeue timeout: {}s", config.crawler.dequeue_timeout_secs);
    if config.crawler.allow_domains.is_empty() {
        println!("  Allowed domains: (any)");
    } else {
        println!("  Allowed domains ({}):", config.crawler.allow_domains.len());
        for domain in &config.crawler.allow_domains {
            println!("    - {}", domain);
        }
    }

    println!("\nUser Agent:");
    println!("  Header: {}", config.user_agent.header_value());
    println!("  robots.txt token: {}", config.user_agent.product_token());

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!(
        "  Blobs: {}/{}/{}",
        config.blob.root, config.blob.bucket, config.blob.prefix
    );
    println!("  Index collection: {}", config.index.collection);

    println!("\nRetry:");
    if config.retry.max_attempts == 0 {
        println!("  Disabled");
    } else {
        println!(
            "  Up to {} retries, {}s base backoff",
            config.retry.max_attempts, config.retry.backoff_secs
        );
    }

    println!("\n✓ Configuration is valid (hash: {})", config_hash);
    Ok(())
}
