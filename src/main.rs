use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use feedsync::config::Config;
use feedsync::feed::HttpRetriever;
use feedsync::scrape::{ScrapeContext, ScrapeSettings, Scheduler};
use feedsync::storage::Database;

/// Get the config directory path (~/.config/feedsync/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedsync"))
}

/// Get the default data directory path (~/.local/share/feedsync/)
fn get_data_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("feedsync"))
}

#[derive(Parser, Debug)]
#[command(name = "feedsync", about = "Poll RSS feeds on a schedule and store new entries")]
struct Args {
    /// Config file (default: ~/.config/feedsync/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Maximum feeds fetched concurrently per cycle
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Seconds between cycles
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("feedsync=info")),
        )
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Command-line flags win over the config file
    if let Some(database) = args.database {
        config.database_path = Some(database);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(interval) = args.interval {
        config.interval_secs = interval;
    }
    config.validate()?;

    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => {
            let data_dir = get_data_dir()?;
            std::fs::create_dir_all(&data_dir).with_context(|| {
                format!("Failed to create data directory {}", data_dir.display())
            })?;
            data_dir.join("feeds.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let entries = db.count_entries().await.context("Failed to count entries")?;
    tracing::info!(path = %db_path.display(), entries = entries, "Opened database");

    let retriever = HttpRetriever::new(&config.user_agent, config.call_timeout())
        .context("Failed to build HTTP client")?;
    let ctx = ScrapeContext::new(
        Arc::new(db.clone()),
        Arc::new(retriever),
        ScrapeSettings::from(&config),
    );
    let scheduler = Scheduler::new(ctx);

    if args.once {
        let report = scheduler.run_cycle().await?;
        println!(
            "Scraped {} feeds ({} completed, {} aborted): {} items found, {} new entries",
            report.dispatched,
            report.completed,
            report.aborted,
            report.items_found,
            report.inserted
        );
        return Ok(());
    }

    let handle = scheduler.spawn();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    handle.shutdown().await;

    Ok(())
}
