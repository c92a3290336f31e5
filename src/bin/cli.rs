//! embermap CLI
//!
//! Local entry point for fetching and inspecting alert feed snapshots.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use embermap::{
    error::Result,
    models::{CacheStatus, Config, FeedSnapshot},
    services::{FeedService, HttpFetcher, HttpGeocodeProvider},
    storage::LocalStore,
    utils::http,
};

/// embermap - Australian fire alert feed pipeline
#[derive(Parser, Debug)]
#[command(name = "embermap", version, about = "Fire alert feed fetcher and cache")]
struct Cli {
    /// Path to storage directory containing config and cache files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one feed (or all feeds) and print the enriched snapshot
    Fetch {
        /// Feed key to fetch; all configured feeds when omitted
        #[arg(long)]
        feed: Option<String>,
    },

    /// Validate the configuration file
    Validate,

    /// Show cached snapshot info without any network call
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_snapshot(snapshot: &FeedSnapshot) {
    println!(
        "{}: {} records ({}, cached at {})",
        snapshot.feed_key,
        snapshot.records.len(),
        snapshot.status.as_str(),
        snapshot.cached_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if snapshot.status == CacheStatus::StaleFallback {
        println!("  warning: upstream unreachable, data may be out of date");
    }
    for record in &snapshot.records {
        let coords = record
            .coordinates
            .map(|(lon, lat)| format!("{lat:.4},{lon:.4}"))
            .unwrap_or_else(|| "unresolved".to_string());
        let level = record
            .warning_level
            .map(|l| format!("{l:?}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  [{}] {} | {} | {}",
            record.timestamp.format("%H:%M"),
            level,
            record.location.as_deref().unwrap_or("no location"),
            coords
        );
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);

    match cli.command {
        Command::Fetch { feed } => {
            config.validate()?;
            let client = http::create_client(&config.fetch)?;
            let store = Arc::new(LocalStore::new(&cli.storage_dir));
            let provider = HttpGeocodeProvider::new(client.clone(), &config.geocoder);
            let service = FeedService::new(store, provider, HttpFetcher::new(client), &config);

            match feed {
                Some(key) => {
                    let snapshot = service.enriched_feed(&key).await?;
                    print_snapshot(&snapshot);
                }
                None => {
                    for (key, result) in service.refresh_all().await {
                        match result {
                            Ok(snapshot) => print_snapshot(&snapshot),
                            Err(e) => log::error!("Feed '{}' failed: {}", key, e),
                        }
                    }
                }
            }
        }

        Command::Validate => {
            config.validate()?;
            println!("Configuration OK: {} feeds configured", config.feeds.len());
            for feed in &config.feeds {
                println!(
                    "  {} ({}, ttl {}s): {}",
                    feed.key,
                    feed.source.as_str(),
                    feed.ttl_secs,
                    feed.url
                );
            }
        }

        Command::Info => {
            let client = http::create_client(&config.fetch)?;
            let store = Arc::new(LocalStore::new(&cli.storage_dir));
            let provider = HttpGeocodeProvider::new(client.clone(), &config.geocoder);
            let service = FeedService::new(store, provider, HttpFetcher::new(client), &config);

            for key in service.feed_keys() {
                match service.cached(&key).await? {
                    Some(entry) => println!(
                        "{}: {} records cached at {}",
                        key,
                        entry.records.len(),
                        entry.cached_at.format("%Y-%m-%d %H:%M:%S UTC")
                    ),
                    None => println!("{key}: no cached snapshot"),
                }
            }
        }
    }

    Ok(())
}
