use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixcache::{
    config::Config,
    database::MetadataStore,
    models::TransformOptions,
    network::HttpFetchClient,
    pipeline::RevalidationPipeline,
    services::{CacheManager, Prefetcher},
    storage::{DirectoryManager, DiskObjectStore},
};

#[derive(Parser)]
#[command(name = "pixcache")]
#[command(version)]
#[command(about = "A revalidating remote image cache")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "pixcache.toml")]
    config: String,

    /// Cache root directory (overrides config file)
    #[arg(short = 'r', long, value_name = "DIR")]
    cache_root: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load one image through the cache
    Fetch {
        url: String,

        /// Bounding box width; requires --height
        #[arg(long, requires = "height")]
        width: Option<u32>,

        /// Bounding box height; requires --width
        #[arg(long, requires = "width")]
        height: Option<u32>,

        /// JPEG quality used when a bounding box is given
        #[arg(long, default_value_t = 100)]
        quality: u8,

        /// Write the newest payload to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Warm the cache for several images concurrently
    Prefetch {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Delete every cached image and metadata record
    Wipe,
    /// Report disk usage of the cache
    Usage {
        /// Capacity used to compute a percentage
        #[arg(long, value_name = "MB")]
        capacity_mb: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("pixcache={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pixcache v{}", env!("CARGO_PKG_VERSION"));

    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    if let Some(cache_root) = cli.cache_root {
        config.storage.cache_root = cache_root;
    }
    config.validate()?;
    info!("Using cache root: {}", config.storage.cache_root.display());

    let directories = Arc::new(DirectoryManager::from_config(&config.storage));
    let store = Arc::new(
        MetadataStore::new(directories.clone())
            .await
            .context("Failed to open metadata store")?,
    );

    match cli.command {
        Command::Fetch {
            url,
            width,
            height,
            quality,
            output,
        } => {
            let transform = match (width, height) {
                (Some(width), Some(height)) => Some(TransformOptions::new(width, height, quality)),
                _ => config.transform,
            };
            let pipeline = build_pipeline(&config, store.clone(), directories.clone())?
                .with_transform(transform);

            let outcome = pipeline.load(url.as_str(), CancellationToken::new()).await;

            for payload in &outcome.values {
                println!(
                    "{}: {}x{} ({} bytes)",
                    payload.source.as_str(),
                    payload.width,
                    payload.height,
                    payload.data.len()
                );
            }

            if let (Some(path), Some(latest)) = (output, outcome.latest()) {
                tokio::fs::write(&path, &latest.data)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote {} bytes to {}", latest.data.len(), path.display());
            }

            if outcome.is_revalidated_unchanged() {
                println!("not modified");
            } else if let Some(e) = outcome.error {
                store.close().await;
                return Err(e).with_context(|| format!("Failed to load {}", url));
            }
        }
        Command::Prefetch { urls } => {
            let pipeline = build_pipeline(&config, store.clone(), directories.clone())?
                .with_transform(config.transform);
            let summary = Prefetcher::new(pipeline)
                .prefetch(urls, CancellationToken::new())
                .await;
            println!("loaded: {}, failed: {}", summary.loaded, summary.failed);
        }
        Command::Wipe => {
            let report = CacheManager::new(store.clone(), directories.clone())
                .clean()
                .await?;
            println!(
                "removed: {}, failed: {}",
                report.removed_entries, report.failed_entries
            );
        }
        Command::Usage { capacity_mb } => {
            let usage = CacheManager::new(store.clone(), directories.clone())
                .usage(capacity_mb.map(|mb| mb * 1024 * 1024))
                .await;
            match usage.formatted_percent() {
                Some(percent) => println!("{} ({} of capacity)", usage.formatted_size(), percent),
                None => println!("{}", usage.formatted_size()),
            }
        }
    }

    store.close().await;
    Ok(())
}

fn build_pipeline(
    config: &Config,
    store: Arc<MetadataStore>,
    directories: Arc<DirectoryManager>,
) -> Result<RevalidationPipeline> {
    let fetcher = HttpFetchClient::new(&config.http)?;
    Ok(RevalidationPipeline::new(
        store,
        DiskObjectStore::new(directories),
        Arc::new(fetcher),
    ))
}
