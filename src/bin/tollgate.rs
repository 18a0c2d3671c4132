//! tollgate: rate-limited, cached requests from the command line
//!
//! Operator tool around a single gate: run one request through it, or
//! inspect and maintain the disk cache.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tollgate::{CacheConfig, Config, GateBuilder, RequestParams, TieredCache};

/// Tollgate CLI
#[derive(Parser)]
#[command(name = "tollgate")]
#[command(version = tollgate::PKG_VERSION)]
#[command(about = "Adaptive rate limiting and response caching for quota-bound APIs")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// API key sent with every request
    #[arg(long, env = "TOLLGATE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute one request and print the response body
    Fetch {
        /// Request parameters as key=value pairs
        #[arg(value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Endpoint URL (overrides http.base_url)
        #[arg(short, long)]
        url: Option<String>,
        /// Cache TTL in seconds for this response
        #[arg(long)]
        ttl: Option<f64>,
        /// Skip the cache lookup (the response is still cached)
        #[arg(long)]
        fresh: bool,
    },

    /// Inspect or maintain the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Show cache location and entry counts
    Stats,
    /// Remove expired and corrupt entries
    Cleanup,
    /// Remove every entry
    Clear,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// The CLI always persists: without a configured directory it falls back to
/// the platform cache dir.
fn cli_cache_config(mut cache: CacheConfig) -> CacheConfig {
    if cache.disk_dir.is_none() {
        cache.disk_dir = tollgate::default_disk_dir();
    }
    cache
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.cache = cli_cache_config(config.cache);
    if let Some(key) = args.api_key {
        config.http.api_key = Some(key);
    }

    tracing::info!(version = %tollgate::version_string(), "tollgate starting");

    match args.command {
        Command::Fetch {
            params,
            url,
            ttl,
            fresh,
        } => {
            if let Some(url) = url {
                config.http.base_url = Some(url);
            }
            let ttl = ttl.map(Duration::try_from_secs_f64).transpose()?;
            let gate = GateBuilder::from_config(config).build()?;
            let params: RequestParams = params.into_iter().collect();

            let response = if fresh {
                gate.execute_fresh(&params, ttl).await?
            } else {
                gate.execute(&params, ttl).await?
            };
            tracing::info!(
                cached = response.cached,
                status = response.payload.status,
                "request complete"
            );
            println!("{}", response.payload.text());
        }

        Command::Cache { command } => {
            let cache = TieredCache::new(&config.cache)?;
            let dir = cache
                .disk_dir()
                .map_or_else(|| "(none)".to_string(), |d| d.display().to_string());
            match command {
                CacheCommand::Stats => {
                    println!("directory: {dir}");
                    println!("entries: {}", cache.disk_entries().await?);
                    println!("default ttl: {}s", cache.default_ttl().as_secs_f64());
                }
                CacheCommand::Cleanup => {
                    let report = cache.cleanup_expired().await?;
                    println!("directory: {dir}");
                    println!("expired removed: {}", report.disk_expired);
                    println!("corrupt removed: {}", report.disk_corrupt);
                    println!("failed to remove: {}", report.disk_failed);
                    println!("remaining: {}", report.disk_remaining);
                }
                CacheCommand::Clear => {
                    let before = cache.disk_entries().await?;
                    cache.clear().await?;
                    println!("removed {before} entries from {dir}");
                }
            }
        }
    }

    Ok(())
}
