//! Skytrail - hour-by-hour replay of airborne sensor tracks
//!
//! Polls an hourly upstream feed, groups the samples per hour and replays
//! each hour's trajectory one point at a time, serving the merged map and
//! the current replay frame over HTTP.
//!
//! Exit codes:
//!   0 - Clean shutdown
//!   1 - Startup error (invalid arguments or config, bind failure, etc.)

mod cli;
mod config;
mod ingest;
mod models;
mod scheduler;
mod server;

use anyhow::{Context, Result};
use cli::Args;
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use ingest::{FeedClient, FeedConfig, FlightSource};
use scheduler::SchedulerConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Skytrail v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args).await {
        error!("Skytrail failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .skytrail.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE_NAME))?;

    println!(
        "✅ Created {} with default settings.",
        config::CONFIG_FILE_NAME
    );
    println!("   Edit it to customize the upstream feed, timers and bind address.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let feed = FeedClient::new(FeedConfig::from(&config.upstream))?;
    info!(
        "Upstream: {} ({} sources)",
        feed.config().url_template,
        feed.config().source_count
    );

    if args.once {
        return handle_once(&feed, args.pretty, args.quiet).await;
    }

    let source: Arc<dyn FlightSource> = Arc::new(feed);
    let scheduler = scheduler::spawn(source.clone(), SchedulerConfig::from(&config.schedule));

    let state = server::AppState {
        source,
        view: scheduler.subscribe(),
    };

    let served = server::start(&config.server.bind, state, shutdown_signal()).await;

    let last = scheduler.view();
    info!(
        "Shutting down ({} hours loaded, showing {})",
        scheduler.flight_map().len(),
        last.hour_key
            .map(|key| key.to_string())
            .unwrap_or_else(|| "nothing".to_string())
    );
    scheduler.shutdown().await;

    served.with_context(|| format!("HTTP server on {} failed", config.server.bind))
}

/// Handle --once: poll every source a single time and print the map.
async fn handle_once(feed: &FeedClient, pretty: bool, quiet: bool) -> Result<()> {
    let spinner = if quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!(
            "Polling {} upstream sources...",
            feed.config().source_count
        ));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    };

    let map = feed.fetch_and_normalize().await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    info!(
        "{} of {} sources answered, {} points",
        map.len(),
        feed.config().source_count,
        map.total_points()
    );

    let output = if pretty {
        serde_json::to_string_pretty(&map)
    } else {
        serde_json::to_string(&map)
    }
    .context("Failed to serialize flight map")?;

    println!("{}", output);
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
