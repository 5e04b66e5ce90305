//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::ingest::fetcher::SUFFIX_PLACEHOLDER;
use clap::Parser;
use std::path::PathBuf;

/// Skytrail - hour-by-hour replay of airborne sensor tracks
///
/// Polls an hourly upstream feed, normalizes every source into typed
/// points, and replays each hour's trajectory one point at a time.
/// The merged data and the current replay frame are served over HTTP.
///
/// Examples:
///   skytrail
///   skytrail --bind 0.0.0.0:8080 --tick-ms 100
///   skytrail --upstream-url http://localhost:9000/{suffix}.json --sources 6
///   skytrail --once --pretty
///   skytrail --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Upstream source URL template
    ///
    /// `{suffix}` is replaced with the zero-padded hour index (00, 01, ...).
    #[arg(long, value_name = "URL", env = "SKYTRAIL_UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    /// Number of hourly upstream sources
    #[arg(long, value_name = "COUNT")]
    pub sources: Option<u32>,

    /// Per-request upstream timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Address for the HTTP query endpoint
    #[arg(long, value_name = "ADDR", env = "SKYTRAIL_BIND")]
    pub bind: Option<String>,

    /// Milliseconds between two polls of the upstream feed
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Milliseconds between two reveal steps
    #[arg(long, value_name = "MS")]
    pub tick_ms: Option<u64>,

    /// Milliseconds to pause after an hour is fully revealed
    #[arg(long, value_name = "MS")]
    pub pause_ms: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .skytrail.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Poll the feed once, print the merged map as JSON and exit
    #[arg(long)]
    pub once: bool,

    /// Pretty-print JSON written by --once
    #[arg(long, requires = "once")]
    pub pretty: bool,

    /// Generate a default .skytrail.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.upstream_url {
            validate_url_template(url)?;
        }

        if self.sources == Some(0) {
            return Err("Sources must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        for (name, value) in [
            ("--poll-interval-ms", self.poll_interval_ms),
            ("--tick-ms", self.tick_ms),
            ("--pause-ms", self.pause_ms),
        ] {
            if value == Some(0) {
                return Err(format!("{} must be greater than zero", name));
            }
        }

        if let Some(ref bind) = self.bind {
            if bind.parse::<std::net::SocketAddr>().is_err() {
                return Err(format!("Invalid bind address: {}", bind));
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

/// An upstream template must be an HTTP(S) URL with a suffix placeholder.
pub fn validate_url_template(url: &str) -> Result<(), String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err("Upstream URL must start with 'http://' or 'https://'".to_string());
    }
    if !url.contains(SUFFIX_PLACEHOLDER) {
        return Err(format!(
            "Upstream URL must contain the {} placeholder",
            SUFFIX_PLACEHOLDER
        ));
    }
    Ok(())
}
