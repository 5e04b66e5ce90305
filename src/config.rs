//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.skytrail.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".skytrail.toml";

/// Upper bound for every schedule interval (one day).
pub const MAX_SCHEDULE_MS: u64 = 86_400_000;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream feed settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Poll and playback timers.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Upstream feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Source URL; `{suffix}` is replaced by the zero-padded hour index.
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// Number of hourly sources (`00` up to `source_count - 1`).
    #[serde(default = "default_source_count")]
    pub source_count: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            source_count: default_source_count(),
            timeout_seconds: default_timeout(),
        }
    }
}

pub fn default_url_template() -> String {
    "https://a.windbornesystems.com/treasure/{suffix}.json".to_string()
}

fn default_source_count() -> u32 {
    24
}

fn default_timeout() -> u64 {
    10
}

/// Poll and playback timers, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Period between two polls of the upstream feed.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Period between two reveal steps.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Pause after an hour is fully revealed.
    #[serde(default = "default_hour_pause")]
    pub hour_pause_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            tick_interval_ms: default_tick_interval(),
            hour_pause_ms: default_hour_pause(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30_000
}

fn default_tick_interval() -> u64 {
    200
}

fn default_hour_pause() -> u64 {
    5_000
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the query endpoint listens on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5780".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.skytrail.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.upstream_url {
            self.upstream.url_template = url.clone();
        }
        if let Some(sources) = args.sources {
            self.upstream.source_count = sources;
        }
        if let Some(timeout) = args.timeout {
            self.upstream.timeout_seconds = timeout;
        }

        if let Some(poll) = args.poll_interval_ms {
            self.schedule.poll_interval_ms = poll;
        }
        if let Some(tick) = args.tick_ms {
            self.schedule.tick_interval_ms = tick;
        }
        if let Some(pause) = args.pause_ms {
            self.schedule.hour_pause_ms = pause;
        }

        if let Some(ref bind) = args.bind {
            self.server.bind = bind.clone();
        }
    }

    /// Check values that would make the service misbehave.
    pub fn validate(&self) -> Result<(), String> {
        crate::cli::validate_url_template(&self.upstream.url_template)?;

        if self.upstream.source_count == 0 {
            return Err("upstream.source_count must be at least 1".to_string());
        }
        if self.upstream.timeout_seconds == 0 {
            return Err("upstream.timeout_seconds must be at least 1".to_string());
        }
        if self.schedule.poll_interval_ms == 0
            || self.schedule.tick_interval_ms == 0
            || self.schedule.hour_pause_ms == 0
        {
            return Err("schedule intervals must be greater than zero".to_string());
        }
        if self.schedule.poll_interval_ms > MAX_SCHEDULE_MS
            || self.schedule.tick_interval_ms > MAX_SCHEDULE_MS
            || self.schedule.hour_pause_ms > MAX_SCHEDULE_MS
        {
            return Err(format!(
                "schedule intervals must not exceed {} ms",
                MAX_SCHEDULE_MS
            ));
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
