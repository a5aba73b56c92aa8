// src/config.rs
//! Pipeline configuration. Defaults are compiled in, an optional TOML file
//! overrides them, and a handful of environment variables override the
//! file. A missing config file is normal and yields the defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::dedup::fingerprint::DEFAULT_SIMILARITY_THRESHOLD;
use crate::dedup::DEFAULT_DEDUP_WINDOW_HOURS;
use crate::dispatch::{
    DispatchConfig, DEFAULT_BATCH_CHAR_BUDGET, DEFAULT_BATCH_PACING_SECS, DEFAULT_EMBED_COLOR,
    DEFAULT_MAX_EMBEDS_PER_MESSAGE,
};
use crate::editor::DEFAULT_TOP_COUNT;
use crate::rewriter::{
    DEFAULT_MAX_DESCRIPTION_LEN, DEFAULT_MAX_TITLE_LEN, DEFAULT_REWRITE_CONCURRENCY,
};

const ENV_CONFIG_PATH: &str = "COURIER_CONFIG_PATH";
const ENV_WEBHOOK_URL: &str = "WEBHOOK_URL";
const ENV_TOP_COUNT: &str = "COURIER_TOP_COUNT";
const ENV_RUN_INTERVAL_SECS: &str = "COURIER_RUN_INTERVAL_SECS";

const DEFAULT_CONFIG_PATH: &str = "config/courier.toml";
const DEFAULT_RUN_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Jaro-Winkler threshold above which two texts count as duplicates.
    pub similarity_threshold: f64,
    /// Lookback for the fuzzy duplicate check, in hours.
    pub dedup_window_hours: i64,
    /// How many items the selection stage keeps.
    pub top_count: usize,
    /// Concurrent rewrite calls in flight.
    pub rewrite_concurrency: usize,
    pub max_title_len: usize,
    pub max_description_len: usize,
    /// Batching limits for the delivery sink.
    pub max_embeds_per_message: usize,
    pub batch_char_budget: usize,
    pub batch_pacing_secs: u64,
    pub embed_color: u32,
    /// Destination webhook. Empty means delivery is disabled.
    pub webhook_url: String,
    /// Scheduler period between pipeline runs.
    pub run_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            dedup_window_hours: DEFAULT_DEDUP_WINDOW_HOURS,
            top_count: DEFAULT_TOP_COUNT,
            rewrite_concurrency: DEFAULT_REWRITE_CONCURRENCY,
            max_title_len: DEFAULT_MAX_TITLE_LEN,
            max_description_len: DEFAULT_MAX_DESCRIPTION_LEN,
            max_embeds_per_message: DEFAULT_MAX_EMBEDS_PER_MESSAGE,
            batch_char_budget: DEFAULT_BATCH_CHAR_BUDGET,
            batch_pacing_secs: DEFAULT_BATCH_PACING_SECS,
            embed_color: DEFAULT_EMBED_COLOR,
            webhook_url: String::new(),
            run_interval_secs: DEFAULT_RUN_INTERVAL_SECS,
        }
    }
}

impl PipelineConfig {
    /// Load from $COURIER_CONFIG_PATH, else config/courier.toml, else
    /// defaults. Env overrides are applied last.
    pub fn load() -> Self {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut cfg = if path.exists() {
            match Self::load_from(&path) {
                Ok(cfg) => {
                    info!(path = %path.display(), "loaded pipeline config");
                    cfg
                }
                Err(e) => {
                    warn!(path = %path.display(), error = ?e, "bad config file; using defaults");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        cfg.apply_env_overrides();
        cfg
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config from {}", path.display()))?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_WEBHOOK_URL) {
            if !url.trim().is_empty() {
                self.webhook_url = url.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var(ENV_TOP_COUNT) {
            match v.parse::<usize>() {
                Ok(n) if n > 0 => self.top_count = n,
                _ => warn!(value = %v, "ignoring unparsable {ENV_TOP_COUNT}"),
            }
        }
        if let Ok(v) = std::env::var(ENV_RUN_INTERVAL_SECS) {
            match v.parse::<u64>() {
                Ok(n) if n > 0 => self.run_interval_secs = n,
                _ => warn!(value = %v, "ignoring unparsable {ENV_RUN_INTERVAL_SECS}"),
            }
        }
    }

    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            max_embeds_per_message: self.max_embeds_per_message,
            batch_char_budget: self.batch_char_budget,
            pacing: Duration::from_secs(self.batch_pacing_secs),
            embed_color: self.embed_color,
        }
    }

    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.run_interval_secs)
    }
}
