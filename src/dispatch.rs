// src/dispatch.rs
//! Batched webhook delivery. Enriched items become embed entries, entries
//! are packed into batches bounded by an entry count and a character
//! budget, and batches go out strictly one after another with pacing in
//! between, because the sink rate-limits per webhook. A batch that
//! exhausts its retries drops its items from the success set without
//! stopping the batches behind it.

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::model::{EnrichedItem, NewsItem};
use crate::oracle::RetryPolicy;
use crate::rewriter::truncate_chars;

pub const DEFAULT_MAX_EMBEDS_PER_MESSAGE: usize = 10;
pub const DEFAULT_BATCH_CHAR_BUDGET: usize = 6000;
pub const DEFAULT_BATCH_PACING_SECS: u64 = 3;
pub const DEFAULT_EMBED_COLOR: u32 = 3_447_003;

/// Sink-protocol caps on a single embed.
const MAX_TITLE_LENGTH: usize = 256;
const MAX_DESCRIPTION_LENGTH: usize = 4096;

const SEND_TIMEOUT: Duration = Duration::from_secs(60);
const ALL_BATCHES_TIMEOUT: Duration = Duration::from_secs(300);

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://").expect("url regex"));

/// One entry of a webhook message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    pub timestamp: String,
}

impl Embed {
    fn char_cost(&self) -> usize {
        self.title.chars().count() + self.description.chars().count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
}

/// Failure classification at the sink boundary, used by the retry filter.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("sink rejected payload (HTTP {0})")]
    Client(u16),
    #[error("sink server error (HTTP {0})")]
    Server(u16),
    #[error("sink rate limited")]
    RateLimited,
    #[error("sink transport failure: {0}")]
    Transport(String),
}

impl SinkError {
    /// Client errors mean the payload itself is bad; retrying cannot help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SinkError::Client(_))
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), SinkError>;
}

/// HTTP sink posting JSON to a webhook URL.
pub struct WebhookSink {
    http: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), SinkError> {
        let resp = self
            .http
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 429 {
            return Err(SinkError::RateLimited);
        }
        if status.is_server_error() {
            return Err(SinkError::Server(status.as_u16()));
        }
        Err(SinkError::Client(status.as_u16()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub max_embeds_per_message: usize,
    pub batch_char_budget: usize,
    pub pacing: Duration,
    pub embed_color: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_embeds_per_message: DEFAULT_MAX_EMBEDS_PER_MESSAGE,
            batch_char_budget: DEFAULT_BATCH_CHAR_BUDGET,
            pacing: Duration::from_secs(DEFAULT_BATCH_PACING_SECS),
            embed_color: DEFAULT_EMBED_COLOR,
        }
    }
}

pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    cfg: DispatchConfig,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, cfg: DispatchConfig) -> Self {
        Self { sink, cfg }
    }

    /// Deliver everything, batch by batch. Returns the subset of original
    /// items whose batch was confirmed sent, in original order. Empty input
    /// returns immediately without touching the sink.
    pub async fn deliver(&self, items: Vec<EnrichedItem>) -> Vec<NewsItem> {
        if items.is_empty() {
            info!("nothing to deliver");
            return Vec::new();
        }

        let entries: Vec<(NewsItem, Embed)> = items
            .into_iter()
            .map(|e| {
                let embed = self.build_embed(&e);
                (e.item, embed)
            })
            .collect();

        let batches = pack_batches(
            entries,
            self.cfg.max_embeds_per_message,
            self.cfg.batch_char_budget,
        );
        info!(batches = batches.len(), "sending batches to sink");

        let mut delivered: Vec<NewsItem> = Vec::new();
        let send_all = async {
            for (index, batch) in batches.iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(self.cfg.pacing).await;
                }
                debug!(batch = index + 1, total = batches.len(), size = batch.len(), "sending batch");
                if self.send_batch(batch).await {
                    delivered.extend(batch.iter().map(|(item, _)| item.clone()));
                    counter!("dispatch_batches_sent_total").increment(1);
                } else {
                    counter!("dispatch_batches_failed_total").increment(1);
                }
            }
        };
        if tokio::time::timeout(ALL_BATCHES_TIMEOUT, send_all)
            .await
            .is_err()
        {
            error!(
                secs = ALL_BATCHES_TIMEOUT.as_secs(),
                "batch sending timed out; keeping what was confirmed"
            );
        }

        info!(delivered = delivered.len(), "delivery finished");
        delivered
    }

    /// One batch with its full send envelope: per-send timeout, up to 3
    /// retries with 2s..10s backoff, retrying only server-error and
    /// rate-limit classes. Returns whether the batch was confirmed.
    async fn send_batch(&self, batch: &[(NewsItem, Embed)]) -> bool {
        let payload = WebhookPayload {
            content: None,
            embeds: batch.iter().map(|(_, e)| e.clone()).collect(),
        };
        let policy = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(10));

        let mut attempt: u32 = 0;
        loop {
            let result = tokio::time::timeout(SEND_TIMEOUT, self.sink.send(&payload)).await;
            let err = match result {
                Ok(Ok(())) => {
                    info!(size = payload.embeds.len(), "batch confirmed by sink");
                    return true;
                }
                Ok(Err(e)) => e,
                Err(_) => SinkError::Transport(format!(
                    "send timed out after {}s",
                    SEND_TIMEOUT.as_secs()
                )),
            };
            if !err.is_retryable() {
                error!(error = %err, "non-retryable sink failure; dropping batch");
                return false;
            }
            if attempt >= policy.max_retries {
                error!(error = %err, "sink retries exhausted; dropping batch");
                return false;
            }
            let delay = policy.delay(attempt);
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "batch send failed; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn build_embed(&self, enriched: &EnrichedItem) -> Embed {
        Embed {
            title: truncate_chars(&enriched.title, MAX_TITLE_LENGTH),
            description: truncate_chars(&enriched.description, MAX_DESCRIPTION_LENGTH),
            url: sanitize_url(&enriched.item.url),
            color: self.cfg.embed_color,
            timestamp: enriched.item.published_at.to_rfc3339(),
        }
    }
}

fn sanitize_url(url: &str) -> Option<String> {
    if URL_RE.is_match(url) {
        Some(url.to_string())
    } else {
        None
    }
}

/// Greedy order-preserving packing. A new batch starts when the next entry
/// would exceed either limit. An entry is only measured against a running
/// batch, never dropped: one that fits nowhere still opens a fresh batch of
/// its own, so packing always makes progress.
fn pack_batches(
    entries: Vec<(NewsItem, Embed)>,
    max_entries: usize,
    char_budget: usize,
) -> Vec<Vec<(NewsItem, Embed)>> {
    let max_entries = max_entries.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<(NewsItem, Embed)> = Vec::new();
    let mut current_chars = 0usize;

    for entry in entries {
        let cost = entry.1.char_cost();
        if !current.is_empty()
            && (current.len() >= max_entries || current_chars + cost > char_budget)
        {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current_chars += cost;
        current.push(entry);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
