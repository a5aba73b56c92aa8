// src/ingest/mod.rs
//! Candidate intake. Providers hand over raw entries; this module cleans
//! the text, stamps a content fingerprint, and produces `NewsItem` values
//! ready for the duplicate filter. A failing provider is logged and
//! skipped, never fatal for the run.

pub mod file;
pub mod types;

use crate::dedup::fingerprint::fingerprint;
use crate::ingest::types::{RawEntry, SourceProvider};
use crate::model::NewsItem;
use chrono::Utc;
use metrics::counter;
use tracing::{info, warn};

/// Strip HTML, decode entities, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Build a pipeline item from a raw entry. The fingerprint is computed here,
/// once, over the cleaned title and description together.
pub fn build_item(entry: RawEntry) -> NewsItem {
    let title = clean_text(&entry.title);
    let description = clean_text(&entry.description);
    let content_hash = fingerprint(&format!("{title} {description}"));
    NewsItem {
        id: None,
        title,
        description,
        url: entry.url.trim().to_string(),
        content_hash,
        source: entry.source,
        published_at: entry.published_at,
        created_at: Utc::now(),
        delivered: false,
    }
}

/// Fetch from every provider and return the combined candidate list.
/// Entries with an empty title after cleanup are dropped.
pub async fn collect(providers: &[Box<dyn SourceProvider>]) -> Vec<NewsItem> {
    let mut items = Vec::new();
    for p in providers {
        match p.fetch_latest().await {
            Ok(entries) => {
                counter!("ingest_entries_total", "provider" => p.name())
                    .increment(entries.len() as u64);
                for entry in entries {
                    let item = build_item(entry);
                    if item.title.is_empty() {
                        counter!("ingest_discarded_total").increment(1);
                        continue;
                    }
                    items.push(item);
                }
            }
            Err(e) => {
                warn!(error = ?e, provider = p.name(), "provider error");
                counter!("ingest_provider_errors_total").increment(1);
            }
        }
    }
    info!(candidates = items.len(), "ingest collected candidates");
    items
}
