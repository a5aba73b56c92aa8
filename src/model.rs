// src/model.rs
//! Core data types flowing through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One candidate unit of content.
///
/// The content hash is derived from the normalized `title + " " + description`
/// at construction time (see `ingest::build_item`) and never recomputed.
/// `delivered` starts false and flips to true exactly once, after the
/// dispatcher confirms a successful send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Assigned by the history store on save; `None` until persisted.
    pub id: Option<i64>,
    pub title: String,
    pub description: String,
    pub url: String,
    pub content_hash: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
}

impl NewsItem {
    /// The text the duplicate filter compares: `title + " " + description`.
    pub fn combined_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// An item paired with its rewritten title/description. Ephemeral; exists
/// only between the rewrite stage and the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedItem {
    pub item: NewsItem,
    pub title: String,
    pub description: String,
}
