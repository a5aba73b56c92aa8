// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// One candidate item as a provider hands it over, before any cleanup.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawEntry {
    pub source: String, // e.g., "TechCrunch", "The Verge"
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawEntry>>;
    fn name(&self) -> &'static str;
}
