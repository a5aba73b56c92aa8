// src/ingest/file.rs
//! File-backed provider: a JSON array of raw entries dropped on disk by an
//! external fetcher. Keeps feed wire formats outside the pipeline while
//! still giving the binary a working intake.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::ingest::types::{RawEntry, SourceProvider};

pub const ENV_ENTRIES_PATH: &str = "COURIER_ENTRIES_PATH";
const DEFAULT_ENTRIES_PATH: &str = "config/entries.json";

pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Provider for $COURIER_ENTRIES_PATH, else config/entries.json.
    /// Returns None when neither exists.
    pub fn from_env() -> Option<Self> {
        let path = std::env::var(ENV_ENTRIES_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENTRIES_PATH));
        path.exists().then(|| Self::new(path))
    }

    fn read_entries(path: &Path) -> Result<Vec<RawEntry>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading entries from {}", path.display()))?;
        let entries: Vec<RawEntry> = serde_json::from_str(&content)
            .with_context(|| format!("parsing entries from {}", path.display()))?;
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl SourceProvider for JsonFileProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawEntry>> {
        Self::read_entries(&self.path)
    }

    fn name(&self) -> &'static str {
        "json-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn reads_a_json_entry_file() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("entries.json");
        let entries = vec![RawEntry {
            source: "TechCrunch".into(),
            title: "t".into(),
            description: "d".into(),
            url: "https://news.test/a".into(),
            published_at: Utc::now(),
        }];
        std::fs::write(&p, serde_json::to_string(&entries).unwrap()).unwrap();

        let provider = JsonFileProvider::new(p);
        let got = provider.fetch_latest().await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].source, "TechCrunch");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let provider = JsonFileProvider::new(PathBuf::from("/nonexistent/entries.json"));
        assert!(provider.fetch_latest().await.is_err());
    }
}
