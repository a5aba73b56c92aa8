// src/store.rs
//! History store boundary: the pipeline's only view of persistence.
//!
//! Lookups are scoped to *delivered* items on purpose: a candidate is only a
//! duplicate of something readers have already seen. Persistence engines are
//! out of scope; `MemoryStore` is the runtime implementation and the one the
//! integration tests use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use thiserror::Error;

use crate::model::NewsItem;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Delivered item with this exact URL, if any.
    async fn find_by_url(&self, url: &str) -> Result<Option<NewsItem>, StoreError>;

    /// Delivered item with this content hash, if any.
    async fn find_by_fingerprint(&self, hash: &str) -> Result<Option<NewsItem>, StoreError>;

    /// Delivered items created at or after `since`, newest first.
    async fn delivered_since(&self, since: DateTime<Utc>) -> Result<Vec<NewsItem>, StoreError>;

    /// Persist a new item, assigning an id. Returns the stored copy.
    async fn save(&self, item: NewsItem) -> Result<NewsItem, StoreError>;

    /// Flip the delivered flag for the given items. Idempotent.
    async fn mark_delivered(&self, items: &[NewsItem]) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    rows: Vec<NewsItem>,
    next_id: i64,
}

/// In-memory store guarded by a mutex. Lock scope is a single call; the
/// pipeline never holds it across an await point.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/debug helper: snapshot of everything stored.
    pub fn snapshot(&self) -> Vec<NewsItem> {
        self.inner.lock().expect("store mutex poisoned").rows.clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn find_by_url(&self, url: &str) -> Result<Option<NewsItem>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .rows
            .iter()
            .find(|r| r.delivered && r.url == url)
            .cloned())
    }

    async fn find_by_fingerprint(&self, hash: &str) -> Result<Option<NewsItem>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .rows
            .iter()
            .find(|r| r.delivered && r.content_hash == hash)
            .cloned())
    }

    async fn delivered_since(&self, since: DateTime<Utc>) -> Result<Vec<NewsItem>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut out: Vec<NewsItem> = inner
            .rows
            .iter()
            .filter(|r| r.delivered && r.created_at >= since)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn save(&self, mut item: NewsItem) -> Result<NewsItem, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.next_id += 1;
        item.id = Some(inner.next_id);
        inner.rows.push(item.clone());
        Ok(item)
    }

    async fn mark_delivered(&self, items: &[NewsItem]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for item in items {
            for row in inner.rows.iter_mut() {
                let matched = match (item.id, row.id) {
                    (Some(a), Some(b)) => a == b,
                    _ => row.url == item.url,
                };
                if matched {
                    row.delivered = true;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::fingerprint::fingerprint;

    fn item(title: &str, url: &str) -> NewsItem {
        let now = Utc::now();
        NewsItem {
            id: None,
            title: title.to_string(),
            description: "desc".to_string(),
            url: url.to_string(),
            content_hash: fingerprint(&format!("{title} desc")),
            source: "Test".to_string(),
            published_at: now,
            created_at: now,
            delivered: false,
        }
    }

    #[tokio::test]
    async fn lookups_only_see_delivered_rows() {
        let store = MemoryStore::new();
        let saved = store.save(item("a", "https://x.test/a")).await.unwrap();

        // Not delivered yet: invisible to dedup lookups.
        assert!(store.find_by_url("https://x.test/a").await.unwrap().is_none());
        assert!(store
            .find_by_fingerprint(&saved.content_hash)
            .await
            .unwrap()
            .is_none());

        store.mark_delivered(&[saved.clone()]).await.unwrap();
        assert!(store.find_by_url("https://x.test/a").await.unwrap().is_some());
        assert!(store
            .find_by_fingerprint(&saved.content_hash)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn delivered_since_filters_by_window() {
        let store = MemoryStore::new();
        let mut old = item("old", "https://x.test/old");
        old.created_at = Utc::now() - chrono::Duration::days(3);
        let old = store.save(old).await.unwrap();
        let fresh = store.save(item("fresh", "https://x.test/fresh")).await.unwrap();
        store.mark_delivered(&[old, fresh]).await.unwrap();

        let since = Utc::now() - chrono::Duration::days(1);
        let recent = store.delivered_since(since).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "fresh");
    }

    #[tokio::test]
    async fn save_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let a = store.save(item("a", "https://x.test/a")).await.unwrap();
        let b = store.save(item("b", "https://x.test/b")).await.unwrap();
        assert_eq!(a.id, Some(1));
        assert_eq!(b.id, Some(2));
    }
}
