// src/dedup/mod.rs
//! Three-stage duplicate filter: exact URL, content hash, then fuzzy
//! similarity against a trailing window of delivered items. Short-circuits
//! on the first hit. Store failures fail open: a transient storage outage
//! must never cost us a genuinely new item.

pub mod fingerprint;

use chrono::{Duration, Utc};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::NewsItem;
use crate::store::HistoryStore;
use fingerprint::ContentMatcher;

pub const DEFAULT_DEDUP_WINDOW_HOURS: i64 = 24;

/// Terminal outcome for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DuplicateUrl,
    DuplicateHash,
    SimilarContent,
}

pub struct DuplicateFilter {
    store: Arc<dyn HistoryStore>,
    matcher: ContentMatcher,
    window_hours: i64,
}

impl DuplicateFilter {
    pub fn new(store: Arc<dyn HistoryStore>, matcher: ContentMatcher, window_hours: i64) -> Self {
        Self {
            store,
            matcher,
            window_hours,
        }
    }

    /// Run the three checks in order. Any store error accepts the candidate.
    pub async fn check(&self, item: &NewsItem) -> Verdict {
        match self.store.find_by_url(&item.url).await {
            Ok(Some(_)) => {
                debug!(url = %item.url, "candidate discarded: duplicate URL");
                counter!("dedup_rejected_total", "reason" => "url").increment(1);
                return Verdict::Rejected(RejectReason::DuplicateUrl);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "URL lookup failed; accepting candidate (fail open)");
                return Verdict::Accepted;
            }
        }

        match self.store.find_by_fingerprint(&item.content_hash).await {
            Ok(Some(existing)) => {
                debug!(title = %item.title, existing = %existing.title, "candidate discarded: duplicate content hash");
                counter!("dedup_rejected_total", "reason" => "hash").increment(1);
                return Verdict::Rejected(RejectReason::DuplicateHash);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "fingerprint lookup failed; accepting candidate (fail open)");
                return Verdict::Accepted;
            }
        }

        let since = Utc::now() - Duration::hours(self.window_hours);
        let recent = match self.store.delivered_since(since).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "recent-window lookup failed; accepting candidate (fail open)");
                return Verdict::Accepted;
            }
        };

        let candidate_text = item.combined_text();
        for existing in &recent {
            let existing_text = existing.combined_text();
            if self
                .matcher
                .similar(Some(&existing_text), Some(&candidate_text))
            {
                debug!(title = %item.title, existing = %existing.title, "candidate discarded: similar content");
                counter!("dedup_rejected_total", "reason" => "similarity").increment(1);
                return Verdict::Rejected(RejectReason::SimilarContent);
            }
        }

        Verdict::Accepted
    }
}
