// src/job.rs
//! Full pipeline run: collect candidates, filter duplicates, persist
//! accepted items, select the top slice, rewrite, deliver, and mark the
//! delivered ones. The run never returns an error; every failure class
//! degrades to a smaller (possibly empty) result and a status string.

use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::dedup::{DuplicateFilter, Verdict};
use crate::dispatch::Dispatcher;
use crate::editor::Editor;
use crate::ingest::{self, types::SourceProvider};
use crate::model::NewsItem;
use crate::rewriter::Rewriter;
use crate::store::HistoryStore;

/// Cap on the rewrite-and-deliver tail of a run.
const DELIVERY_PHASE_TIMEOUT: Duration = Duration::from_secs(600);

/// What one run did, as stable numbers plus a human-readable status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunOutcome {
    pub accepted: i64,
    pub selected: i64,
    pub delivered: i64,
    pub status: String,
}

pub struct DailyNewsJob {
    providers: Vec<Box<dyn SourceProvider>>,
    filter: DuplicateFilter,
    store: Arc<dyn HistoryStore>,
    editor: Editor,
    rewriter: Rewriter,
    dispatcher: Option<Dispatcher>,
}

impl DailyNewsJob {
    pub fn new(
        providers: Vec<Box<dyn SourceProvider>>,
        filter: DuplicateFilter,
        store: Arc<dyn HistoryStore>,
        editor: Editor,
        rewriter: Rewriter,
        dispatcher: Option<Dispatcher>,
    ) -> Self {
        Self {
            providers,
            filter,
            store,
            editor,
            rewriter,
            dispatcher,
        }
    }

    pub async fn run(&self) -> RunOutcome {
        info!("pipeline run starting");
        let started = std::time::Instant::now();

        let candidates = ingest::collect(&self.providers).await;
        let accepted = self.filter_and_save(candidates).await;
        counter!("pipeline_accepted_total").increment(accepted.len() as u64);

        let selected = self.editor.select_top(accepted.clone()).await;
        counter!("pipeline_selected_total").increment(selected.len() as u64);

        let delivered = match tokio::time::timeout(
            DELIVERY_PHASE_TIMEOUT,
            self.rewrite_and_deliver(selected.clone()),
        )
        .await
        {
            Ok(n) => n,
            Err(_) => {
                error!(
                    secs = DELIVERY_PHASE_TIMEOUT.as_secs(),
                    "rewrite/delivery phase timed out"
                );
                0
            }
        };
        counter!("pipeline_delivered_total").increment(delivered as u64);
        gauge!("pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        let status = format!(
            "accepted {}, selected {}, delivered {} in {:.1}s",
            accepted.len(),
            selected.len(),
            delivered,
            started.elapsed().as_secs_f64()
        );
        info!(%status, "pipeline run finished");
        RunOutcome {
            accepted: accepted.len() as i64,
            selected: selected.len() as i64,
            delivered: delivered as i64,
            status,
        }
    }

    /// Run each candidate through the duplicate filter; persist the accepted
    /// ones. A save failure keeps the unsaved item in the run (fail open).
    async fn filter_and_save(&self, candidates: Vec<NewsItem>) -> Vec<NewsItem> {
        let mut accepted = Vec::with_capacity(candidates.len());
        for item in candidates {
            match self.filter.check(&item).await {
                Verdict::Rejected(reason) => {
                    info!(title = %item.title, ?reason, "candidate rejected as duplicate");
                }
                Verdict::Accepted => {
                    let stored = match self.store.save(item.clone()).await {
                        Ok(stored) => stored,
                        Err(e) => {
                            warn!(title = %item.title, error = %e, "save failed; continuing unsaved");
                            item
                        }
                    };
                    accepted.push(stored);
                }
            }
        }
        accepted
    }

    /// Rewrite the selected items and push them through the sink. Without a
    /// configured dispatcher the stage is a no-op that delivers nothing.
    async fn rewrite_and_deliver(&self, selected: Vec<NewsItem>) -> usize {
        let Some(dispatcher) = &self.dispatcher else {
            if !selected.is_empty() {
                warn!("no webhook configured; skipping delivery");
            }
            return 0;
        };

        let enriched = self.rewriter.rewrite_all(selected).await;
        let delivered = dispatcher.deliver(enriched).await;
        if delivered.is_empty() {
            return 0;
        }
        if let Err(e) = self.store.mark_delivered(&delivered).await {
            warn!(error = %e, "could not mark items delivered");
        }
        delivered.len()
    }
}

/// Periodic runner. The first tick fires immediately; it is consumed here so
/// startup does not trigger an unscheduled run.
pub fn spawn_scheduler(job: Arc<DailyNewsJob>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let outcome = job.run().await;
            info!(status = %outcome.status, "scheduled run complete");
        }
    })
}
