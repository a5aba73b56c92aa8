//! Newswire Courier — Binary Entrypoint
//! Boots the Axum HTTP server, wires the pipeline collaborators, and
//! starts the periodic scheduler.

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newswire_courier::api::{create_router, AppState};
use newswire_courier::config::PipelineConfig;
use newswire_courier::dedup::fingerprint::ContentMatcher;
use newswire_courier::dedup::DuplicateFilter;
use newswire_courier::dispatch::{Dispatcher, WebhookSink};
use newswire_courier::editor::Editor;
use newswire_courier::ingest::file::JsonFileProvider;
use newswire_courier::ingest::types::SourceProvider;
use newswire_courier::job::{spawn_scheduler, DailyNewsJob};
use newswire_courier::lang::StopwordGuard;
use newswire_courier::metrics::Metrics;
use newswire_courier::oracle::ChatOracle;
use newswire_courier::rewriter::Rewriter;
use newswire_courier::store::{HistoryStore, MemoryStore};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("newswire_courier=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load();
    let metrics = Metrics::init();

    let store: Arc<dyn HistoryStore> = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ChatOracle::from_env());

    let filter = DuplicateFilter::new(
        store.clone(),
        ContentMatcher::new(cfg.similarity_threshold),
        cfg.dedup_window_hours,
    );
    let editor = Editor::new(oracle.clone(), cfg.top_count);
    let rewriter = Rewriter::new(
        oracle,
        Arc::new(StopwordGuard::new()),
        cfg.rewrite_concurrency,
        cfg.max_title_len,
        cfg.max_description_len,
    );

    let dispatcher = if cfg.webhook_url.is_empty() {
        tracing::warn!("WEBHOOK_URL not set; items will be selected but not delivered");
        None
    } else {
        Some(Dispatcher::new(
            Arc::new(WebhookSink::new(cfg.webhook_url.clone())),
            cfg.dispatch(),
        ))
    };

    let mut providers: Vec<Box<dyn SourceProvider>> = Vec::new();
    if let Some(file_provider) = JsonFileProvider::from_env() {
        providers.push(Box::new(file_provider));
    }
    if providers.is_empty() {
        tracing::warn!("no source providers registered; runs will start from zero candidates");
    }

    let job = Arc::new(DailyNewsJob::new(
        providers, filter, store, editor, rewriter, dispatcher,
    ));
    spawn_scheduler(job.clone(), cfg.run_interval());

    let router = create_router(AppState { job }).merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
