// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod editor;
pub mod ingest;
pub mod job;
pub mod lang;
pub mod metrics;
pub mod model;
pub mod oracle;
pub mod rewriter;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::PipelineConfig;
pub use crate::job::{DailyNewsJob, RunOutcome};
pub use crate::model::{EnrichedItem, NewsItem};
