// src/metrics.rs
use axum::{routing::get, Router};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder and register series descriptions
    /// so they show up on /metrics even before the first increment.
    pub fn init() -> Self {
        // Use default buckets to avoid API differences across crate versions.
        let builder = PrometheusBuilder::new();

        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_counter!(
            "ingest_entries_total",
            "Raw entries fetched per provider."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_counter!(
            "dedup_rejected_total",
            "Candidates rejected by the duplicate filter, by reason."
        );
        describe_counter!("pipeline_accepted_total", "Candidates past the filter.");
        describe_counter!("pipeline_selected_total", "Items kept by selection.");
        describe_counter!("pipeline_delivered_total", "Items confirmed delivered.");
        describe_counter!("dispatch_batches_sent_total", "Batches confirmed by the sink.");
        describe_counter!(
            "dispatch_batches_failed_total",
            "Batches dropped after exhausting retries."
        );

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
