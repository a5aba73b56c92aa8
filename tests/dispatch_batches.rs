// tests/dispatch_batches.rs
//! Dispatcher behavior against a scripted sink: batch splitting, sequential
//! sends, partial failure tolerance, and the retry filter.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use newswire_courier::dispatch::{
    DispatchConfig, Dispatcher, NotificationSink, SinkError, WebhookPayload,
};
use newswire_courier::model::{EnrichedItem, NewsItem};

fn enriched(n: usize) -> Vec<EnrichedItem> {
    (0..n)
        .map(|i| {
            let now = Utc::now();
            let item = NewsItem {
                id: Some(i as i64 + 1),
                title: format!("story-{}", i + 1),
                description: "d".to_string(),
                url: format!("https://news.test/{}", i + 1),
                content_hash: String::new(),
                source: "TechCrunch".to_string(),
                published_at: now,
                created_at: now,
                delivered: false,
            };
            EnrichedItem {
                title: item.title.clone(),
                description: "resumo".to_string(),
                item,
            }
        })
        .collect()
}

/// Sink that records every payload and fails according to a script keyed by
/// send order (1-based), with an error per scripted call.
struct ScriptedSink {
    payloads: Mutex<Vec<WebhookPayload>>,
    script: Mutex<Vec<(u32, SinkError)>>,
    calls: AtomicU32,
}

impl ScriptedSink {
    fn ok() -> Arc<Self> {
        Self::failing(Vec::new())
    }

    fn failing(script: Vec<(u32, SinkError)>) -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(Vec::new()),
            script: Mutex::new(script),
            calls: AtomicU32::new(0),
        })
    }

    fn sizes(&self) -> Vec<usize> {
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.embeds.len())
            .collect()
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for ScriptedSink {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), SinkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fail = {
            let script = self.script.lock().unwrap();
            script.iter().find(|(n, _)| *n == call).map(|(_, e)| e.clone())
        };
        if let Some(err) = fail {
            return Err(err);
        }
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

fn dispatcher(sink: Arc<ScriptedSink>) -> Dispatcher {
    Dispatcher::new(sink, DispatchConfig::default())
}

#[tokio::test(start_paused = true)]
async fn splits_into_ten_entry_batches() {
    let sink = ScriptedSink::ok();
    let d = dispatcher(sink.clone());

    let delivered = d.deliver(enriched(25)).await;
    assert_eq!(delivered.len(), 25);
    assert_eq!(sink.sizes(), vec![10, 10, 5]);
    // Original order survives batching.
    assert_eq!(delivered[0].title, "story-1");
    assert_eq!(delivered[24].title, "story-25");
}

#[tokio::test(start_paused = true)]
async fn failed_batch_does_not_block_later_batches() {
    // Batch 2 fails on its first attempt and all 3 retries (calls 2..=5).
    let script = (2..=5).map(|n| (n, SinkError::Server(502))).collect();
    let sink = ScriptedSink::failing(script);
    let d = dispatcher(sink.clone());

    let delivered = d.deliver(enriched(25)).await;
    // Batches 1 and 3 land; the 10 items of batch 2 are dropped.
    assert_eq!(delivered.len(), 15);
    assert_eq!(sink.sizes(), vec![10, 5]);
    let titles: Vec<&str> = delivered.iter().map(|i| i.title.as_str()).collect();
    assert!(titles.contains(&"story-1"));
    assert!(!titles.contains(&"story-11"));
    assert!(titles.contains(&"story-21"));
}

#[tokio::test(start_paused = true)]
async fn server_errors_are_retried() {
    let script = vec![(1, SinkError::Server(500)), (2, SinkError::RateLimited)];
    let sink = ScriptedSink::failing(script);
    let d = dispatcher(sink.clone());

    let delivered = d.deliver(enriched(3)).await;
    assert_eq!(delivered.len(), 3);
    assert_eq!(sink.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_never_retried() {
    let script = vec![(1, SinkError::Client(400))];
    let sink = ScriptedSink::failing(script);
    let d = dispatcher(sink.clone());

    let delivered = d.deliver(enriched(3)).await;
    assert!(delivered.is_empty());
    assert_eq!(sink.calls(), 1);
}

#[tokio::test]
async fn empty_input_never_touches_the_sink() {
    let sink = ScriptedSink::ok();
    let d = dispatcher(sink.clone());

    assert!(d.deliver(Vec::new()).await.is_empty());
    assert_eq!(sink.calls(), 0);
}
