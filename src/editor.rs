// src/editor.rs
//! Oracle-backed ranking and selection. One prompt scores the whole
//! candidate set; the response is scanned for `NOTA<n>: <score>` marks.
//! Every failure mode degrades: unparsed items get a heuristic score, an
//! unusable response scores the whole batch heuristically, and a blown
//! outer timeout falls back to recency ordering. Selection never errors.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::model::NewsItem;
use crate::oracle::{Oracle, OracleError, RetryPolicy};

pub const DEFAULT_TOP_COUNT: usize = 20;

const CALL_TIMEOUT: Duration = Duration::from_secs(45);
const BATCH_TIMEOUT: Duration = Duration::from_secs(50);
const RETRIED_CALL_TIMEOUT: Duration = Duration::from_secs(60);
const EVALUATION_TIMEOUT: Duration = Duration::from_secs(180);
const SELECTION_TIMEOUT: Duration = Duration::from_secs(600);

/// Sources whose stories get a heuristic boost when the oracle is out.
const PRIMARY_SOURCES: &[&str] = &["techcrunch", "verge", "ars technica"];
const SECONDARY_SOURCES: &[&str] = &["polygon", "pc gamer"];

const EDITOR_SYSTEM_PROMPT: &str = "\
Você é um editor-chefe experiente de um portal brasileiro de tecnologia e jogos.
Avalie APENAS com base no título da notícia e dê uma pontuação de 1 a 10.

Critérios:
10 - Lançamentos revolucionários, grandes aquisições
8-9 - Atualizações importantes, jogos AAA muito aguardados
6-7 - Notícias interessantes de empresas conhecidas
4-5 - Conteúdo de nicho ou atualizações menores
1-3 - Baixa relevância ou muito específico

SEMPRE RESPONDA no formato: NOTA1: X, NOTA2: Y, NOTA3: Z";

static SCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)NOTA(\d+)\s*:?\s*(\d+)").expect("score regex"));

/// An item paired with its 1..=10 score. Ephemeral; lives inside one
/// selection call.
#[derive(Debug, Clone)]
pub struct ScoredItem {
    pub item: NewsItem,
    pub score: i32,
}

pub struct Editor {
    oracle: Arc<dyn Oracle>,
    top_count: usize,
}

impl Editor {
    pub fn new(oracle: Arc<dyn Oracle>, top_count: usize) -> Self {
        Self { oracle, top_count }
    }

    /// Pick the top `top_count` items. Small inputs pass through untouched
    /// with zero oracle calls.
    pub async fn select_top(&self, items: Vec<NewsItem>) -> Vec<NewsItem> {
        if items.len() <= self.top_count {
            info!(
                count = items.len(),
                "candidate set within target; skipping evaluation"
            );
            return items;
        }

        info!(
            candidates = items.len(),
            target = self.top_count,
            "evaluating candidates for selection"
        );

        match tokio::time::timeout(SELECTION_TIMEOUT, self.rank(&items)).await {
            Ok(selected) => {
                info!(selected = selected.len(), "selection finished");
                selected
            }
            Err(_) => {
                warn!(
                    secs = SELECTION_TIMEOUT.as_secs(),
                    "selection timed out; falling back to recency order"
                );
                recency_fallback(items, self.top_count)
            }
        }
    }

    async fn rank(&self, items: &[NewsItem]) -> Vec<NewsItem> {
        let evaluations =
            match tokio::time::timeout(EVALUATION_TIMEOUT, self.evaluate_with_retry(items)).await {
                Ok(v) => v,
                Err(_) => {
                    warn!(
                        secs = EVALUATION_TIMEOUT.as_secs(),
                        "evaluation timed out; scoring heuristically"
                    );
                    self.heuristic_scores(items)
                }
            };
        pick_best(evaluations, self.top_count)
    }

    /// Retry envelope around one whole-batch evaluation: up to 2 retries on
    /// transient failures with 3s..10s backoff, the retried call bounded as
    /// a whole. Exhaustion degrades to heuristic scores.
    async fn evaluate_with_retry(&self, items: &[NewsItem]) -> Vec<ScoredItem> {
        let policy = RetryPolicy::new(2, Duration::from_secs(3), Duration::from_secs(10));
        let attempt_loop = async {
            let mut attempt: u32 = 0;
            loop {
                match self.evaluate_once(items).await {
                    Ok(scored) => return scored,
                    Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                        let delay = policy.delay(attempt);
                        warn!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "batch evaluation failed; retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "batch evaluation exhausted; scoring heuristically");
                        return self.heuristic_scores(items);
                    }
                }
            }
        };
        match tokio::time::timeout(RETRIED_CALL_TIMEOUT, attempt_loop).await {
            Ok(scored) => scored,
            Err(_) => {
                warn!(
                    secs = RETRIED_CALL_TIMEOUT.as_secs(),
                    "retried evaluation timed out; scoring heuristically"
                );
                self.heuristic_scores(items)
            }
        }
    }

    /// One evaluation attempt: call the oracle, parse the response. Parse
    /// trouble is handled inside `parse_scores` (heuristic substitution),
    /// so only transport/timeout failures surface as errors here.
    async fn evaluate_once(&self, items: &[NewsItem]) -> Result<Vec<ScoredItem>, OracleError> {
        let prompt = build_scoring_prompt(items);
        let attempt = async {
            let response = tokio::time::timeout(
                CALL_TIMEOUT,
                self.oracle.complete(Some(EDITOR_SYSTEM_PROMPT), &prompt),
            )
            .await
            .map_err(|_| {
                OracleError::transient(format!(
                    "scoring call timed out after {}s",
                    CALL_TIMEOUT.as_secs()
                ))
            })??;
            Ok(self.parse_scores(&response, items))
        };
        tokio::time::timeout(BATCH_TIMEOUT, attempt)
            .await
            .map_err(|_| {
                OracleError::transient(format!(
                    "batch processing timed out after {}s",
                    BATCH_TIMEOUT.as_secs()
                ))
            })?
    }

    /// Scan for `NOTA<index>: <score>` marks. Valid marks map onto items by
    /// index; items the oracle skipped get the positional heuristic. Zero
    /// valid marks means the response is unusable and the whole batch is
    /// scored heuristically.
    fn parse_scores(&self, response: &str, items: &[NewsItem]) -> Vec<ScoredItem> {
        if response.trim().is_empty() {
            warn!("empty oracle response; scoring heuristically");
            return self.heuristic_scores(items);
        }

        let mut by_index: HashMap<usize, i32> = HashMap::new();
        let mut match_count = 0usize;
        for caps in SCORE_RE.captures_iter(response) {
            match_count += 1;
            let index: usize = match caps[1].parse::<usize>() {
                Ok(n) if n >= 1 && n <= items.len() => n - 1,
                _ => {
                    debug!(raw = &caps[0], "score mark out of range");
                    continue;
                }
            };
            match caps[2].parse::<i32>() {
                Ok(score) if (1..=10).contains(&score) => {
                    by_index.entry(index).or_insert(score);
                }
                _ => debug!(raw = &caps[0], "score value out of range"),
            }
        }

        debug!(
            marks = match_count,
            valid = by_index.len(),
            "parsed oracle evaluation"
        );

        if by_index.is_empty() {
            let preview: String = response.chars().take(100).collect();
            warn!(
                preview,
                "no valid score marks in oracle response; scoring heuristically"
            );
            return self.heuristic_scores(items);
        }

        items
            .iter()
            .enumerate()
            .map(|(pos, item)| {
                let score = by_index
                    .get(&pos)
                    .copied()
                    .unwrap_or_else(|| heuristic_score(item, pos));
                ScoredItem {
                    item: item.clone(),
                    score,
                }
            })
            .collect()
    }

    fn heuristic_scores(&self, items: &[NewsItem]) -> Vec<ScoredItem> {
        items
            .iter()
            .enumerate()
            .map(|(pos, item)| ScoredItem {
                item: item.clone(),
                score: heuristic_score(item, pos),
            })
            .collect()
    }
}

fn build_scoring_prompt(items: &[NewsItem]) -> String {
    let mut prompt = String::from("Evaluate these news titles (1-10):\n\n");
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(&mut prompt, "{}. [{}] {}", i + 1, item.source, item.title);
    }
    prompt.push_str("\nRESPONSE (NOTA1: X, NOTA2: Y, ...):");
    prompt
}

/// Deterministic fallback score: base 6, source-authority boost, positional
/// nudge, clamped to [3, 10].
fn heuristic_score(item: &NewsItem, position: usize) -> i32 {
    let mut score = 6;
    let source = item.source.to_lowercase();
    if PRIMARY_SOURCES.iter().any(|s| source.contains(s)) {
        score += 2;
    } else if SECONDARY_SOURCES.iter().any(|s| source.contains(s)) {
        score += 1;
    }
    if position < 3 {
        score += 1;
    } else if position >= 5 {
        score -= 1;
    }
    score.clamp(3, 10)
}

/// Stable sort descending by score (ties keep input order), take the top N.
fn pick_best(mut evaluations: Vec<ScoredItem>, top_count: usize) -> Vec<NewsItem> {
    evaluations.sort_by(|a, b| b.score.cmp(&a.score));
    evaluations
        .into_iter()
        .take(top_count)
        .map(|e| e.item)
        .collect()
}

/// Last-resort ordering when the whole oracle path is unusable.
fn recency_fallback(mut items: Vec<NewsItem>, top_count: usize) -> Vec<NewsItem> {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items.truncate(top_count);
    items
}
