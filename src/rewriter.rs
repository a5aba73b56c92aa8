// src/rewriter.rs
//! Per-item rewrite/summarization under bounded concurrency. Each selected
//! item gets one oracle call that must come back as `TÍTULO:` / `RESUMO:`
//! sections in Brazilian Portuguese; items whose rewrite fails, or fails
//! the language guard, are dropped individually. One bad item never takes
//! the batch down with it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::lang::LanguageGuard;
use crate::model::{EnrichedItem, NewsItem};
use crate::oracle::{call_with_retry, Oracle, RetryPolicy};

pub const DEFAULT_REWRITE_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_TITLE_LEN: usize = 200;
pub const DEFAULT_MAX_DESCRIPTION_LEN: usize = 400;

const ITEM_TIMEOUT: Duration = Duration::from_secs(90);
const FANOUT_TIMEOUT: Duration = Duration::from_secs(300);

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^T[ÍI]TULO\s*:\s*(.+)$").expect("title regex"));
static SUMMARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)RESUMO\s*[:：]\s*(.*)").expect("summary regex"));

#[derive(Clone)]
pub struct Rewriter {
    oracle: Arc<dyn Oracle>,
    guard: Arc<dyn LanguageGuard>,
    concurrency: usize,
    max_title_len: usize,
    max_description_len: usize,
}

impl Rewriter {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        guard: Arc<dyn LanguageGuard>,
        concurrency: usize,
        max_title_len: usize,
        max_description_len: usize,
    ) -> Self {
        Self {
            oracle,
            guard,
            concurrency: concurrency.max(1),
            max_title_len,
            max_description_len,
        }
    }

    /// Rewrite all items with at most `concurrency` oracle calls in flight.
    /// Results keep the input order via explicit index pairing. The whole
    /// fan-out is bounded; on a global timeout whatever finished is kept.
    pub async fn rewrite_all(&self, items: Vec<NewsItem>) -> Vec<EnrichedItem> {
        if items.is_empty() {
            return Vec::new();
        }

        info!(count = items.len(), "rewriting selected items");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let done: Arc<Mutex<Vec<(usize, EnrichedItem)>>> = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let rewriter = self.clone();
            let semaphore = semaphore.clone();
            let done = done.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if let Some(enriched) = rewriter.rewrite_one(&item).await {
                    done.lock().await.push((index, enriched));
                }
            });
        }

        let timed_out = tokio::time::timeout(FANOUT_TIMEOUT, async {
            while tasks.join_next().await.is_some() {}
        })
        .await
        .is_err();
        if timed_out {
            warn!(
                secs = FANOUT_TIMEOUT.as_secs(),
                "rewrite fan-out timed out; keeping completed items"
            );
            tasks.abort_all();
        }

        let mut completed = std::mem::take(&mut *done.lock().await);
        completed.sort_by_key(|(index, _)| *index);
        let out: Vec<EnrichedItem> = completed.into_iter().map(|(_, e)| e).collect();
        info!(rewritten = out.len(), "rewrite stage finished");
        out
    }

    /// One item end to end: oracle call with per-item timeout/retry, section
    /// parsing with original-text fallback, then the language guard on both
    /// sections. Any failure drops this item only.
    async fn rewrite_one(&self, item: &NewsItem) -> Option<EnrichedItem> {
        let prompt = self.build_rewrite_prompt(&item.title, &item.description);
        let policy = RetryPolicy::new(2, Duration::from_secs(3), Duration::from_secs(8));

        let response =
            match call_with_retry(self.oracle.as_ref(), None, &prompt, ITEM_TIMEOUT, policy).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(title = %item.title, error = %e, "rewrite failed; dropping item");
                    return None;
                }
            };

        let (title, description) = self.parse_rewrite(&response, &item.title, &item.description);

        if !self.guard.is_target_language(&title) || !self.guard.is_target_language(&description) {
            warn!(title = %title, "rewrite not in target language; dropping item");
            return None;
        }

        info!(title = %title, "rewrite finished");
        Some(EnrichedItem {
            item: item.clone(),
            title,
            description,
        })
    }

    fn build_rewrite_prompt(&self, title: &str, description: &str) -> String {
        let description = if description.trim().is_empty() {
            title
        } else {
            description
        };
        format!(
            "Você é um tradutor profissional especializado em notícias de tecnologia e jogos.\n\
             Traduza o conteúdo abaixo para PORTUGUÊS BRASILEIRO, mantendo clareza e substantivos próprios.\n\n\
             Regras:\n\
             - Sempre responda 100% em português brasileiro\n\
             - Não traduza substantivos próprios (empresas, produtos)\n\
             - Resuma de maneira fluida e técnica\n\
             - Título máximo de {} caracteres, Resumo máximo de {} caracteres\n\
             - Se já estiver em português, apenas melhore a escrita\n\n\
             TÍTULO ORIGINAL: {}\n\
             DESCRIÇÃO ORIGINAL: {}\n\n\
             Responda exatamente neste formato:\n\
             TÍTULO: [tradução]\n\
             RESUMO: [resumo em português]",
            self.max_title_len, self.max_description_len, title, description
        )
    }

    /// Pull the two sections out of the response; a missing section falls
    /// back to the original text. Both are length-capped.
    fn parse_rewrite(
        &self,
        response: &str,
        original_title: &str,
        original_description: &str,
    ) -> (String, String) {
        let title =
            extract_section(response, &TITLE_RE).unwrap_or_else(|| original_title.to_string());
        let description =
            extract_section(response, &SUMMARY_RE).unwrap_or_else(|| original_description.to_string());
        (
            truncate_chars(&title, self.max_title_len),
            truncate_chars(&description, self.max_description_len),
        )
    }
}

fn extract_section(text: &str, pattern: &Regex) -> Option<String> {
    let m = pattern.captures(text)?;
    let raw = m.get(1)?.as_str().trim();
    let stripped = raw
        .trim_start_matches(['"', '\''])
        .trim_end_matches(['"', '\''])
        .trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Char-count truncation with a `...` marker. Works on chars, not bytes, so
/// multi-byte text never splits mid-character.
pub(crate) fn truncate_chars(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
