// src/lang.rs
//! Language conformance boundary for the rewrite stage. Rewritten text must
//! read as Brazilian Portuguese before it is allowed into a batch; the guard
//! fails open so detector flakiness never starves delivery.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

pub trait LanguageGuard: Send + Sync {
    /// True when `text` plausibly is in the target language. Empty text is
    /// never conformant. Internal failures must return true (fail open).
    fn is_target_language(&self, text: &str) -> bool;
}

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w+\b").expect("word regex"));

const ENGLISH_MARKERS: &[&str] = &[
    "the", "and", "with", "from", "that", "this", "for", "have", "has", "will", "are", "was",
    "been", "its", "their", "about", "new", "after",
];

const PORTUGUESE_MARKERS: &[&str] = &[
    "de", "que", "para", "com", "uma", "não", "nao", "são", "sao", "mais", "como", "por", "dos",
    "das", "foi", "será", "sera", "novo", "nova", "após", "apos", "já", "ja", "até", "ate",
];

/// Stopword-ratio heuristic. Only a confidently-English text is rejected;
/// everything ambiguous passes, matching the fail-open contract.
pub struct StopwordGuard;

impl StopwordGuard {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StopwordGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageGuard for StopwordGuard {
    fn is_target_language(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            debug!("empty text treated as non-conformant");
            return false;
        }

        let mut english = 0usize;
        let mut portuguese = 0usize;
        for m in WORD_RE.find_iter(&text.to_lowercase()) {
            let w = m.as_str();
            if ENGLISH_MARKERS.contains(&w) {
                english += 1;
            }
            if PORTUGUESE_MARKERS.contains(&w) {
                portuguese += 1;
            }
        }

        // Reject only on a strong English signal with no Portuguese signal.
        let confidently_english = english >= 2 && english > portuguese * 2;
        if confidently_english {
            debug!(english, portuguese, "text rejected as English");
            return false;
        }
        true
    }
}
