// src/dedup/fingerprint.rs
//! Pure text primitives for duplicate detection: normalization, content
//! hashing, and fuzzy similarity. No I/O, no state beyond the configured
//! threshold.

use sha2::{Digest, Sha256};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Lowercase, strip everything that is not a letter/digit/whitespace
/// (Unicode-aware), collapse whitespace runs, trim.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else if ch.is_whitespace() {
            pending_space = true;
        }
        // anything else is stripped
    }
    out
}

/// SHA-256 of the normalized text, lowercase hex. Deterministic, unsalted,
/// always 64 characters.
pub fn fingerprint(text: &str) -> String {
    let normalized = normalize(text);
    let digest = Sha256::digest(normalized.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Fuzzy comparator with a fixed threshold. Mirrors the filter's notion of
/// "close enough to be the same story".
#[derive(Debug, Clone, Copy)]
pub struct ContentMatcher {
    threshold: f64,
}

impl ContentMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Jaro-Winkler similarity over the normalized forms. A missing side
    /// never matches and never panics.
    pub fn similar(&self, a: Option<&str>, b: Option<&str>) -> bool {
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };
        let na = normalize(a);
        let nb = normalize(b);
        let score = strsim::jaro_winkler(&na, &nb);
        tracing::trace!(score, "content similarity");
        score >= self.threshold
    }
}

impl Default for ContentMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Hello, World!"), "hello world");
        assert_eq!(normalize("  a -  b  "), "a b");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn normalize_keeps_unicode_letters() {
        assert_eq!(normalize("Versão 2.0 — lançada!"), "versão 20 lançada");
    }

    #[test]
    fn fingerprint_is_deterministic_and_normalization_insensitive() {
        let a = fingerprint("Hello, World!");
        let b = fingerprint("hello world");
        assert_eq!(a, b);
        assert_eq!(a, fingerprint("Hello, World!"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn similar_is_symmetric() {
        let m = ContentMatcher::default();
        let a = Some("Sony announces the PlayStation 6 release date");
        let b = Some("Sony announces PlayStation 6 release date!");
        assert_eq!(m.similar(a, b), m.similar(b, a));
        assert!(m.similar(a, b));
    }

    #[test]
    fn similar_rejects_missing_sides() {
        let m = ContentMatcher::default();
        assert!(!m.similar(None, Some("anything")));
        assert!(!m.similar(Some("anything"), None));
        assert!(!m.similar(None, None));
    }

    #[test]
    fn similar_rejects_unrelated_texts() {
        let m = ContentMatcher::default();
        assert!(!m.similar(
            Some("Apple ships a new laptop line"),
            Some("Local council debates parking rules")
        ));
    }
}
