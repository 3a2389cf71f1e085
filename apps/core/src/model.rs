use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Spacing applied between records persisted together so their recency order
/// follows the order they were supplied in.
const BATCH_STAGGER_MILLIS: i64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchRecord {
    pub term: String,
    pub timestamp: i64,
}

impl SearchRecord {
    pub fn new(term: &str, timestamp: i64) -> Self {
        Self {
            term: term.to_string(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Recent,
    Prefix,
}

pub fn normalize_term(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Lowercases a typed prefix. Trailing whitespace is kept since it narrows
/// the match ("new " should not match "newton").
pub fn fold_for_prefix(input: &str) -> String {
    input.trim_start().to_lowercase()
}

/// Stamps `terms` newest-first: the first term gets `now`, each following one
/// a second earlier. Blank terms are skipped.
pub fn stamp_batch<S: AsRef<str>>(terms: &[S], now: i64) -> Vec<SearchRecord> {
    terms
        .iter()
        .filter_map(|term| normalize_term(term.as_ref()))
        .enumerate()
        .map(|(index, term)| SearchRecord {
            term,
            timestamp: now.saturating_sub(BATCH_STAGGER_MILLIS * index as i64),
        })
        .collect()
}

pub fn now_epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
