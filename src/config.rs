//! Configuration types.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum number of topics normalized out of a quiz.
    pub max_topics: usize,
    /// Most recent interactions kept on the in-session profile.
    /// Full history is persisted separately, uncapped.
    pub history_cap: usize,
    /// Session time-to-live, re-applied on every save.
    pub session_ttl: Duration,
    /// Temperature for hypothesis generation calls.
    pub generation_temperature: f32,
    /// Max output tokens for the bulk generation call.
    pub bulk_max_tokens: u32,
    /// Max output tokens for per-topic calls (classify, hypotheses, probes).
    pub topic_max_tokens: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_topics: 6,
            history_cap: 30,
            session_ttl: Duration::from_secs(24 * 3600),
            generation_temperature: 0.7,
            bulk_max_tokens: 4096,
            topic_max_tokens: 1024,
        }
    }
}

/// Retrieval pipeline configuration.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Upper bound on search queries per preview call.
    pub max_preview_queries: usize,
    /// Nearest-neighbor candidates fetched per preview query.
    pub preview_candidates_per_query: usize,
    /// Top-K kept per query after reranking.
    pub items_per_query: usize,
    /// Total items emitted by the preview interleave.
    pub max_preview_items: usize,
    /// Fractional upward flex applied to the stated budget. Slightly over
    /// budget beats returning nothing.
    pub budget_margin: Decimal,
    /// Upper bound on search queries per deep-dive call.
    pub max_deep_queries: usize,
    /// Nearest-neighbor candidates fetched per deep-dive query.
    pub deep_candidates_per_query: usize,
    /// Final size of a deep-dive result.
    pub deep_result_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_preview_queries: 4,
            preview_candidates_per_query: 20,
            items_per_query: 3,
            max_preview_items: 12,
            budget_margin: dec!(0.15),
            max_deep_queries: 3,
            deep_candidates_per_query: 40,
            deep_result_size: 12,
        }
    }
}
