use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::catalog::{CatalogSearch, GiftCandidate};
use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::Error;
use crate::fanout;

/// Multi-stage product retrieval over an embedding provider and the catalog.
pub struct RetrievalPipeline {
    embeddings: Arc<dyn EmbeddingProvider>,
    catalog: Arc<dyn CatalogSearch>,
    config: RetrievalConfig,
}

impl RetrievalPipeline {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        catalog: Arc<dyn CatalogSearch>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embeddings,
            catalog,
            config,
        }
    }

    /// Relax the stated budget upward by the configured margin. Slightly
    /// over budget beats returning nothing.
    fn effective_max_price(&self, max_price: Option<Decimal>) -> Option<Decimal> {
        max_price.map(|price| price * (Decimal::ONE + self.config.budget_margin))
    }

    /// Embed one query and fetch its nearest-neighbor candidates.
    async fn search_query(
        &self,
        query: &str,
        limit: usize,
        max_price: Option<Decimal>,
    ) -> Result<Vec<GiftCandidate>, Error> {
        let vectors = self.embeddings.embed(&[query.to_string()]).await?;
        let embedding = vectors
            .into_iter()
            .next()
            .unwrap_or_default();
        let candidates = self
            .catalog
            .search_similar(&embedding, limit, true, max_price)
            .await?;
        Ok(candidates)
    }

    /// Fan out over queries; failing queries are logged and excluded.
    /// Returns `(query_index, candidates)` for the survivors.
    async fn search_queries(
        &self,
        queries: &[String],
        max_queries: usize,
        limit: usize,
        max_price: Option<Decimal>,
    ) -> Vec<(usize, Vec<GiftCandidate>)> {
        let bounded: Vec<&String> = queries.iter().take(max_queries).collect();
        let futures: Vec<_> = bounded
            .iter()
            .map(|query| self.search_query(query, limit, max_price))
            .collect();
        let settled = fanout::join_settled(futures).await;
        fanout::keep_successes("candidate_search", settled)
    }

    /// Score the pool against `context`, falling back to a synthetic
    /// descending score from original retrieval rank when the reranker is
    /// unavailable. Degraded ordering still beats an empty preview.
    async fn rerank_pool(&self, context: &str, pool: &[GiftCandidate]) -> HashMap<String, f32> {
        let documents: Vec<String> = pool.iter().map(|c| c.title.clone()).collect();
        let scores = match self.embeddings.rerank(context, &documents).await {
            Ok(scores) if scores.len() == documents.len() => scores,
            Ok(scores) => {
                warn!(
                    expected = documents.len(),
                    got = scores.len(),
                    "Rerank returned wrong score count, falling back to retrieval order"
                );
                synthetic_scores(pool.len())
            }
            Err(e) => {
                warn!(error = %e, "Rerank unavailable, falling back to retrieval order");
                synthetic_scores(pool.len())
            }
        };

        pool.iter()
            .zip(scores)
            .map(|(candidate, score)| (candidate.id.clone(), score))
            .collect()
    }

    /// Preview search: multi-query, budget-flexed, reranked, interleaved.
    pub async fn find_preview_products(
        &self,
        queries: &[String],
        title: Option<&str>,
        max_price: Option<Decimal>,
    ) -> Vec<GiftCandidate> {
        if queries.is_empty() {
            return Vec::new();
        }
        let ceiling = self.effective_max_price(max_price);

        let per_query = self
            .search_queries(
                queries,
                self.config.max_preview_queries,
                self.config.preview_candidates_per_query,
                ceiling,
            )
            .await;

        // Union into one pool, deduplicated by product id. Pool order is the
        // original retrieval rank (query-major), which the degraded rerank
        // fallback relies on.
        let mut pool: Vec<GiftCandidate> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (_, candidates) in &per_query {
            for candidate in candidates {
                if seen.insert(candidate.id.clone()) {
                    pool.push(candidate.clone());
                }
            }
        }
        if pool.is_empty() {
            debug!("Preview search found no candidates");
            return Vec::new();
        }

        let context = match title {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => queries
                .iter()
                .take(2)
                .cloned()
                .collect::<Vec<_>>()
                .join(" "),
        };
        let score_by_id = self.rerank_pool(&context, &pool).await;

        // Each query's own candidates, ordered by the shared rerank score,
        // trimmed to top-K.
        let top_k_lists: Vec<Vec<GiftCandidate>> = per_query
            .iter()
            .map(|(_, candidates)| {
                let mut ranked = candidates.clone();
                ranked.sort_by(|a, b| {
                    let sa = score_by_id.get(&a.id).copied().unwrap_or(0.0);
                    let sb = score_by_id.get(&b.id).copied().unwrap_or(0.0);
                    sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
                });
                ranked.truncate(self.config.items_per_query);
                ranked
            })
            .collect();

        interleave(&top_k_lists, self.config.max_preview_items)
    }

    /// Deep-dive search: fewer queries, bigger candidate sets, globally
    /// ranked result. Run when a hypothesis is liked.
    pub async fn find_deep_products(
        &self,
        queries: &[String],
        title: &str,
        description: &str,
        max_price: Option<Decimal>,
    ) -> Vec<GiftCandidate> {
        if queries.is_empty() {
            return Vec::new();
        }
        let ceiling = self.effective_max_price(max_price);

        let per_query = self
            .search_queries(
                queries,
                self.config.max_deep_queries,
                self.config.deep_candidates_per_query,
                ceiling,
            )
            .await;

        let mut pool: Vec<GiftCandidate> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (_, candidates) in &per_query {
            for candidate in candidates {
                if seen.insert(candidate.id.clone()) {
                    pool.push(candidate.clone());
                }
            }
        }
        if pool.is_empty() {
            return Vec::new();
        }

        let context = if description.is_empty() {
            title.to_string()
        } else {
            format!("{title}. {description}")
        };
        let score_by_id = self.rerank_pool(&context, &pool).await;

        pool.sort_by(|a, b| {
            let sa = score_by_id.get(&a.id).copied().unwrap_or(0.0);
            let sb = score_by_id.get(&b.id).copied().unwrap_or(0.0);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });
        pool.truncate(self.config.deep_result_size);
        pool
    }
}

/// Descending scores from original retrieval rank: earlier in the pool,
/// higher the score.
fn synthetic_scores(len: usize) -> Vec<f32> {
    (0..len).map(|rank| (len - rank) as f32).collect()
}

/// Round-robin interleave across per-query lists: index 0 of every list,
/// then index 1, and so on — skipping ids already emitted — until all lists
/// are exhausted or `cap` items have been taken. Keeps the preview topically
/// diverse instead of letting one query dominate.
fn interleave(lists: &[Vec<GiftCandidate>], cap: usize) -> Vec<GiftCandidate> {
    let mut out: Vec<GiftCandidate> = Vec::new();
    let mut emitted: HashSet<String> = HashSet::new();
    let longest = lists.iter().map(Vec::len).max().unwrap_or(0);

    for round in 0..longest {
        for list in lists {
            if out.len() >= cap {
                return out;
            }
            if let Some(candidate) = list.get(round) {
                if emitted.insert(candidate.id.clone()) {
                    out.push(candidate.clone());
                }
            }
        }
    }
    out
}
