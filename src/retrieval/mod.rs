//! Product retrieval pipeline.
//!
//! Two entry points share one shape (embed each query, fetch neighbors,
//! union, rerank):
//!
//! - [`RetrievalPipeline::find_preview_products`] — the cheap multi-query
//!   search behind every freshly generated hypothesis. Per-query top-K with
//!   round-robin interleaving so no single query dominates the preview.
//! - [`RetrievalPipeline::find_deep_products`] — the heavier search run when
//!   a hypothesis is liked. Globally ranked, no interleaving.
//!
//! Both are total: a failing query or an unavailable reranker degrades the
//! result, it never fails the call. No products is a valid outcome.

mod pipeline;

pub use pipeline::RetrievalPipeline;
