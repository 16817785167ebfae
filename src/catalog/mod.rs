//! Product catalog read model.

mod libsql_backend;

pub use libsql_backend::LibSqlCatalog;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Read-only projection of a catalog product. Never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftCandidate {
    pub id: String,
    pub title: String,
    pub price: Decimal,
    pub currency: String,
    pub image_url: Option<String>,
    pub merchant: Option<String>,
    pub category: Option<String>,
}

/// A catalog product with its embedding, as written by the ingestion side.
#[derive(Debug, Clone)]
pub struct CatalogProduct {
    pub candidate: GiftCandidate,
    pub active: bool,
    pub embedding: Vec<f32>,
}

/// Nearest-neighbor search over the product catalog.
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// Return up to `limit` products closest to `embedding`, optionally
    /// restricted to active products under `max_price`.
    async fn search_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        active_only: bool,
        max_price: Option<Decimal>,
    ) -> Result<Vec<GiftCandidate>, CatalogError>;
}
