//! libSQL catalog backend.
//!
//! Products are stored with their embedding as a little-endian f32 blob.
//! `search_similar` filters by active flag and price in SQL, scores the
//! surviving rows by cosine similarity in Rust, and returns the top `limit`.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use libsql::{Connection, params};
use rust_decimal::Decimal;
use tracing::info;

use crate::catalog::{CatalogProduct, CatalogSearch, GiftCandidate};
use crate::error::CatalogError;

/// libSQL-backed catalog read model.
pub struct LibSqlCatalog {
    conn: Connection,
}

impl LibSqlCatalog {
    /// Open (or create) a local catalog database file.
    pub async fn new_local(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CatalogError::Pool(format!("Failed to create catalog directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CatalogError::Pool(format!("Failed to open catalog database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| CatalogError::Pool(format!("Failed to create connection: {e}")))?;

        let catalog = Self { conn };
        catalog.init_schema().await?;
        info!(path = %path.display(), "Catalog opened");
        Ok(catalog)
    }

    /// Create an in-memory catalog (for tests and local seeding).
    pub async fn new_memory() -> Result<Self, CatalogError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| CatalogError::Pool(format!("Failed to create in-memory catalog: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| CatalogError::Pool(format!("Failed to create connection: {e}")))?;

        let catalog = Self { conn };
        catalog.init_schema().await?;
        Ok(catalog)
    }

    async fn init_schema(&self) -> Result<(), CatalogError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS products (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    price TEXT NOT NULL,
                    currency TEXT NOT NULL,
                    image_url TEXT,
                    merchant TEXT,
                    category TEXT,
                    active INTEGER NOT NULL DEFAULT 1,
                    embedding BLOB NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| CatalogError::Query(format!("Failed to create products table: {e}")))?;
        Ok(())
    }

    /// Insert or replace a product row. Used by the ingestion hand-off and
    /// by seeding code; the discovery engine itself never writes here.
    pub async fn upsert_product(&self, product: &CatalogProduct) -> Result<(), CatalogError> {
        let c = &product.candidate;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO products
                    (id, title, price, currency, image_url, merchant, category, active, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    c.id.clone(),
                    c.title.clone(),
                    c.price.to_string(),
                    c.currency.clone(),
                    c.image_url.clone(),
                    c.merchant.clone(),
                    c.category.clone(),
                    product.active as i64,
                    embedding_to_blob(&product.embedding),
                ],
            )
            .await
            .map_err(|e| CatalogError::Query(format!("Failed to upsert product: {e}")))?;
        Ok(())
    }
}

/// Encode an embedding as a little-endian f32 blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a little-endian f32 blob back into an embedding.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity; 0.0 for mismatched or zero-norm vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn row_to_scored(
    row: &libsql::Row,
    query_embedding: &[f32],
) -> Result<(f32, GiftCandidate), CatalogError> {
    let id: String = row
        .get(0)
        .map_err(|e| CatalogError::Query(format!("Bad id column: {e}")))?;
    let title: String = row
        .get(1)
        .map_err(|e| CatalogError::Query(format!("Bad title column: {e}")))?;
    let price_str: String = row
        .get(2)
        .map_err(|e| CatalogError::Query(format!("Bad price column: {e}")))?;
    let currency: String = row
        .get(3)
        .map_err(|e| CatalogError::Query(format!("Bad currency column: {e}")))?;
    let image_url: Option<String> = row.get(4).ok();
    let merchant: Option<String> = row.get(5).ok();
    let category: Option<String> = row.get(6).ok();
    let blob: Vec<u8> = row
        .get(7)
        .map_err(|e| CatalogError::Query(format!("Bad embedding column: {e}")))?;

    let price = Decimal::from_str(&price_str)
        .map_err(|e| CatalogError::Query(format!("Bad price value {price_str:?}: {e}")))?;
    let score = cosine_similarity(query_embedding, &blob_to_embedding(&blob));

    Ok((
        score,
        GiftCandidate {
            id,
            title,
            price,
            currency,
            image_url,
            merchant,
            category,
        },
    ))
}

#[async_trait]
impl CatalogSearch for LibSqlCatalog {
    async fn search_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        active_only: bool,
        max_price: Option<Decimal>,
    ) -> Result<Vec<GiftCandidate>, CatalogError> {
        let sql = if active_only {
            "SELECT id, title, price, currency, image_url, merchant, category, embedding
             FROM products WHERE active = 1"
        } else {
            "SELECT id, title, price, currency, image_url, merchant, category, embedding
             FROM products"
        };

        let mut rows = self
            .conn
            .query(sql, ())
            .await
            .map_err(|e| CatalogError::Query(format!("Search query failed: {e}")))?;

        let mut scored: Vec<(f32, GiftCandidate)> = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CatalogError::Query(format!("Row fetch failed: {e}")))?
        {
            let (score, candidate) = row_to_scored(&row, embedding)?;
            if let Some(ceiling) = max_price {
                if candidate.price > ceiling {
                    continue;
                }
            }
            scored.push((score, candidate));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, c)| c).collect())
    }
}
