//! Jina AI embedding + rerank client.
//!
//! Talks to the `/v1/embeddings` and `/v1/rerank` endpoints. Every request
//! carries the client-level timeout, so a hung upstream surfaces as a failed
//! call and is handled by the caller's fallback path.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::embedding::EmbeddingProvider;
use crate::error::EmbeddingError;

const DEFAULT_BASE_URL: &str = "https://api.jina.ai";

/// Configuration for the Jina client.
#[derive(Debug, Clone)]
pub struct JinaConfig {
    pub api_key: SecretString,
    pub embedding_model: String,
    pub rerank_model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl JinaConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            embedding_model: "jina-embeddings-v3".to_string(),
            rerank_model: "jina-reranker-v2-base-multilingual".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// reqwest-backed Jina API client.
pub struct JinaClient {
    http: reqwest::Client,
    config: JinaConfig,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankRow>,
}

#[derive(Deserialize)]
struct RerankRow {
    index: usize,
    relevance_score: f32,
}

impl JinaClient {
    pub fn new(config: JinaConfig) -> Result<Self, EmbeddingError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbeddingError::RequestFailed {
                operation: "client".to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http, config })
    }

    async fn post_json(
        &self,
        operation: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, EmbeddingError> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::RequestFailed {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::RequestFailed {
                operation: operation.to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse {
                operation: operation.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl EmbeddingProvider for JinaClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.config.embedding_model,
            "input": texts,
        });
        let raw = self.post_json("embed", "/v1/embeddings", body).await?;
        let parsed: EmbeddingsResponse =
            serde_json::from_value(raw).map_err(|e| EmbeddingError::InvalidResponse {
                operation: "embed".to_string(),
                reason: e.to_string(),
            })?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse {
                operation: "embed".to_string(),
                reason: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.data.len()
                ),
            });
        }

        // The API may return rows out of order; realign by index.
        let mut vectors = vec![Vec::new(); texts.len()];
        for row in parsed.data {
            if row.index >= vectors.len() {
                return Err(EmbeddingError::InvalidResponse {
                    operation: "embed".to_string(),
                    reason: format!("embedding index {} out of range", row.index),
                });
            }
            vectors[row.index] = row.embedding;
        }
        Ok(vectors)
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, EmbeddingError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.config.rerank_model,
            "query": query,
            "documents": documents,
            "top_n": documents.len(),
        });
        let raw = self.post_json("rerank", "/v1/rerank", body).await?;
        let parsed: RerankResponse =
            serde_json::from_value(raw).map_err(|e| EmbeddingError::InvalidResponse {
                operation: "rerank".to_string(),
                reason: e.to_string(),
            })?;

        // Scores come back ranked; realign to input document order.
        let mut scores = vec![0.0_f32; documents.len()];
        for row in parsed.results {
            if row.index >= scores.len() {
                return Err(EmbeddingError::InvalidResponse {
                    operation: "rerank".to_string(),
                    reason: format!("rerank index {} out of range", row.index),
                });
            }
            scores[row.index] = row.relevance_score;
        }
        Ok(scores)
    }
}
