//! Error types for GiftScout.

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Embedding / rerank client errors.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("{operation} request failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("Invalid {operation} response: {reason}")]
    InvalidResponse { operation: String, reason: String },
}

/// Catalog read-model errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),
}

/// Session store errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Durable persistence errors. Always swallowed-and-logged by the
/// orchestrator — a failed write never aborts the live dialogue.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Dialogue orchestration errors surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Session {id} not found or expired")]
    SessionNotFound { id: String },

    #[error("Track {id} not found in session")]
    TrackNotFound { id: String },

    #[error("Hypothesis {id} not found in session")]
    HypothesisNotFound { id: Uuid },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
