//! Discovery session state and its TTL-bound store.

mod libsql_store;
pub mod model;

pub use libsql_store::LibSqlSessionStore;
pub use model::{
    DialogueStep, Hypothesis, InteractionKind, Language, QuizAnswers, RecipientProfile,
    RecommendationSession, SessionView, TopicTrack, TrackStatus, UserInteraction,
};

use async_trait::async_trait;

use crate::error::SessionError;

/// Durable, TTL-bound store for in-flight discovery sessions.
///
/// Sessions follow a read-modify-write cycle with no locking: one active
/// client per session id is assumed, last writer wins. The TTL is applied
/// (and refreshed) at `save`; sessions are never deleted explicitly.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session by id. Returns `None` for unknown or expired ids.
    async fn get(&self, id: &str) -> Result<Option<RecommendationSession>, SessionError>;

    /// Persist the full session, refreshing its TTL.
    async fn save(&self, session: &RecommendationSession) -> Result<(), SessionError>;
}
