//! Durable persistence side-channel.
//!
//! Everything written here is best-effort from the orchestrator's point of
//! view: recipients, hypothesis batches, interactions, and reaction updates
//! survive session expiry, but a failed write never affects the live
//! dialogue. Callers log and continue.

mod libsql_backend;
pub mod migrations;

pub use libsql_backend::LibSqlStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::session::model::{Hypothesis, QuizAnswers, UserInteraction};

/// Persisted reaction state of a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Liked,
    Disliked,
}

impl Reaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Liked => "liked",
            Self::Disliked => "disliked",
        }
    }
}

/// Relational store for recipients, hypotheses, and interaction history.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Create a durable recipient row for an owning user. Returns the new
    /// recipient id.
    async fn create_recipient(
        &self,
        owner_id: Uuid,
        quiz: &QuizAnswers,
    ) -> Result<Uuid, StoreError>;

    /// Persist a batch of hypotheses belonging to one track.
    async fn save_hypotheses(
        &self,
        session_id: &str,
        topic: &str,
        hypotheses: &[Hypothesis],
    ) -> Result<(), StoreError>;

    /// Append one interaction event. Uncapped, unlike the in-session history.
    async fn save_interaction(
        &self,
        session_id: &str,
        interaction: &UserInteraction,
    ) -> Result<(), StoreError>;

    /// Set or clear the persisted reaction of a hypothesis.
    async fn update_hypothesis_reaction(
        &self,
        hypothesis_id: Uuid,
        reaction: Option<Reaction>,
    ) -> Result<(), StoreError>;
}
