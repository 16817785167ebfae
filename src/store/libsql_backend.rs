//! libSQL backend for the persistence side-channel.

use std::path::Path;

use async_trait::async_trait;
use libsql::{Connection, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::session::model::{Hypothesis, QuizAnswers, UserInteraction};
use crate::store::migrations;
use crate::store::{DiscoveryStore, Reaction};

/// libSQL persistence backend.
pub struct LibSqlStore {
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Persistence store opened");
        Ok(Self { conn })
    }

    /// Create an in-memory store (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    async fn count(&self, table: &str) -> i64 {
        let mut rows = self
            .conn
            .query(&format!("SELECT COUNT(*) FROM {table}"), ())
            .await
            .unwrap();
        rows.next().await.unwrap().unwrap().get(0).unwrap()
    }
}

#[async_trait]
impl DiscoveryStore for LibSqlStore {
    async fn create_recipient(
        &self,
        owner_id: Uuid,
        quiz: &QuizAnswers,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let quiz_json =
            serde_json::to_string(quiz).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO recipients (id, owner_id, quiz) VALUES (?1, ?2, ?3)",
                params![id.to_string(), owner_id.to_string(), quiz_json],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to insert recipient: {e}")))?;
        Ok(id)
    }

    async fn save_hypotheses(
        &self,
        session_id: &str,
        topic: &str,
        hypotheses: &[Hypothesis],
    ) -> Result<(), StoreError> {
        for h in hypotheses {
            let queries_json = serde_json::to_string(&h.search_queries)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO hypotheses
                        (id, session_id, topic, title, description, reasoning, angle, search_queries)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        h.id.to_string(),
                        session_id,
                        topic,
                        h.title.clone(),
                        h.description.clone(),
                        h.reasoning.clone(),
                        h.angle.clone(),
                        queries_json,
                    ],
                )
                .await
                .map_err(|e| StoreError::Query(format!("Failed to insert hypothesis: {e}")))?;
        }
        Ok(())
    }

    async fn save_interaction(
        &self,
        session_id: &str,
        interaction: &UserInteraction,
    ) -> Result<(), StoreError> {
        let metadata = if interaction.metadata.is_null() {
            None
        } else {
            Some(interaction.metadata.to_string())
        };
        self.conn
            .execute(
                "INSERT INTO interactions
                    (id, session_id, kind, target_id, target_type, value, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    interaction.id.to_string(),
                    session_id,
                    interaction.kind.label(),
                    interaction.target_id.clone(),
                    interaction.target_type.clone(),
                    interaction.value.clone(),
                    metadata,
                    interaction.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to insert interaction: {e}")))?;
        Ok(())
    }

    async fn update_hypothesis_reaction(
        &self,
        hypothesis_id: Uuid,
        reaction: Option<Reaction>,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE hypotheses SET reaction = ?1 WHERE id = ?2",
                params![
                    reaction.map(|r| r.as_str().to_string()),
                    hypothesis_id.to_string()
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to update reaction: {e}")))?;
        Ok(())
    }
}
