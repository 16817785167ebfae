//! libSQL session store.
//!
//! One row per session, whole payload as JSON. Expiry is lazy: an expired
//! row is deleted on the next `get` and treated as missing.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use tracing::{debug, info};

use crate::error::SessionError;
use crate::session::model::RecommendationSession;
use crate::session::SessionStore;

/// libSQL-backed TTL session store.
pub struct LibSqlSessionStore {
    conn: Connection,
    ttl: Duration,
}

impl LibSqlSessionStore {
    /// Open (or create) a local session database file.
    pub async fn new_local(path: &Path, ttl: Duration) -> Result<Self, SessionError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SessionError::Pool(format!("Failed to create session store directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SessionError::Pool(format!("Failed to open session store: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| SessionError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self { conn, ttl };
        store.init_schema().await?;
        info!(path = %path.display(), ttl_secs = ttl.as_secs(), "Session store opened");
        Ok(store)
    }

    /// Create an in-memory session store (for tests).
    pub async fn new_memory(ttl: Duration) -> Result<Self, SessionError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| SessionError::Pool(format!("Failed to create in-memory store: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| SessionError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self { conn, ttl };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), SessionError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS discovery_sessions (
                    id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| SessionError::Query(format!("Failed to create sessions table: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for LibSqlSessionStore {
    async fn get(&self, id: &str) -> Result<Option<RecommendationSession>, SessionError> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload, expires_at FROM discovery_sessions WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| SessionError::Query(format!("Session lookup failed: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| SessionError::Query(format!("Row fetch failed: {e}")))?
        else {
            return Ok(None);
        };

        let payload: String = row
            .get(0)
            .map_err(|e| SessionError::Query(format!("Bad payload column: {e}")))?;
        let expires_str: String = row
            .get(1)
            .map_err(|e| SessionError::Query(format!("Bad expires_at column: {e}")))?;

        let expires_at = DateTime::parse_from_rfc3339(&expires_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        if expires_at <= Utc::now() {
            debug!(session_id = id, "Session expired, dropping row");
            self.conn
                .execute(
                    "DELETE FROM discovery_sessions WHERE id = ?1",
                    params![id],
                )
                .await
                .map_err(|e| SessionError::Query(format!("Expired-session delete failed: {e}")))?;
            return Ok(None);
        }

        let session: RecommendationSession = serde_json::from_str(&payload)
            .map_err(|e| SessionError::Serialization(format!("Corrupt session payload: {e}")))?;
        Ok(Some(session))
    }

    async fn save(&self, session: &RecommendationSession) -> Result<(), SessionError> {
        let payload = serde_json::to_string(session)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        let expires_at = (Utc::now()
            + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(24)))
        .to_rfc3339();

        self.conn
            .execute(
                "INSERT OR REPLACE INTO discovery_sessions (id, payload, expires_at)
                 VALUES (?1, ?2, ?3)",
                params![session.id.clone(), payload, expires_at],
            )
            .await
            .map_err(|e| SessionError::Query(format!("Session save failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::QuizAnswers;

    #[tokio::test]
    async fn save_and_reload_round_trips() {
        let store = LibSqlSessionStore::new_memory(Duration::from_secs(60))
            .await
            .unwrap();
        let session = RecommendationSession::new(QuizAnswers::from_interests(vec![
            "Coffee".to_string(),
        ]));
        store.save(&session).await.unwrap();

        let loaded = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.profile.quiz.interests, vec!["Coffee"]);
    }

    #[tokio::test]
    async fn unknown_id_is_none() {
        let store = LibSqlSessionStore::new_memory(Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_gone() {
        let store = LibSqlSessionStore::new_memory(Duration::ZERO).await.unwrap();
        let session = RecommendationSession::new(QuizAnswers::from_interests(vec![]));
        store.save(&session).await.unwrap();
        assert!(store.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let session = RecommendationSession::new(QuizAnswers::from_interests(vec![]));
        {
            let store = LibSqlSessionStore::new_local(&path, Duration::from_secs(60))
                .await
                .unwrap();
            store.save(&session).await.unwrap();
        }

        let store = LibSqlSessionStore::new_local(&path, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.get(&session.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn save_overwrites_previous_state() {
        let store = LibSqlSessionStore::new_memory(Duration::from_secs(60))
            .await
            .unwrap();
        let mut session = RecommendationSession::new(QuizAnswers::from_interests(vec![]));
        store.save(&session).await.unwrap();

        session.profile.shortlist.push("p42".to_string());
        store.save(&session).await.unwrap();

        let loaded = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.profile.shortlist, vec!["p42"]);
    }
}
