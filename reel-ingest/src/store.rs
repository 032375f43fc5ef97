use chrono::Utc;
use reel_core::models::{
    EventBatch, SessionDetail, SessionMetadata, SessionPage, SessionRecord, SessionSummary,
    PAGE_SIZE,
};
use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::locks::SessionLocks;

const SELECT_SESSION: &str = r#"
    SELECT id, session_id, url, title, user_agent, viewport, event_count, created_at, updated_at
    FROM sessions
"#;

/// Authoritative record of every session and its event log.
///
/// Cheap to clone; clones share the pool and the per-session append locks.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    locks: SessionLocks,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: SessionLocks::new(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register a session, or refresh the descriptive fields of an existing
    /// one. Re-registration keeps `created_at`, `updated_at` and the event log.
    pub async fn submit_metadata(&self, metadata: &SessionMetadata) -> Result<(), StoreError> {
        validate_session_id(&metadata.session_id)?;

        let viewport = serde_json::to_string(&metadata.viewport)?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO sessions (session_id, url, title, user_agent, viewport, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(session_id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                user_agent = excluded.user_agent,
                viewport = excluded.viewport
            "#,
        )
        .bind(&metadata.session_id)
        .bind(&metadata.url)
        .bind(&metadata.title)
        .bind(&metadata.user_agent)
        .bind(&viewport)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            session_id = %metadata.session_id,
            rows = result.rows_affected(),
            "Session metadata stored"
        );
        Ok(())
    }

    pub async fn append_batch(&self, batch: &EventBatch) -> Result<u64, StoreError> {
        self.append_events(&batch.session_id, &batch.events).await
    }

    /// Append `events` after the existing log of `session_id` and return the
    /// new log length.
    ///
    /// The session must already exist. Appends to the same session are
    /// serialized; the counter bump and the event rows commit together, so a
    /// failed append leaves the log untouched.
    pub async fn append_events(
        &self,
        session_id: &str,
        events: &[serde_json::Value],
    ) -> Result<u64, StoreError> {
        validate_session_id(session_id)?;

        if events.is_empty() {
            return self.event_count(session_id).await;
        }

        let payloads = events
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let _guard = self.locks.acquire(session_id).await;
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock before it reads
        // the sequence base.
        let new_count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE sessions
            SET event_count = event_count + ?1, updated_at = ?2
            WHERE session_id = ?3
            RETURNING event_count
            "#,
        )
        .bind(payloads.len() as i64)
        .bind(Utc::now())
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let new_count = match new_count {
            Some(count) => count,
            None => return Err(StoreError::NotFound(session_id.to_string())),
        };

        let base = new_count - payloads.len() as i64;
        for (offset, payload) in payloads.iter().enumerate() {
            sqlx::query("INSERT INTO session_events (session_id, seq, payload) VALUES (?1, ?2, ?3)")
                .bind(session_id)
                .bind(base + offset as i64)
                .bind(payload)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            session_id,
            appended = payloads.len(),
            total = new_count,
            "Events appended"
        );
        Ok(new_count as u64)
    }

    /// Sessions with at least one event, most recently updated first.
    /// Pages start at 1; anything lower is treated as 1.
    pub async fn list_sessions(&self, page: i64) -> Result<SessionPage, StoreError> {
        let page = page.clamp(1, u32::MAX as i64) as u32;
        let limit = PAGE_SIZE;
        let offset = (page as i64 - 1) * limit as i64;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE event_count > 0")
            .fetch_one(&self.pool)
            .await?;

        let query = format!(
            "{SELECT_SESSION} WHERE event_count > 0 ORDER BY updated_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        );
        let rows: Vec<SessionRecord> = sqlx::query_as(&query)
            .bind(limit as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total = total as u64;
        Ok(SessionPage {
            sessions: rows.iter().map(SessionSummary::from).collect(),
            total,
            page,
            limit,
            pages: SessionPage::page_count(total, limit),
        })
    }

    /// Full session including its ordered event log (empty when nothing has
    /// been appended yet).
    pub async fn get_session(&self, session_id: &str) -> Result<SessionDetail, StoreError> {
        let query = format!("{SELECT_SESSION} WHERE session_id = ?1");
        let record: SessionRecord = sqlx::query_as(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;

        let payloads: Vec<String> = sqlx::query_scalar(
            "SELECT payload FROM session_events WHERE session_id = ?1 ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let events = payloads
            .iter()
            .map(|p| serde_json::from_str(p))
            .collect::<Result<Vec<serde_json::Value>, _>>()?;

        Ok(SessionDetail {
            summary: SessionSummary::from(&record),
            events,
        })
    }

    async fn event_count(&self, session_id: &str) -> Result<u64, StoreError> {
        let count: Option<i64> =
            sqlx::query_scalar("SELECT event_count FROM sessions WHERE session_id = ?1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        count
            .map(|c| c as u64)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }
}

/// Ids that would be shadowed by the ingestion routes under `/api/sessions/`.
const RESERVED_SESSION_IDS: &[&str] = &["metadata", "events"];

fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    if session_id.trim().is_empty() {
        return Err(StoreError::Validation("sessionId is required".to_string()));
    }
    if RESERVED_SESSION_IDS.contains(&session_id) {
        return Err(StoreError::Validation(format!(
            "sessionId '{}' is reserved",
            session_id
        )));
    }
    Ok(())
}
