use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::Viewport;

/// Fixed page size of the session listing.
pub const PAGE_SIZE: u32 = 20;

/// Row of the `sessions` table.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct SessionRecord {
    pub id: i64,
    pub session_id: String,
    pub url: String,
    pub title: String,
    pub user_agent: String,
    pub viewport: String,
    pub event_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Stored viewports that fail to parse (legacy empty column) read as 0x0.
    pub fn viewport(&self) -> Viewport {
        serde_json::from_str(&self.viewport).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: i64,
    pub session_id: String,
    pub url: String,
    pub title: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub viewport: Viewport,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            session_id: record.session_id.clone(),
            url: record.url.clone(),
            title: record.title.clone(),
            user_agent: record.user_agent.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            viewport: record.viewport(),
        }
    }
}

/// A session with its complete, ordered event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub events: Vec<serde_json::Value>,
}

/// One page of the session listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPage {
    pub sessions: Vec<SessionSummary>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

impl SessionPage {
    pub fn page_count(total: u64, limit: u32) -> u64 {
        total.div_ceil(limit as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(viewport: &str) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            id: 1,
            session_id: "s1".into(),
            url: "https://a".into(),
            title: "A".into(),
            user_agent: "ua".into(),
            viewport: viewport.into(),
            event_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_page_count_rounds_up() {
        assert_eq!(SessionPage::page_count(0, PAGE_SIZE), 0);
        assert_eq!(SessionPage::page_count(1, PAGE_SIZE), 1);
        assert_eq!(SessionPage::page_count(20, PAGE_SIZE), 1);
        assert_eq!(SessionPage::page_count(21, PAGE_SIZE), 2);
        assert_eq!(SessionPage::page_count(41, PAGE_SIZE), 3);
    }

    #[test]
    fn test_summary_parses_viewport() {
        let summary = SessionSummary::from(&record(r#"{"width":800,"height":600}"#));
        assert_eq!(summary.viewport, Viewport { width: 800, height: 600 });
    }

    #[test]
    fn test_empty_viewport_column_reads_as_zero() {
        let summary = SessionSummary::from(&record(""));
        assert_eq!(summary.viewport, Viewport::default());
    }

    #[test]
    fn test_detail_serializes_flat() {
        let detail = SessionDetail {
            summary: SessionSummary::from(&record("")),
            events: vec![serde_json::json!({"type": 2})],
        };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["userAgent"], "ua");
        assert!(value["events"].is_array());
        assert!(value.get("summary").is_none());
    }
}
