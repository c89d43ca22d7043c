use std::collections::BTreeMap;
use std::collections::BTreeSet;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use teller_core::domain::compliance::{ComplianceEvent, ComplianceEventType};
use teller_core::domain::session::SessionId;

use super::session::parse_timestamp;
use super::{ComplianceStore, RepositoryError};
use crate::DbPool;

pub struct SqlComplianceStore {
    pool: DbPool,
}

impl SqlComplianceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ComplianceStore for SqlComplianceStore {
    async fn record(&self, event: ComplianceEvent) -> Result<(), RepositoryError> {
        let details_json = serde_json::to_string(&event.details)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO compliance_events (event_id, session_id, turn_number, event_type, \
             details_json, occurred_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(&event.session_id.0)
        .bind(event.turn_number.map(i64::from))
        .bind(event.event_type.as_str())
        .bind(details_json)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recorded_types(
        &self,
        session_id: &SessionId,
    ) -> Result<BTreeSet<ComplianceEventType>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT DISTINCT event_type FROM compliance_events WHERE session_id = ?",
        )
        .bind(&session_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                ComplianceEventType::parse(&row.get::<String, _>("event_type"))
                    .map_err(|error| RepositoryError::Decode(error.to_string()))
            })
            .collect()
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ComplianceEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT event_id, session_id, turn_number, event_type, details_json, occurred_at \
             FROM compliance_events WHERE session_id = ? \
             ORDER BY occurred_at, event_id",
        )
        .bind(&session_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }
}

fn event_from_row(row: SqliteRow) -> Result<ComplianceEvent, RepositoryError> {
    let details: BTreeMap<String, String> =
        serde_json::from_str(&row.get::<String, _>("details_json"))
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(ComplianceEvent {
        event_id: row.get("event_id"),
        session_id: SessionId(row.get::<String, _>("session_id")),
        turn_number: row.get::<Option<i64>, _>("turn_number").map(|value| value as u32),
        event_type: ComplianceEventType::parse(&row.get::<String, _>("event_type"))
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        details,
        occurred_at: parse_timestamp(&row.get::<String, _>("occurred_at"))?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use teller_core::domain::compliance::{ComplianceEvent, ComplianceEventType};
    use teller_core::domain::session::{Channel, Session, SessionId};

    use crate::repositories::{ComplianceStore, SessionStore, SqlComplianceStore, SqlSessionStore};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn events_round_trip_with_details() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let sessions = SqlSessionStore::new(pool.clone());
        let id = SessionId("CA-1".to_string());
        sessions
            .insert(Session::open(id.clone(), Channel::Voice, "+15555550100", "fcb", Utc::now()))
            .await
            .expect("insert session");

        let store = SqlComplianceStore::new(pool);
        store
            .record(
                ComplianceEvent::new(id.clone(), Some(1), ComplianceEventType::DebtDispute, Utc::now())
                    .with_detail("caller_text", "not my debt"),
            )
            .await
            .expect("record");

        let types = store.recorded_types(&id).await.expect("types");
        assert!(types.contains(&ComplianceEventType::DebtDispute));

        let events = store.list_for_session(&id).await.expect("list");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].turn_number, Some(1));
        assert_eq!(
            events[0].details.get("caller_text").map(String::as_str),
            Some("not my debt")
        );
    }
}
