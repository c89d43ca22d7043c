use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use teller_core::domain::agent::AgentKind;
use teller_core::domain::session::{Channel, Session, SessionId, SessionStatus};

use super::{RepositoryError, SessionStore};
use crate::DbPool;

pub struct SqlSessionStore {
    pool: DbPool,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = "session_id, caller_id, channel, bank_id, current_agent, status, \
     escalated, marketing_consent, started_at, ended_at, duration_secs, end_reason";

#[async_trait::async_trait]
impl SessionStore for SqlSessionStore {
    async fn find(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(session_from_row).transpose()
    }

    async fn insert(&self, session: Session) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sessions (session_id, caller_id, channel, bank_id, current_agent, \
             status, escalated, marketing_consent, started_at, ended_at, duration_secs, \
             end_reason) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id.0)
        .bind(&session.caller_id)
        .bind(session.channel.as_str())
        .bind(&session.bank_id)
        .bind(session.current_agent.as_str())
        .bind(session.status.as_str())
        .bind(i64::from(session.escalated))
        .bind(i64::from(session.marketing_consent))
        .bind(session.started_at.to_rfc3339())
        .bind(session.ended_at.map(|value| value.to_rfc3339()))
        .bind(session.duration_secs)
        .bind(session.end_reason.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, session: Session) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE sessions SET caller_id = ?, channel = ?, bank_id = ?, current_agent = ?, \
             status = ?, escalated = ?, marketing_consent = ?, started_at = ?, ended_at = ?, \
             duration_secs = ?, end_reason = ? WHERE session_id = ?",
        )
        .bind(&session.caller_id)
        .bind(session.channel.as_str())
        .bind(&session.bank_id)
        .bind(session.current_agent.as_str())
        .bind(session.status.as_str())
        .bind(i64::from(session.escalated))
        .bind(i64::from(session.marketing_consent))
        .bind(session.started_at.to_rfc3339())
        .bind(session.ended_at.map(|value| value.to_rfc3339()))
        .bind(session.duration_secs)
        .bind(session.end_reason.as_deref())
        .bind(&session.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_unfinished(&self) -> Result<Vec<Session>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE status != 'ended' ORDER BY started_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(session_from_row).collect()
    }

    async fn list_ended_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE ended_at IS NOT NULL AND ended_at >= ? AND ended_at < ? \
             ORDER BY ended_at"
        ))
        .bind(from.to_rfc3339())
        .bind(to.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(session_from_row).collect()
    }
}

fn session_from_row(row: SqliteRow) -> Result<Session, RepositoryError> {
    Ok(Session {
        id: SessionId(row.get::<String, _>("session_id")),
        caller_id: row.get("caller_id"),
        channel: Channel::parse(&row.get::<String, _>("channel"))
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        bank_id: row.get("bank_id"),
        current_agent: AgentKind::parse(&row.get::<String, _>("current_agent"))
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        status: SessionStatus::parse(&row.get::<String, _>("status"))
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        escalated: row.get::<i64, _>("escalated") != 0,
        marketing_consent: row.get::<i64, _>("marketing_consent") != 0,
        started_at: parse_timestamp(&row.get::<String, _>("started_at"))?,
        ended_at: row
            .get::<Option<String>, _>("ended_at")
            .map(|value| parse_timestamp(&value))
            .transpose()?,
        duration_secs: row.get("duration_secs"),
        end_reason: row.get("end_reason"),
    })
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{value}`: {error}")))
}
