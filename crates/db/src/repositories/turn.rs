use std::collections::BTreeMap;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use teller_core::domain::agent::AgentKind;
use teller_core::domain::session::SessionId;
use teller_core::domain::turn::{TurnRecord, TurnRole};

use super::session::parse_timestamp;
use super::{RepositoryError, TurnStore};
use crate::DbPool;

pub struct SqlTurnStore {
    pool: DbPool,
}

impl SqlTurnStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const TURN_COLUMNS: &str =
    "session_id, turn_number, role, content, agent_name, metadata_json, occurred_at";

#[async_trait::async_trait]
impl TurnStore for SqlTurnStore {
    async fn next_turn_number(&self, session_id: &SessionId) -> Result<u32, RepositoryError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(turn_number), 0) AS last FROM turns WHERE session_id = ?",
        )
        .bind(&session_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("last") as u32 + 1)
    }

    async fn append(&self, turn: TurnRecord) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&turn.metadata)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO turns (session_id, turn_number, role, content, agent_name, \
             metadata_json, occurred_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&turn.session_id.0)
        .bind(i64::from(turn.turn_number))
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(turn.agent_name.as_str())
        .bind(metadata_json)
        .bind(turn.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<TurnRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TURN_COLUMNS} FROM (
                SELECT {TURN_COLUMNS} FROM turns WHERE session_id = ?
                ORDER BY turn_number DESC LIMIT ?
             ) ORDER BY turn_number ASC",
        ))
        .bind(&session_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(turn_from_row).collect()
    }

    async fn last_agent_turn(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<TurnRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TURN_COLUMNS} FROM turns \
             WHERE session_id = ? AND role = 'agent' \
             ORDER BY turn_number DESC LIMIT 1",
        ))
        .bind(&session_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(turn_from_row).transpose()
    }
}

fn turn_from_row(row: SqliteRow) -> Result<TurnRecord, RepositoryError> {
    let metadata: BTreeMap<String, String> =
        serde_json::from_str(&row.get::<String, _>("metadata_json"))
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(TurnRecord {
        session_id: SessionId(row.get::<String, _>("session_id")),
        turn_number: row.get::<i64, _>("turn_number") as u32,
        role: TurnRole::parse(&row.get::<String, _>("role"))
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        content: row.get("content"),
        agent_name: AgentKind::parse(&row.get::<String, _>("agent_name"))
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        metadata,
        occurred_at: parse_timestamp(&row.get::<String, _>("occurred_at"))?,
    })
}
