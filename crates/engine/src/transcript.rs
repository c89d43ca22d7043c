//! Append-only conversation log. Turn numbers are assigned here, under the
//! session's exclusive access, so sequences are gap-free and duplicate-free.

use std::sync::Arc;

use chrono::Utc;

use teller_core::domain::session::SessionId;
use teller_core::domain::turn::{NewTurn, TurnRecord};
use teller_core::errors::EngineError;
use teller_db::TurnStore;

use crate::sessions::SessionGuard;

pub struct ConversationLogger {
    store: Arc<dyn TurnStore>,
}

impl ConversationLogger {
    pub fn new(store: Arc<dyn TurnStore>) -> Self {
        Self { store }
    }

    /// The number the next appended turn will receive.
    pub async fn next_turn_number(&self, guard: &SessionGuard) -> Result<u32, EngineError> {
        self.store.next_turn_number(guard.session_id()).await.map_err(EngineError::storage)
    }

    /// Append one turn and return the stored record. Requires the session
    /// guard: numbering is only atomic because callers hold exclusive access.
    pub async fn append(&self, guard: &SessionGuard, turn: NewTurn) -> Result<TurnRecord, EngineError> {
        debug_assert_eq!(guard.session_id(), &turn.session_id);

        let turn_number =
            self.store.next_turn_number(guard.session_id()).await.map_err(EngineError::storage)?;
        let record = turn.into_record(turn_number, Utc::now());
        self.store.append(record.clone()).await.map_err(EngineError::storage)?;

        tracing::debug!(
            event_name = "transcript.turn_appended",
            session_id = %record.session_id,
            turn_number = record.turn_number,
            role = record.role.as_str(),
            agent = record.agent_name.as_str(),
            "turn appended"
        );
        Ok(record)
    }

    pub async fn recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<TurnRecord>, EngineError> {
        self.store.list_recent(session_id, limit).await.map_err(EngineError::storage)
    }
}
