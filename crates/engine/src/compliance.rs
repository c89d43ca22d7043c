//! Compliance event recording with monotonic-append validation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;

use teller_core::domain::compliance::{ComplianceEvent, ComplianceEventType, ComplianceState};
use teller_core::domain::session::SessionId;
use teller_core::errors::EngineError;
use teller_db::ComplianceStore;

pub struct ComplianceEmitter {
    store: Arc<dyn ComplianceStore>,
}

impl ComplianceEmitter {
    pub fn new(store: Arc<dyn ComplianceStore>) -> Self {
        Self { store }
    }

    /// Snapshot of what is already on record for a session.
    pub async fn state(&self, session_id: &SessionId) -> Result<ComplianceState, EngineError> {
        let recorded = self
            .store
            .recorded_types(session_id)
            .await
            .map_err(|error| EngineError::ComplianceWriteFailure(error.to_string()))?;
        Ok(ComplianceState::from_recorded(recorded))
    }

    /// Persist the given event types for one turn. Idempotent-flag types that
    /// are already on record are skipped rather than duplicated, which also
    /// makes a retried turn safe to re-record. Returns the number of events
    /// actually written.
    pub async fn record(
        &self,
        session_id: &SessionId,
        turn_number: Option<u32>,
        events: &BTreeSet<ComplianceEventType>,
        details: &BTreeMap<String, String>,
    ) -> Result<u32, EngineError> {
        if events.is_empty() {
            return Ok(0);
        }

        let already_recorded = self
            .store
            .recorded_types(session_id)
            .await
            .map_err(|error| EngineError::ComplianceWriteFailure(error.to_string()))?;

        let mut written = 0;
        for event_type in events {
            if event_type.is_idempotent_flag() && already_recorded.contains(event_type) {
                tracing::debug!(
                    event_name = "compliance.flag_already_recorded",
                    session_id = %session_id,
                    compliance_event = event_type.as_str(),
                    "idempotent flag already on record, skipping"
                );
                continue;
            }

            let mut event =
                ComplianceEvent::new(session_id.clone(), turn_number, *event_type, Utc::now());
            for (key, value) in details {
                event = event.with_detail(key.clone(), value.clone());
            }

            self.store
                .record(event)
                .await
                .map_err(|error| EngineError::ComplianceWriteFailure(error.to_string()))?;
            written += 1;

            tracing::info!(
                event_name = "compliance.event_recorded",
                session_id = %session_id,
                compliance_event = event_type.as_str(),
                turn_number = turn_number.unwrap_or(0),
                "compliance event recorded"
            );
        }

        Ok(written)
    }
}
