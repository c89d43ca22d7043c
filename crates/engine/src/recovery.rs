//! Idempotent reconciliation for sessions caught between "turn logged" and
//! "status updated" by a crash. The transcript is the source of truth: the
//! last agent turn's directive markers say what the status flip should have
//! been, so the pass can complete it after the fact.

use std::sync::Arc;

use teller_core::domain::session::SessionStatus;
use teller_core::errors::EngineError;
use teller_db::{SessionStore, TurnStore};

use crate::sessions::SessionManager;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: u32,
    pub escalations_completed: u32,
    pub ends_completed: u32,
}

pub struct Reconciler {
    manager: Arc<SessionManager>,
    sessions: Arc<dyn SessionStore>,
    turns: Arc<dyn TurnStore>,
}

impl Reconciler {
    pub fn new(
        manager: Arc<SessionManager>,
        sessions: Arc<dyn SessionStore>,
        turns: Arc<dyn TurnStore>,
    ) -> Self {
        Self { manager, sessions, turns }
    }

    /// Scan every unfinished session and re-apply any status flip whose turn
    /// record made it to storage but whose session row did not. Safe to run
    /// repeatedly and while the engine is serving.
    pub async fn reconcile(&self) -> Result<ReconcileReport, EngineError> {
        let mut report = ReconcileReport::default();

        for session in self.sessions.list_unfinished().await.map_err(EngineError::storage)? {
            report.scanned += 1;

            let Some(last_agent_turn) =
                self.turns.last_agent_turn(&session.id).await.map_err(EngineError::storage)?
            else {
                continue;
            };

            let wanted_end =
                last_agent_turn.metadata.get("end_session").map(String::as_str) == Some("true");
            let wanted_escalation =
                last_agent_turn.metadata.get("escalate").map(String::as_str) == Some("true");

            if wanted_end {
                let guard = self.manager.lock(&session.id).await;
                self.manager.end(&guard, "reconciled").await?;
                report.ends_completed += 1;
                tracing::warn!(
                    event_name = "recovery.session_end_completed",
                    session_id = %session.id,
                    "completed session end left unfinished by a crash"
                );
            } else if wanted_escalation && session.status == SessionStatus::Active {
                let guard = self.manager.lock(&session.id).await;
                self.manager
                    .transition(&guard, SessionStatus::Escalated, Some("reconciled"))
                    .await?;
                report.escalations_completed += 1;
                tracing::warn!(
                    event_name = "recovery.escalation_completed",
                    session_id = %session.id,
                    "completed escalation left unfinished by a crash"
                );
            }
        }

        Ok(report)
    }
}
