use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use teller_core::domain::compliance::{ComplianceEvent, ComplianceEventType};
use teller_core::domain::metrics::DailyMetric;
use teller_core::domain::session::{Session, SessionId};
use teller_core::domain::turn::TurnRecord;

use super::{ComplianceStore, DailyMetricStore, RepositoryError, SessionStore, TurnStore};

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn insert(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.0.clone(), session);
        Ok(())
    }

    async fn update(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.0.clone(), session);
        Ok(())
    }

    async fn list_unfinished(&self) -> Result<Vec<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().filter(|session| !session.is_ended()).cloned().collect())
    }

    async fn list_ended_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|session| {
                session.ended_at.is_some_and(|ended_at| ended_at >= from && ended_at < to)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryTurnStore {
    turns: RwLock<HashMap<String, Vec<TurnRecord>>>,
}

#[async_trait::async_trait]
impl TurnStore for InMemoryTurnStore {
    async fn next_turn_number(&self, session_id: &SessionId) -> Result<u32, RepositoryError> {
        let turns = self.turns.read().await;
        Ok(turns.get(&session_id.0).map(|list| list.len() as u32).unwrap_or(0) + 1)
    }

    async fn append(&self, turn: TurnRecord) -> Result<(), RepositoryError> {
        let mut turns = self.turns.write().await;
        let list = turns.entry(turn.session_id.0.clone()).or_default();
        if list.iter().any(|existing| existing.turn_number == turn.turn_number) {
            return Err(RepositoryError::Decode(format!(
                "duplicate turn number {} for session {}",
                turn.turn_number, turn.session_id
            )));
        }
        list.push(turn);
        Ok(())
    }

    async fn list_recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<TurnRecord>, RepositoryError> {
        let turns = self.turns.read().await;
        let list = turns.get(&session_id.0).cloned().unwrap_or_default();
        let skip = list.len().saturating_sub(limit as usize);
        Ok(list.into_iter().skip(skip).collect())
    }

    async fn last_agent_turn(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<TurnRecord>, RepositoryError> {
        let turns = self.turns.read().await;
        Ok(turns.get(&session_id.0).and_then(|list| {
            list.iter()
                .rev()
                .find(|turn| turn.role == teller_core::domain::turn::TurnRole::Agent)
                .cloned()
        }))
    }
}

#[derive(Default)]
pub struct InMemoryComplianceStore {
    events: RwLock<Vec<ComplianceEvent>>,
}

#[async_trait::async_trait]
impl ComplianceStore for InMemoryComplianceStore {
    async fn record(&self, event: ComplianceEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        events.push(event);
        Ok(())
    }

    async fn recorded_types(
        &self,
        session_id: &SessionId,
    ) -> Result<BTreeSet<ComplianceEventType>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| &event.session_id == session_id)
            .map(|event| event.event_type)
            .collect())
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ComplianceEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|event| &event.session_id == session_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryDailyMetricStore {
    metrics: RwLock<HashMap<NaiveDate, DailyMetric>>,
}

#[async_trait::async_trait]
impl DailyMetricStore for InMemoryDailyMetricStore {
    async fn upsert(&self, metric: DailyMetric) -> Result<(), RepositoryError> {
        let mut metrics = self.metrics.write().await;
        metrics.insert(metric.date, metric);
        Ok(())
    }

    async fn find(&self, date: NaiveDate) -> Result<Option<DailyMetric>, RepositoryError> {
        let metrics = self.metrics.read().await;
        Ok(metrics.get(&date).cloned())
    }
}
