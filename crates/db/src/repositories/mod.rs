use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use teller_core::domain::compliance::{ComplianceEvent, ComplianceEventType};
use teller_core::domain::metrics::DailyMetric;
use teller_core::domain::session::{Session, SessionId};
use teller_core::domain::turn::TurnRecord;

pub mod compliance;
pub mod memory;
pub mod metrics;
pub mod session;
pub mod turn;

pub use compliance::SqlComplianceStore;
pub use memory::{
    InMemoryComplianceStore, InMemoryDailyMetricStore, InMemorySessionStore, InMemoryTurnStore,
};
pub use metrics::SqlDailyMetricStore;
pub use session::SqlSessionStore;
pub use turn::SqlTurnStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError>;
    async fn insert(&self, session: Session) -> Result<(), RepositoryError>;
    async fn update(&self, session: Session) -> Result<(), RepositoryError>;
    /// Sessions not yet ended, for the reconciliation pass.
    async fn list_unfinished(&self) -> Result<Vec<Session>, RepositoryError>;
    async fn list_ended_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>, RepositoryError>;
}

#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Next free `turn_number` for the session, starting at 1. Only safe to
    /// pair with `append` while the caller holds the session's exclusive
    /// access.
    async fn next_turn_number(&self, session_id: &SessionId) -> Result<u32, RepositoryError>;
    async fn append(&self, turn: TurnRecord) -> Result<(), RepositoryError>;
    /// The most recent `limit` turns, returned oldest first.
    async fn list_recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<TurnRecord>, RepositoryError>;
    async fn last_agent_turn(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<TurnRecord>, RepositoryError>;
}

#[async_trait]
pub trait ComplianceStore: Send + Sync {
    async fn record(&self, event: ComplianceEvent) -> Result<(), RepositoryError>;
    async fn recorded_types(
        &self,
        session_id: &SessionId,
    ) -> Result<BTreeSet<ComplianceEventType>, RepositoryError>;
    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ComplianceEvent>, RepositoryError>;
}

#[async_trait]
pub trait DailyMetricStore: Send + Sync {
    async fn upsert(&self, metric: DailyMetric) -> Result<(), RepositoryError>;
    async fn find(&self, date: NaiveDate) -> Result<Option<DailyMetric>, RepositoryError>;
}
