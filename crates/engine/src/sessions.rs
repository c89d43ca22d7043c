//! Session lifecycle and per-session mutual exclusion.
//!
//! Turns within one session are strictly ordered by an async mutex keyed by
//! `session_id`; unrelated sessions never contend. Mutating operations take
//! a [`SessionGuard`] so exclusive access is proven at the type level.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use teller_core::domain::session::{Channel, Session, SessionId, SessionStatus};
use teller_core::errors::{DomainError, EngineError};
use teller_db::{RepositoryError, SessionStore};

#[derive(Clone, Debug)]
pub struct OpenSession {
    pub channel: Channel,
    pub caller_id: String,
    pub bank_id: String,
    pub marketing_consent: bool,
}

/// Proof of exclusive access to one session's mutable state. Holding the
/// guard serializes every turn for that session.
pub struct SessionGuard {
    session_id: SessionId,
    _permit: OwnedMutexGuard<()>,
}

impl SessionGuard {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store, locks: Mutex::new(HashMap::new()) }
    }

    /// Acquire exclusive access for one session id. The per-id mutex is
    /// created on first use, so concurrent callers with the same unseen id
    /// serialize here and creation happens exactly once.
    pub async fn lock(&self, session_id: &SessionId) -> SessionGuard {
        let cell = {
            let mut locks = self.locks.lock().await;
            locks.entry(session_id.0.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        SessionGuard { session_id: session_id.clone(), _permit: cell.lock_owned().await }
    }

    /// Idempotent: returns the existing snapshot or creates a fresh active
    /// session with the default entry agent.
    pub async fn get_or_create(
        &self,
        guard: &SessionGuard,
        open: OpenSession,
    ) -> Result<Session, EngineError> {
        if let Some(existing) = self.store.find(guard.session_id()).await.map_err(storage)? {
            return Ok(existing);
        }

        let mut session = Session::open(
            guard.session_id().clone(),
            open.channel,
            open.caller_id,
            open.bank_id,
            Utc::now(),
        );
        session.marketing_consent = open.marketing_consent;

        self.store.insert(session.clone()).await.map_err(storage)?;
        tracing::info!(
            event_name = "session.created",
            session_id = %session.id,
            channel = session.channel.as_str(),
            "session created"
        );
        Ok(session)
    }

    pub async fn get(&self, session_id: &SessionId) -> Result<Session, EngineError> {
        self.store
            .find(session_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| EngineError::UnknownSession(session_id.clone()))
    }

    pub async fn set_current_agent(
        &self,
        guard: &SessionGuard,
        agent: teller_core::domain::agent::AgentKind,
    ) -> Result<Session, EngineError> {
        let mut session = self.get(guard.session_id()).await?;
        if session.is_ended() {
            return Ok(session);
        }
        if session.current_agent != agent {
            session.current_agent = agent;
            self.store.update(session.clone()).await.map_err(storage)?;
        }
        Ok(session)
    }

    /// Enforce the status state machine: active -> escalated, active ->
    /// ended, escalated -> ended. Anything else is an `InvalidTransition`.
    pub async fn transition(
        &self,
        guard: &SessionGuard,
        to: SessionStatus,
        reason: Option<&str>,
    ) -> Result<Session, EngineError> {
        match to {
            SessionStatus::Ended => self.end(guard, reason.unwrap_or("completed")).await,
            SessionStatus::Escalated => {
                let mut session = self.get(guard.session_id()).await?;
                session.escalate()?;
                self.store.update(session.clone()).await.map_err(storage)?;
                tracing::info!(
                    event_name = "session.escalated",
                    session_id = %session.id,
                    reason = reason.unwrap_or("unspecified"),
                    "session escalated and pinned to compliance"
                );
                Ok(session)
            }
            SessionStatus::Active => {
                let session = self.get(guard.session_id()).await?;
                Err(EngineError::Domain(DomainError::InvalidSessionTransition {
                    from: session.status,
                    to: SessionStatus::Active,
                }))
            }
        }
    }

    /// Terminal and idempotent: ending an already-ended session is a no-op.
    pub async fn end(&self, guard: &SessionGuard, reason: &str) -> Result<Session, EngineError> {
        let mut session = self.get(guard.session_id()).await?;
        if session.end(reason, Utc::now()) {
            self.store.update(session.clone()).await.map_err(storage)?;
            tracing::info!(
                event_name = "session.ended",
                session_id = %session.id,
                reason,
                duration_secs = session.duration_secs.unwrap_or(0),
                "session ended"
            );
        }
        Ok(session)
    }

    /// External termination entry point (caller hangup, timeout policy).
    pub async fn end_by_id(
        &self,
        session_id: &SessionId,
        reason: &str,
    ) -> Result<Session, EngineError> {
        let session = {
            let guard = self.lock(session_id).await;
            self.end(&guard, reason).await?
        };
        self.release_if_idle(session_id).await;
        Ok(session)
    }

    /// Drop the per-id mutex once nobody else holds a handle to it. Only
    /// effective after every guard for the id is gone; keeps the lock
    /// registry from growing with every session ever seen.
    pub(crate) async fn release_if_idle(&self, session_id: &SessionId) {
        let mut locks = self.locks.lock().await;
        if let Some(cell) = locks.get(&session_id.0) {
            if Arc::strong_count(cell) == 1 {
                locks.remove(&session_id.0);
            }
        }
    }
}

fn storage(error: RepositoryError) -> EngineError {
    EngineError::storage(error)
}
