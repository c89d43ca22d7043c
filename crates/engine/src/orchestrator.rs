//! Top-level turn coordinator.
//!
//! Each inbound turn moves through a fixed pipeline: session lookup, routing,
//! agent execution, compliance review and recording, transcript append,
//! session update, reply. Any stage failure aborts the turn without advancing
//! session state, so a session never observes a partially applied turn.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use teller_agent::behaviors::{AgentRegistry, TurnContext};
use teller_agent::signals::{analyze_sentiment, escalation_requested, Sentiment};
use teller_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use teller_core::config::EngineConfig;
use teller_core::domain::agent::{AgentKind, AgentOutcome};
use teller_core::domain::compliance::{ComplianceEventType, ComplianceState};
use teller_core::domain::session::{Channel, Session, SessionId, SessionStatus};
use teller_core::domain::turn::{NewTurn, TurnRole};
use teller_core::errors::{DomainError, EngineError};
use teller_core::policy::CompliancePolicy;
use teller_core::routing::IntentRouter;

use crate::compliance::ComplianceEmitter;
use crate::sessions::{OpenSession, SessionGuard, SessionManager};
use crate::transcript::ConversationLogger;

#[derive(Clone, Debug)]
pub struct TurnRequest {
    pub session_id: SessionId,
    pub channel: Channel,
    pub caller_id: String,
    pub bank_id: String,
    pub content: String,
    pub marketing_consent: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnReply {
    pub reply_text: String,
    pub session_status: SessionStatus,
    pub escalated: bool,
    pub agent: AgentKind,
    pub turn_number: u32,
}

#[derive(Clone, Debug)]
pub struct EndSessionRequest {
    pub session_id: SessionId,
    pub reason: String,
}

pub struct Orchestrator {
    sessions: SessionManager,
    router: IntentRouter,
    policy: CompliancePolicy,
    agents: AgentRegistry,
    emitter: ComplianceEmitter,
    logger: ConversationLogger,
    audit: Arc<dyn AuditSink>,
    config: EngineConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: SessionManager,
        router: IntentRouter,
        policy: CompliancePolicy,
        agents: AgentRegistry,
        emitter: ComplianceEmitter,
        logger: ConversationLogger,
        audit: Arc<dyn AuditSink>,
        config: EngineConfig,
    ) -> Self {
        Self { sessions, router, policy, agents, emitter, logger, audit, config }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Process one inbound conversational turn end to end. Turns for the
    /// same session serialize on the session guard; unrelated sessions run
    /// fully in parallel.
    pub async fn process_turn(&self, request: TurnRequest) -> Result<TurnReply, EngineError> {
        let correlation_id = Uuid::new_v4().to_string();
        let guard = self.sessions.lock(&request.session_id).await;

        let deadline = Duration::from_secs(self.config.turn_deadline_secs);
        let result = match tokio::time::timeout(
            deadline,
            self.process_locked(&guard, &request, &correlation_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                // Abandoned: nothing past the deadline is committed and the
                // session lock is released on return, so a retried turn can
                // proceed. Compliance flag writes are idempotent on retry.
                self.audit.emit(
                    AuditEvent::new(
                        Some(request.session_id.clone()),
                        correlation_id,
                        "turn.abandoned",
                        AuditCategory::System,
                        "orchestrator",
                        AuditOutcome::Failed,
                    )
                    .with_metadata("deadline_secs", self.config.turn_deadline_secs.to_string()),
                );
                tracing::warn!(
                    event_name = "turn.abandoned",
                    session_id = %request.session_id,
                    deadline_secs = self.config.turn_deadline_secs,
                    "turn exceeded processing deadline"
                );
                Err(EngineError::DeadlineExceeded(self.config.turn_deadline_secs))
            }
        };

        drop(guard);
        if matches!(&result, Ok(reply) if reply.session_status == SessionStatus::Ended) {
            self.sessions.release_if_idle(&request.session_id).await;
        }
        result
    }

    /// Explicit external termination (caller hangup, channel timeout).
    pub async fn end_session(&self, request: EndSessionRequest) -> Result<(), EngineError> {
        let session = self.sessions.end_by_id(&request.session_id, &request.reason).await?;
        self.audit.emit(
            AuditEvent::new(
                Some(session.id.clone()),
                Uuid::new_v4().to_string(),
                "session.end_requested",
                AuditCategory::Session,
                "transport",
                AuditOutcome::Success,
            )
            .with_metadata("reason", request.reason),
        );
        Ok(())
    }

    async fn process_locked(
        &self,
        guard: &SessionGuard,
        request: &TurnRequest,
        correlation_id: &str,
    ) -> Result<TurnReply, EngineError> {
        let session = self
            .sessions
            .get_or_create(
                guard,
                OpenSession {
                    channel: request.channel,
                    caller_id: request.caller_id.clone(),
                    bank_id: request.bank_id.clone(),
                    marketing_consent: request.marketing_consent,
                },
            )
            .await?;

        // Ownership of an ended session has passed to the reporting layer;
        // the engine never mutates it again.
        if session.is_ended() {
            return Err(EngineError::Domain(DomainError::InvalidSessionTransition {
                from: SessionStatus::Ended,
                to: SessionStatus::Active,
            }));
        }

        self.audit.emit(
            AuditEvent::new(
                Some(session.id.clone()),
                correlation_id,
                "turn.received",
                AuditCategory::Ingress,
                "orchestrator",
                AuditOutcome::Success,
            )
            .with_metadata("channel", session.channel.as_str()),
        );

        let compliance_state = self.emitter.state(&session.id).await?;
        let history =
            self.logger.recent(&session.id, self.config.history_window).await?;

        let route = self.router.classify(&request.content, &session);
        self.audit.emit(
            AuditEvent::new(
                Some(session.id.clone()),
                correlation_id,
                "turn.routed",
                AuditCategory::Routing,
                "intent-router",
                AuditOutcome::Success,
            )
            .with_metadata("target_agent", route.agent.as_str())
            .with_metadata("confidence", route.confidence.to_string())
            .with_metadata("pinned", route.pinned.to_string()),
        );

        let outcome = match self.pre_check(&request.content) {
            Some(outcome) => outcome,
            None => {
                let context = TurnContext {
                    session: &session,
                    caller_text: &request.content,
                    history: &history,
                    compliance: &compliance_state,
                };
                self.agents.get(route.agent).handle(&context).await
            }
        };

        self.audit.emit(
            AuditEvent::new(
                Some(session.id.clone()),
                correlation_id,
                "agent.executed",
                AuditCategory::Agent,
                route.agent.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("escalate", outcome.escalate.to_string())
            .with_metadata("end_session", outcome.end_session.to_string()),
        );

        let (outcome, directives) =
            self.policy.review(route.agent, outcome, &session, &compliance_state);

        // Audit-critical writes come first: compliance events, then the turn
        // records, and only then the session status flip. The reconciliation
        // pass covers a crash between the last two steps.
        let caller_turn_number = self.logger.next_turn_number(guard).await?;
        let events = self.compliance_events_for(&session, &compliance_state, &outcome);
        let mut details = BTreeMap::new();
        details.insert("agent".to_string(), route.agent.as_str().to_string());
        let recorded = self
            .record_with_retry(&session.id, caller_turn_number, &events, &details, correlation_id)
            .await?;

        let caller_turn = NewTurn::new(
            session.id.clone(),
            TurnRole::Caller,
            request.content.clone(),
            route.agent,
        );
        let caller_turn =
            self.append_with_retry(guard, caller_turn).await?;

        let mut agent_turn = NewTurn::new(
            session.id.clone(),
            TurnRole::Agent,
            outcome.reply_text.clone(),
            route.agent,
        );
        for (key, value) in &outcome.metadata {
            agent_turn = agent_turn.with_metadata(key.clone(), value.clone());
        }
        agent_turn = agent_turn
            .with_metadata("escalate", directives.escalate.to_string())
            .with_metadata("end_session", directives.end_session.to_string());
        self.append_with_retry(guard, agent_turn).await?;

        self.audit.emit(
            AuditEvent::new(
                Some(session.id.clone()),
                correlation_id,
                "turn.logged",
                AuditCategory::Transcript,
                "conversation-logger",
                AuditOutcome::Success,
            )
            .with_metadata("caller_turn", caller_turn.turn_number.to_string())
            .with_metadata("compliance_events", recorded.to_string()),
        );

        self.sessions.set_current_agent(guard, directives.next_agent).await?;

        let session = if directives.end_session {
            let reason = directives.end_reason.as_deref().unwrap_or("agent_completed");
            self.sessions.end(guard, reason).await?
        } else if directives.escalate && session.status == SessionStatus::Active {
            self.sessions.transition(guard, SessionStatus::Escalated, Some("compliance_escalation")).await?
        } else {
            self.sessions.get(&session.id).await?
        };

        self.audit.emit(
            AuditEvent::new(
                Some(session.id.clone()),
                correlation_id,
                "session.updated",
                AuditCategory::Session,
                "session-manager",
                AuditOutcome::Success,
            )
            .with_metadata("status", session.status.as_str())
            .with_metadata("current_agent", session.current_agent.as_str()),
        );

        Ok(TurnReply {
            reply_text: outcome.reply_text,
            session_status: session.status,
            escalated: session.escalated,
            agent: route.agent,
            turn_number: caller_turn.turn_number,
        })
    }

    /// CFPB pre-checks evaluated before any agent runs: an explicit
    /// human-agent request or strongly negative sentiment escalates
    /// immediately with a canned transfer reply.
    fn pre_check(&self, caller_text: &str) -> Option<AgentOutcome> {
        if escalation_requested(caller_text) {
            return Some(
                AgentOutcome::reply(
                    "I'll transfer you to a human representative right away. Please hold.",
                )
                .escalating()
                .with_metadata("escalation_reason", "customer_request"),
            );
        }

        if analyze_sentiment(caller_text) == Sentiment::VeryNegative {
            return Some(
                AgentOutcome::reply(
                    "I understand your frustration and I sincerely apologize. Let me connect \
                     you with a senior representative immediately.",
                )
                .escalating()
                .with_metadata("escalation_reason", "negative_sentiment"),
            );
        }

        None
    }

    fn compliance_events_for(
        &self,
        session: &Session,
        state: &ComplianceState,
        outcome: &AgentOutcome,
    ) -> std::collections::BTreeSet<ComplianceEventType> {
        let mut events = outcome.compliance_triggers.clone();
        // Consent supplied by the transport is captured once per session.
        if session.marketing_consent && !state.contains(ComplianceEventType::ConsentCapture) {
            events.insert(ComplianceEventType::ConsentCapture);
        }
        events
    }

    /// Turn persistence shares the compliance retry budget: transient
    /// storage failures back off and retry; exhausting the budget aborts the
    /// turn end to end, with no reply committed as sent.
    async fn append_with_retry(
        &self,
        guard: &SessionGuard,
        turn: NewTurn,
    ) -> Result<teller_core::domain::turn::TurnRecord, EngineError> {
        let attempts = self.config.write_retry_attempts.max(1);
        let mut delay = Duration::from_millis(self.config.retry_base_delay_ms);
        let mut last_error = EngineError::StorageFailure("unreachable".to_string());

        for attempt in 1..=attempts {
            match self.logger.append(guard, turn.clone()).await {
                Ok(record) => return Ok(record),
                Err(error @ EngineError::StorageFailure(_)) => {
                    tracing::warn!(
                        event_name = "transcript.append_retry",
                        session_id = %turn.session_id,
                        attempt,
                        error = %error,
                        "turn append failed"
                    );
                    last_error = error;
                }
                Err(other) => return Err(other),
            }

            if attempt < attempts {
                tokio::time::sleep(delay).await;
                delay *= self.config.retry_backoff_multiplier.max(1);
            }
        }

        Err(last_error)
    }

    /// Compliance writes are fatal for the turn when they cannot be made
    /// durable: retried with exponential backoff up to the configured budget,
    /// then surfaced as a degraded-service failure. Never silently dropped.
    async fn record_with_retry(
        &self,
        session_id: &SessionId,
        turn_number: u32,
        events: &std::collections::BTreeSet<ComplianceEventType>,
        details: &BTreeMap<String, String>,
        correlation_id: &str,
    ) -> Result<u32, EngineError> {
        let attempts = self.config.write_retry_attempts.max(1);
        let mut delay = Duration::from_millis(self.config.retry_base_delay_ms);
        let mut last_error = EngineError::ComplianceWriteFailure("unreachable".to_string());

        for attempt in 1..=attempts {
            match self.emitter.record(session_id, Some(turn_number), events, details).await {
                Ok(written) => return Ok(written),
                Err(error @ EngineError::ComplianceWriteFailure(_)) => {
                    tracing::warn!(
                        event_name = "compliance.record_retry",
                        session_id = %session_id,
                        attempt,
                        error = %error,
                        "compliance write failed"
                    );
                    last_error = error;
                }
                Err(other) => return Err(other),
            }

            if attempt < attempts {
                tokio::time::sleep(delay).await;
                delay *= self.config.retry_backoff_multiplier.max(1);
            }
        }

        self.audit.emit(
            AuditEvent::new(
                Some(session_id.clone()),
                correlation_id,
                "compliance.record_failed",
                AuditCategory::Compliance,
                "compliance-emitter",
                AuditOutcome::Failed,
            )
            .with_metadata("attempts", attempts.to_string()),
        );
        Err(last_error)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}
