//! End-to-end turn pipeline tests over in-memory stores and a scripted
//! language model.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use teller_agent::behaviors::AgentRegistry;
use teller_agent::llm::{LlmClient, StaticReplyClient};
use teller_core::audit::InMemoryAuditSink;
use teller_core::config::EngineConfig;
use teller_core::domain::agent::AgentKind;
use teller_core::domain::compliance::{ComplianceEvent, ComplianceEventType};
use teller_core::domain::session::{Channel, SessionId, SessionStatus};
use teller_core::domain::turn::TurnRole;
use teller_core::errors::EngineError;
use teller_core::policy::CompliancePolicy;
use teller_core::routing::IntentRouter;
use teller_db::{
    ComplianceStore, InMemoryComplianceStore, InMemorySessionStore, InMemoryTurnStore,
    RepositoryError, SessionStore, TurnStore,
};
use teller_engine::{
    ComplianceEmitter, ConversationLogger, EndSessionRequest, Orchestrator, SessionManager,
    TurnRequest,
};

fn test_config() -> EngineConfig {
    EngineConfig {
        turn_deadline_secs: 30,
        write_retry_attempts: 3,
        retry_base_delay_ms: 0,
        retry_backoff_multiplier: 2,
        history_window: 15,
        metrics_rollup_interval_secs: 3_600,
    }
}

struct Harness {
    orchestrator: Orchestrator,
    sessions: Arc<InMemorySessionStore>,
    turns: Arc<InMemoryTurnStore>,
    compliance: Arc<InMemoryComplianceStore>,
    audit: InMemoryAuditSink,
}

fn harness(llm: Arc<dyn LlmClient>, config: EngineConfig) -> Harness {
    let compliance = Arc::new(InMemoryComplianceStore::default());
    harness_with_compliance(llm, config, compliance.clone(), compliance)
}

fn harness_with_compliance(
    llm: Arc<dyn LlmClient>,
    config: EngineConfig,
    store: Arc<dyn ComplianceStore>,
    inspect: Arc<InMemoryComplianceStore>,
) -> Harness {
    let sessions = Arc::new(InMemorySessionStore::default());
    let turns = Arc::new(InMemoryTurnStore::default());
    let audit = InMemoryAuditSink::default();

    let orchestrator = Orchestrator::new(
        SessionManager::new(sessions.clone()),
        IntentRouter::default(),
        CompliancePolicy::default(),
        AgentRegistry::new(llm, "First Community Bank"),
        ComplianceEmitter::new(store),
        ConversationLogger::new(turns.clone()),
        Arc::new(audit.clone()),
        config,
    );

    Harness { orchestrator, sessions, turns, compliance: inspect, audit }
}

fn turn(session_id: &str, content: &str) -> TurnRequest {
    TurnRequest {
        session_id: SessionId(session_id.to_string()),
        channel: Channel::Voice,
        caller_id: "+15555550100".to_string(),
        bank_id: "fcb".to_string(),
        content: content.to_string(),
        marketing_consent: false,
    }
}

async fn events_of(harness: &Harness, session_id: &str) -> Vec<ComplianceEvent> {
    harness
        .compliance
        .list_for_session(&SessionId(session_id.to_string()))
        .await
        .expect("list events")
}

#[tokio::test]
async fn scenario_payment_intent_routes_to_collections_with_mini_miranda() {
    let harness = harness(
        Arc::new(StaticReplyClient::always("You can pay in full or set up a plan today.")),
        test_config(),
    );

    let reply = harness
        .orchestrator
        .process_turn(turn("CA-A", "I want to make a payment"))
        .await
        .expect("turn");

    assert_eq!(reply.agent, AgentKind::Collections);
    assert_eq!(reply.turn_number, 1);
    assert_eq!(reply.session_status, SessionStatus::Active);
    assert!(!reply.escalated);
    assert!(reply.reply_text.starts_with("This is an attempt to collect a debt."));

    let events = events_of(&harness, "CA-A").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ComplianceEventType::MiniMiranda);
    assert_eq!(events[0].turn_number, Some(1));
}

#[tokio::test]
async fn scenario_cease_and_dispute_flags_once_and_hands_off_to_compliance() {
    let harness = harness(
        Arc::new(StaticReplyClient::always("We can set up a payment plan.")),
        test_config(),
    );

    harness
        .orchestrator
        .process_turn(turn("CA-B", "I need to make a payment on my loan"))
        .await
        .expect("first turn");

    let reply = harness
        .orchestrator
        .process_turn(turn("CA-B", "stop contacting me, I dispute this debt"))
        .await
        .expect("second turn");

    let lowered = reply.reply_text.to_ascii_lowercase();
    assert!(!lowered.contains("payment"), "no payment-demand language after dispute");

    let session = harness
        .sessions
        .find(&SessionId("CA-B".to_string()))
        .await
        .expect("find")
        .expect("present");
    assert_eq!(session.current_agent, AgentKind::Compliance, "override pins the next turn");
    assert_eq!(session.status, SessionStatus::Active, "dispute alone does not escalate");

    let types: BTreeSet<ComplianceEventType> =
        events_of(&harness, "CA-B").await.iter().map(|event| event.event_type).collect();
    assert!(types.contains(&ComplianceEventType::CeaseAndDesist));
    assert!(types.contains(&ComplianceEventType::DebtDispute));

    // The same rights invocation again must not add duplicate flag rows, and
    // the compliance desk now owns the conversation.
    let repeat = harness
        .orchestrator
        .process_turn(turn("CA-B", "stop contacting me, I dispute this debt"))
        .await
        .expect("third turn");
    assert_eq!(repeat.agent, AgentKind::Compliance);

    let cease_rows = events_of(&harness, "CA-B")
        .await
        .iter()
        .filter(|event| event.event_type == ComplianceEventType::CeaseAndDesist)
        .count();
    assert_eq!(cease_rows, 1, "idempotent flag stored exactly once");
}

#[tokio::test]
async fn scenario_fraud_escalation_is_sticky_for_the_rest_of_the_session() {
    let harness = harness(Arc::new(StaticReplyClient::always("unused")), test_config());

    let reply = harness
        .orchestrator
        .process_turn(turn("CA-C", "someone stole my card"))
        .await
        .expect("fraud turn");

    assert_eq!(reply.agent, AgentKind::FraudDetection);
    assert_eq!(reply.session_status, SessionStatus::Escalated);
    assert!(reply.escalated);

    let types: BTreeSet<ComplianceEventType> =
        events_of(&harness, "CA-C").await.iter().map(|event| event.event_type).collect();
    assert!(types.contains(&ComplianceEventType::FraudHold));

    // Classifier output is irrelevant now: the session is pinned to the
    // compliance desk until it ends.
    let followup = harness
        .orchestrator
        .process_turn(turn("CA-C", "actually, what are your savings account rates?"))
        .await
        .expect("followup turn");

    assert_eq!(followup.agent, AgentKind::Compliance);
    assert_eq!(followup.session_status, SessionStatus::Escalated);
    assert!(followup.escalated, "escalated flag is monotonic");
}

#[tokio::test]
async fn scenario_ending_twice_is_a_quiet_no_op() {
    let harness = harness(Arc::new(StaticReplyClient::always("Happy to help.")), test_config());

    harness.orchestrator.process_turn(turn("CA-D", "hello there")).await.expect("turn");

    harness
        .orchestrator
        .end_session(EndSessionRequest {
            session_id: SessionId("CA-D".to_string()),
            reason: "caller_hangup".to_string(),
        })
        .await
        .expect("first end");

    harness
        .orchestrator
        .end_session(EndSessionRequest {
            session_id: SessionId("CA-D".to_string()),
            reason: "timeout".to_string(),
        })
        .await
        .expect("second end is a no-op");

    let session = harness
        .sessions
        .find(&SessionId("CA-D".to_string()))
        .await
        .expect("find")
        .expect("present");
    assert_eq!(session.status, SessionStatus::Ended);
    assert_eq!(session.end_reason.as_deref(), Some("caller_hangup"));
}

#[tokio::test]
async fn turn_numbers_are_gap_free_across_the_whole_session() {
    let harness = harness(Arc::new(StaticReplyClient::always("Noted.")), test_config());

    for content in ["hello", "what's my balance", "thanks, that's everything"] {
        harness.orchestrator.process_turn(turn("CA-N", content)).await.expect("turn");
    }

    let transcript = harness
        .turns
        .list_recent(&SessionId("CA-N".to_string()), 100)
        .await
        .expect("transcript");
    let numbers: Vec<u32> = transcript.iter().map(|turn| turn.turn_number).collect();
    assert_eq!(numbers, (1..=6).collect::<Vec<u32>>());

    let roles: Vec<TurnRole> = transcript.iter().map(|turn| turn.role).collect();
    assert_eq!(
        roles,
        vec![
            TurnRole::Caller,
            TurnRole::Agent,
            TurnRole::Caller,
            TurnRole::Agent,
            TurnRole::Caller,
            TurnRole::Agent
        ]
    );
}

#[tokio::test]
async fn turns_on_an_ended_session_are_rejected_as_client_errors() {
    let harness = harness(Arc::new(StaticReplyClient::always("Hi.")), test_config());

    harness.orchestrator.process_turn(turn("CA-E", "hello")).await.expect("turn");
    harness
        .orchestrator
        .end_session(EndSessionRequest {
            session_id: SessionId("CA-E".to_string()),
            reason: "caller_hangup".to_string(),
        })
        .await
        .expect("end");

    let error = harness
        .orchestrator
        .process_turn(turn("CA-E", "one more thing"))
        .await
        .expect_err("ended sessions take no more turns");
    assert!(matches!(error, EngineError::Domain(_)));
}

#[tokio::test]
async fn human_agent_requests_escalate_before_any_agent_runs() {
    let harness = harness(Arc::new(StaticReplyClient::always("unused")), test_config());

    let reply = harness
        .orchestrator
        .process_turn(turn("CA-H", "I want to talk to a real person"))
        .await
        .expect("turn");

    assert!(reply.escalated);
    assert_eq!(reply.session_status, SessionStatus::Escalated);
    assert!(reply.reply_text.contains("human representative"));
}

#[tokio::test]
async fn consent_flag_is_captured_once_per_session() {
    let harness = harness(Arc::new(StaticReplyClient::always("Hello!")), test_config());

    let mut consenting = turn("CA-K", "hi there");
    consenting.marketing_consent = true;
    harness.orchestrator.process_turn(consenting.clone()).await.expect("first turn");

    consenting.content = "tell me more".to_string();
    harness.orchestrator.process_turn(consenting).await.expect("second turn");

    let captures = events_of(&harness, "CA-K")
        .await
        .iter()
        .filter(|event| event.event_type == ComplianceEventType::ConsentCapture)
        .count();
    assert_eq!(captures, 1);
}

#[tokio::test]
async fn unrelated_sessions_process_in_parallel() {
    let harness = Arc::new(harness(Arc::new(StaticReplyClient::always("Sure.")), test_config()));

    let left = {
        let harness = harness.clone();
        tokio::spawn(async move {
            harness.orchestrator.process_turn(turn("CA-P1", "what's my balance")).await
        })
    };
    let right = {
        let harness = harness.clone();
        tokio::spawn(async move {
            harness.orchestrator.process_turn(turn("CA-P2", "what's my balance")).await
        })
    };

    let (left, right) = (left.await.expect("join"), right.await.expect("join"));
    assert_eq!(left.expect("left turn").turn_number, 1);
    assert_eq!(right.expect("right turn").turn_number, 1);
}

// --- degraded-path doubles -------------------------------------------------

struct FlakyComplianceStore {
    inner: Arc<InMemoryComplianceStore>,
    failures_left: AtomicU32,
}

impl FlakyComplianceStore {
    fn failing(times: u32, inner: Arc<InMemoryComplianceStore>) -> Self {
        Self { inner, failures_left: AtomicU32::new(times) }
    }

    fn maybe_fail(&self) -> Result<(), RepositoryError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(RepositoryError::Decode("simulated storage outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ComplianceStore for FlakyComplianceStore {
    async fn record(&self, event: ComplianceEvent) -> Result<(), RepositoryError> {
        self.maybe_fail()?;
        self.inner.record(event).await
    }

    async fn recorded_types(
        &self,
        session_id: &SessionId,
    ) -> Result<BTreeSet<ComplianceEventType>, RepositoryError> {
        self.inner.recorded_types(session_id).await
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ComplianceEvent>, RepositoryError> {
        self.inner.list_for_session(session_id).await
    }
}

struct FailingLlmClient;

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("model unavailable"))
    }
}

struct SlowLlmClient;

#[async_trait]
impl LlmClient for SlowLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok("too late".to_string())
    }
}

#[tokio::test]
async fn transient_compliance_outage_is_retried_to_success() {
    let inner = Arc::new(InMemoryComplianceStore::default());
    let flaky = Arc::new(FlakyComplianceStore::failing(2, inner.clone()));
    let harness = harness_with_compliance(
        Arc::new(StaticReplyClient::always("Let's get that payment sorted.")),
        test_config(),
        flaky,
        inner,
    );

    let reply = harness
        .orchestrator
        .process_turn(turn("CA-R", "I want to make a payment"))
        .await
        .expect("turn succeeds after retries");

    assert_eq!(reply.agent, AgentKind::Collections);
    let events = events_of(&harness, "CA-R").await;
    assert_eq!(events.len(), 1, "mini-miranda made it to storage");
}

#[tokio::test]
async fn exhausted_compliance_retries_abort_the_turn_without_partial_state() {
    let inner = Arc::new(InMemoryComplianceStore::default());
    let flaky = Arc::new(FlakyComplianceStore::failing(u32::MAX, inner.clone()));
    let harness = harness_with_compliance(
        Arc::new(StaticReplyClient::always("unused")),
        test_config(),
        flaky,
        inner,
    );

    let error = harness
        .orchestrator
        .process_turn(turn("CA-F", "I want to make a payment"))
        .await
        .expect_err("unaudited compliance action is not committed");
    assert!(matches!(error, EngineError::ComplianceWriteFailure(_)));

    let transcript = harness
        .turns
        .list_recent(&SessionId("CA-F".to_string()), 100)
        .await
        .expect("transcript");
    assert!(transcript.is_empty(), "no turn record without the compliance record");

    let session = harness
        .sessions
        .find(&SessionId("CA-F".to_string()))
        .await
        .expect("find")
        .expect("present");
    assert_eq!(session.current_agent, AgentKind::CustomerService, "session state unchanged");
    assert_eq!(session.status, SessionStatus::Active);

    let failures = harness
        .audit
        .events()
        .into_iter()
        .filter(|event| event.event_type == "compliance.record_failed")
        .count();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn generation_failure_still_logs_the_turn_and_advances_numbering() {
    let harness = harness(Arc::new(FailingLlmClient), test_config());

    let reply = harness
        .orchestrator
        .process_turn(turn("CA-G", "what's my balance"))
        .await
        .expect("turn completes on the fallback reply");

    assert_eq!(reply.agent, AgentKind::CustomerService);
    assert!(reply.reply_text.contains("having trouble"), "canned safe response");
    assert_eq!(reply.session_status, SessionStatus::Active);

    let transcript = harness
        .turns
        .list_recent(&SessionId("CA-G".to_string()), 100)
        .await
        .expect("transcript");
    assert_eq!(transcript.len(), 2, "audit trail stays intact on reply failure");
}

#[tokio::test(start_paused = true)]
async fn turns_past_the_deadline_are_abandoned_without_partial_commits() {
    let config = EngineConfig { turn_deadline_secs: 5, ..test_config() };
    let harness = harness(Arc::new(SlowLlmClient), config);

    let error = harness
        .orchestrator
        .process_turn(turn("CA-T", "what's my balance"))
        .await
        .expect_err("slow turn is abandoned");
    assert!(matches!(error, EngineError::DeadlineExceeded(5)));

    let transcript = harness
        .turns
        .list_recent(&SessionId("CA-T".to_string()), 100)
        .await
        .expect("transcript");
    assert!(transcript.is_empty(), "no partial turn record is left behind");

    // The lock was released on abandonment, so a retry can proceed.
    let retry_harness_reply = harness
        .orchestrator
        .end_session(EndSessionRequest {
            session_id: SessionId("CA-T".to_string()),
            reason: "retry_after_timeout".to_string(),
        })
        .await;
    assert!(retry_harness_reply.is_ok());
}
