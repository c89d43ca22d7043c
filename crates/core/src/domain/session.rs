use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentKind;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Voice,
    Chat,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Chat => "chat",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "voice" => Ok(Self::Voice),
            "chat" => Ok(Self::Chat),
            other => Err(DomainError::InvariantViolation(format!("unknown channel `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Escalated,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Escalated => "escalated",
            Self::Ended => "ended",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "active" => Ok(Self::Active),
            "escalated" => Ok(Self::Escalated),
            "ended" => Ok(Self::Ended),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown session status `{other}`")))
            }
        }
    }
}

/// One ongoing contact (call or chat) with a caller, tracked end to end.
///
/// `escalated` is monotonic: once a session has been escalated it stays
/// flagged for every later snapshot, even after the session ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub caller_id: String,
    pub channel: Channel,
    pub bank_id: String,
    pub current_agent: AgentKind,
    pub status: SessionStatus,
    pub escalated: bool,
    pub marketing_consent: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub end_reason: Option<String>,
}

impl Session {
    pub fn open(
        id: SessionId,
        channel: Channel,
        caller_id: impl Into<String>,
        bank_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            caller_id: caller_id.into(),
            channel,
            bank_id: bank_id.into(),
            current_agent: AgentKind::CustomerService,
            status: SessionStatus::Active,
            escalated: false,
            marketing_consent: false,
            started_at,
            ended_at: None,
            duration_secs: None,
            end_reason: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self.status, next),
            (SessionStatus::Active, SessionStatus::Escalated)
                | (SessionStatus::Active, SessionStatus::Ended)
                | (SessionStatus::Escalated, SessionStatus::Ended)
        )
    }

    pub fn escalate(&mut self) -> Result<(), DomainError> {
        if !self.can_transition_to(SessionStatus::Escalated) {
            return Err(DomainError::InvalidSessionTransition {
                from: self.status,
                to: SessionStatus::Escalated,
            });
        }
        self.status = SessionStatus::Escalated;
        self.escalated = true;
        self.current_agent = AgentKind::Compliance;
        Ok(())
    }

    /// Terminal and idempotent. Returns `false` when the session was already
    /// ended, in which case nothing changes.
    pub fn end(&mut self, reason: impl Into<String>, ended_at: DateTime<Utc>) -> bool {
        if self.is_ended() {
            return false;
        }
        self.status = SessionStatus::Ended;
        self.ended_at = Some(ended_at);
        self.duration_secs = Some((ended_at - self.started_at).num_seconds().max(0));
        self.end_reason = Some(reason.into());
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::agent::AgentKind;
    use crate::errors::DomainError;

    use super::{Channel, Session, SessionId, SessionStatus};

    fn session() -> Session {
        Session::open(SessionId("CA-1001".to_string()), Channel::Voice, "+15555550100", "fcb", Utc::now())
    }

    #[test]
    fn new_sessions_start_active_with_default_entry_agent() {
        let session = session();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.current_agent, AgentKind::CustomerService);
        assert!(!session.escalated);
    }

    #[test]
    fn escalation_is_monotonic_and_pins_compliance() {
        let mut session = session();
        session.escalate().expect("active -> escalated");

        assert_eq!(session.status, SessionStatus::Escalated);
        assert!(session.escalated);
        assert_eq!(session.current_agent, AgentKind::Compliance);

        session.end("completed", Utc::now());
        assert!(session.escalated, "escalated flag must survive session end");
    }

    #[test]
    fn ended_sessions_cannot_be_escalated() {
        let mut session = session();
        session.end("caller_hangup", Utc::now());

        let error = session.escalate().expect_err("ended -> escalated must fail");
        assert!(matches!(
            error,
            DomainError::InvalidSessionTransition { from: SessionStatus::Ended, .. }
        ));
    }

    #[test]
    fn end_is_idempotent_and_computes_duration() {
        let mut session = session();
        let ended_at = session.started_at + Duration::seconds(95);

        assert!(session.end("completed", ended_at));
        assert_eq!(session.duration_secs, Some(95));
        assert_eq!(session.end_reason.as_deref(), Some("completed"));

        let later = ended_at + Duration::seconds(30);
        assert!(!session.end("caller_hangup", later), "second end must be a no-op");
        assert_eq!(session.ended_at, Some(ended_at));
        assert_eq!(session.end_reason.as_deref(), Some("completed"));
    }

    #[test]
    fn status_parsing_round_trips() {
        for status in [SessionStatus::Active, SessionStatus::Escalated, SessionStatus::Ended] {
            assert_eq!(SessionStatus::parse(status.as_str()).expect("parse"), status);
        }
        assert!(SessionStatus::parse("paused").is_err());
    }
}
