use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentKind;
use crate::domain::session::SessionId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Caller,
    Agent,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Agent => "agent",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "caller" => Ok(Self::Caller),
            "agent" => Ok(Self::Agent),
            other => Err(DomainError::InvariantViolation(format!("unknown turn role `{other}`"))),
        }
    }
}

/// One utterance in a session transcript. Append-only: the sequence ordered
/// by `turn_number` is the authoritative record of the conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub session_id: SessionId,
    pub turn_number: u32,
    pub role: TurnRole,
    pub content: String,
    pub agent_name: AgentKind,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

/// A turn awaiting its number. The conversation logger assigns the next
/// `turn_number` under the session's exclusive access.
#[derive(Clone, Debug, PartialEq)]
pub struct NewTurn {
    pub session_id: SessionId,
    pub role: TurnRole,
    pub content: String,
    pub agent_name: AgentKind,
    pub metadata: BTreeMap<String, String>,
}

impl NewTurn {
    pub fn new(
        session_id: SessionId,
        role: TurnRole,
        content: impl Into<String>,
        agent_name: AgentKind,
    ) -> Self {
        Self { session_id, role, content: content.into(), agent_name, metadata: BTreeMap::new() }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn into_record(self, turn_number: u32, occurred_at: DateTime<Utc>) -> TurnRecord {
        TurnRecord {
            session_id: self.session_id,
            turn_number,
            role: self.role,
            content: self.content,
            agent_name: self.agent_name,
            metadata: self.metadata,
            occurred_at,
        }
    }
}
