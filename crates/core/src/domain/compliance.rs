use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::session::SessionId;
use crate::errors::DomainError;

/// Regulatory-relevant occurrences that must be durably and immutably
/// recorded (FDCPA / TCPA / GLBA / CFPB).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceEventType {
    MiniMiranda,
    CeaseAndDesist,
    DebtDispute,
    FraudHold,
    ConsentCapture,
    SalesOptOut,
}

impl ComplianceEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MiniMiranda => "mini_miranda",
            Self::CeaseAndDesist => "cease_and_desist",
            Self::DebtDispute => "debt_dispute",
            Self::FraudHold => "fraud_hold",
            Self::ConsentCapture => "consent_capture",
            Self::SalesOptOut => "sales_opt_out",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "mini_miranda" => Ok(Self::MiniMiranda),
            "cease_and_desist" => Ok(Self::CeaseAndDesist),
            "debt_dispute" => Ok(Self::DebtDispute),
            "fraud_hold" => Ok(Self::FraudHold),
            "consent_capture" => Ok(Self::ConsentCapture),
            "sales_opt_out" => Ok(Self::SalesOptOut),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown compliance event `{other}`")))
            }
        }
    }

    /// Flag-type events are once-per-session: recording a second one is a
    /// no-op, not a duplicate row, so audit queries stay simple.
    pub fn is_idempotent_flag(&self) -> bool {
        matches!(
            self,
            Self::MiniMiranda | Self::CeaseAndDesist | Self::DebtDispute | Self::SalesOptOut
        )
    }
}

impl std::fmt::Display for ComplianceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write-once audit record, linked to a session and optionally to the turn
/// that triggered it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplianceEvent {
    pub event_id: String,
    pub session_id: SessionId,
    pub turn_number: Option<u32>,
    pub event_type: ComplianceEventType,
    pub details: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl ComplianceEvent {
    pub fn new(
        session_id: SessionId,
        turn_number: Option<u32>,
        event_type: ComplianceEventType,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            session_id,
            turn_number,
            event_type,
            details: BTreeMap::new(),
            occurred_at,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// The set of compliance event types already on record for a session.
/// Loaded before agent execution so behaviors can gate on prior disclosures.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComplianceState {
    recorded: BTreeSet<ComplianceEventType>,
}

impl ComplianceState {
    pub fn from_recorded(recorded: BTreeSet<ComplianceEventType>) -> Self {
        Self { recorded }
    }

    pub fn contains(&self, event_type: ComplianceEventType) -> bool {
        self.recorded.contains(&event_type)
    }

    pub fn mini_miranda_given(&self) -> bool {
        self.contains(ComplianceEventType::MiniMiranda)
    }

    pub fn cease_requested(&self) -> bool {
        self.contains(ComplianceEventType::CeaseAndDesist)
    }
}
