use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::compliance::ComplianceEventType;
use crate::errors::DomainError;

/// Closed set of specialist agents. Dispatch is always by this tag, never by
/// free-form name strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    CustomerService,
    Collections,
    FraudDetection,
    Sales,
    Onboarding,
    Compliance,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::CustomerService,
        AgentKind::Collections,
        AgentKind::FraudDetection,
        AgentKind::Sales,
        AgentKind::Onboarding,
        AgentKind::Compliance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerService => "customer_service",
            Self::Collections => "collections",
            Self::FraudDetection => "fraud_detection",
            Self::Sales => "sales",
            Self::Onboarding => "onboarding",
            Self::Compliance => "compliance",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "customer_service" => Ok(Self::CustomerService),
            "collections" => Ok(Self::Collections),
            "fraud_detection" => Ok(Self::FraudDetection),
            "sales" => Ok(Self::Sales),
            "onboarding" => Ok(Self::Onboarding),
            "compliance" => Ok(Self::Compliance),
            other => Err(DomainError::InvariantViolation(format!("unknown agent kind `{other}`"))),
        }
    }

    /// Sticky agents own the conversation once engaged; the router must not
    /// reclassify away from them.
    pub fn is_sticky(&self) -> bool {
        matches!(self, Self::Compliance | Self::FraudDetection)
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one agent turn produced, before compliance policy review.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentOutcome {
    pub reply_text: String,
    pub escalate: bool,
    pub end_session: bool,
    pub compliance_triggers: BTreeSet<ComplianceEventType>,
    pub next_agent_override: Option<AgentKind>,
    pub metadata: BTreeMap<String, String>,
}

impl AgentOutcome {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply_text: text.into(),
            escalate: false,
            end_session: false,
            compliance_triggers: BTreeSet::new(),
            next_agent_override: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn escalating(mut self) -> Self {
        self.escalate = true;
        self
    }

    pub fn ending(mut self) -> Self {
        self.end_session = true;
        self
    }

    pub fn with_trigger(mut self, event_type: ComplianceEventType) -> Self {
        self.compliance_triggers.insert(event_type);
        self
    }

    pub fn with_override(mut self, agent: AgentKind) -> Self {
        self.next_agent_override = Some(agent);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::compliance::ComplianceEventType;

    use super::{AgentKind, AgentOutcome};

    #[test]
    fn agent_kind_round_trips_through_names() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::parse(kind.as_str()).expect("parse"), kind);
        }
        assert!(AgentKind::parse("concierge").is_err());
    }

    #[test]
    fn only_compliance_and_fraud_are_sticky() {
        let sticky: Vec<AgentKind> =
            AgentKind::ALL.into_iter().filter(AgentKind::is_sticky).collect();
        assert_eq!(sticky, vec![AgentKind::FraudDetection, AgentKind::Compliance]);
    }

    #[test]
    fn outcome_builder_accumulates_triggers() {
        let outcome = AgentOutcome::reply("noted")
            .with_trigger(ComplianceEventType::CeaseAndDesist)
            .with_trigger(ComplianceEventType::DebtDispute)
            .with_override(AgentKind::Compliance);

        assert_eq!(outcome.compliance_triggers.len(), 2);
        assert_eq!(outcome.next_agent_override, Some(AgentKind::Compliance));
        assert!(!outcome.escalate);
    }
}
