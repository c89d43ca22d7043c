use crate::domain::agent::{AgentKind, AgentOutcome};
use crate::domain::compliance::{ComplianceEventType, ComplianceState};
use crate::domain::session::Session;

/// What the engine must do to the session after one reviewed turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnDirectives {
    pub next_agent: AgentKind,
    pub escalate: bool,
    pub end_session: bool,
    pub end_reason: Option<String>,
}

/// Pure rule set applied uniformly to every agent result. Agents never
/// duplicate these checks; the policy is the single place where an agent's
/// action can be vetoed or redirected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompliancePolicy {
    /// Where escalated sessions are pinned. Escalation is sticky for the
    /// remainder of the session.
    pub escalation_target: AgentKind,
}

impl Default for CompliancePolicy {
    fn default() -> Self {
        Self { escalation_target: AgentKind::Compliance }
    }
}

impl CompliancePolicy {
    /// Review one agent outcome against the regulatory rules and produce the
    /// session directives for this turn.
    pub fn review(
        &self,
        handling_agent: AgentKind,
        mut outcome: AgentOutcome,
        session: &Session,
        compliance: &ComplianceState,
    ) -> (AgentOutcome, TurnDirectives) {
        // The compliance desk is the escalation target; it cannot itself
        // escalate.
        if handling_agent == AgentKind::Compliance && outcome.escalate {
            outcome.escalate = false;
            outcome
                .metadata
                .insert("policy_veto".to_string(), "compliance_cannot_escalate".to_string());
        }

        // Fraud actions require a human or compliance confirmation before the
        // session may close, and a fraud hold always escalates.
        if handling_agent == AgentKind::FraudDetection {
            if outcome.end_session {
                outcome.end_session = false;
                outcome
                    .metadata
                    .insert("policy_veto".to_string(), "fraud_requires_confirmation".to_string());
            }
            if outcome.compliance_triggers.contains(&ComplianceEventType::FraudHold) {
                outcome.escalate = true;
            }
        }

        // FDCPA first-contact disclosure: the first collections reply in a
        // session must put the Mini-Miranda on record.
        if handling_agent == AgentKind::Collections
            && !compliance.mini_miranda_given()
            && !outcome.compliance_triggers.contains(&ComplianceEventType::MiniMiranda)
        {
            outcome.compliance_triggers.insert(ComplianceEventType::MiniMiranda);
        }

        let next_agent = if outcome.escalate || session.escalated {
            self.escalation_target
        } else {
            outcome.next_agent_override.unwrap_or(handling_agent)
        };

        let end_reason = outcome.end_session.then(|| {
            outcome
                .metadata
                .get("end_reason")
                .cloned()
                .unwrap_or_else(|| "agent_completed".to_string())
        });

        let directives = TurnDirectives {
            next_agent,
            escalate: outcome.escalate,
            end_session: outcome.end_session,
            end_reason,
        };
        (outcome, directives)
    }
}
