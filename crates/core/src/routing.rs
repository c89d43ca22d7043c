use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentKind;
use crate::domain::session::Session;

/// Keyword signature for one agent. Every phrase found in the normalized
/// turn text adds `weight` points to that agent's score.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSignature {
    pub agent: AgentKind,
    pub phrases: Vec<String>,
    pub weight: u8,
}

impl IntentSignature {
    pub fn new(agent: AgentKind, phrases: &[&str], weight: u8) -> Self {
        Self { agent, phrases: phrases.iter().map(|phrase| (*phrase).to_string()).collect(), weight }
    }
}

/// Immutable routing configuration, built at startup and passed explicitly
/// into the router so tests can substitute alternate tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    pub signatures: Vec<IntentSignature>,
    pub min_confidence: u8,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        // Signature order is the fixed tie-break order when the current agent
        // is not among the top scorers: safety-relevant intents first.
        Self {
            signatures: vec![
                IntentSignature::new(
                    AgentKind::FraudDetection,
                    &[
                        "fraud",
                        "stole",
                        "stolen",
                        "unauthorized",
                        "suspicious",
                        "lost my card",
                        "didn't make",
                        "did not make",
                        "someone used",
                    ],
                    35,
                ),
                IntentSignature::new(
                    AgentKind::Collections,
                    &[
                        "payment",
                        "pay my",
                        "owe",
                        "debt",
                        "loan",
                        "past due",
                        "installment",
                        "hardship",
                    ],
                    35,
                ),
                IntentSignature::new(
                    AgentKind::Compliance,
                    &["complaint", "privacy", "my data", "kyc", "regulator", "cfpb", "dispute"],
                    35,
                ),
                IntentSignature::new(
                    AgentKind::Onboarding,
                    &["open an account", "new account", "sign up", "become a customer", "enroll"],
                    35,
                ),
                IntentSignature::new(
                    AgentKind::Sales,
                    &[
                        "new credit card",
                        "credit card offer",
                        "interest rate",
                        "apy",
                        "savings account",
                        "auto loan rate",
                        "heloc",
                        "products",
                    ],
                    35,
                ),
                IntentSignature::new(
                    AgentKind::CustomerService,
                    &[
                        "balance",
                        "transaction",
                        "statement",
                        "branch hours",
                        "routing number",
                        "help",
                    ],
                    35,
                ),
            ],
            min_confidence: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDecision {
    pub agent: AgentKind,
    pub confidence: u8,
    /// True when the session state forced the target and the classifier was
    /// never consulted (escalated session or sticky current agent).
    pub pinned: bool,
}

#[derive(Clone, Debug, Default)]
pub struct IntentRouter {
    policy: RoutingPolicy,
}

impl IntentRouter {
    pub fn new(policy: RoutingPolicy) -> Self {
        Self { policy }
    }

    /// Resolve the target agent for one inbound turn. The sticky guard is an
    /// explicit state-machine check evaluated before any classification.
    pub fn classify(&self, turn_text: &str, session: &Session) -> RouteDecision {
        if session.escalated || session.current_agent.is_sticky() {
            return RouteDecision { agent: session.current_agent, confidence: 100, pinned: true };
        }

        let normalized_text = normalize(turn_text);
        let mut best: Option<(AgentKind, u16)> = None;

        for signature in &self.policy.signatures {
            let matches = signature
                .phrases
                .iter()
                .filter(|phrase| normalized_text.contains(phrase.as_str()))
                .count() as u16;
            if matches == 0 {
                continue;
            }
            let score = matches * u16::from(signature.weight);

            best = match best {
                None => Some((signature.agent, score)),
                Some((_, top)) if score > top => Some((signature.agent, score)),
                // Ties prefer session continuity over agent churn.
                Some((_, top)) if score == top && signature.agent == session.current_agent => {
                    Some((signature.agent, score))
                }
                other => other,
            };
        }

        match best {
            Some((agent, score)) => {
                let confidence = score.min(100) as u8;
                if confidence < self.policy.min_confidence {
                    RouteDecision {
                        agent: AgentKind::CustomerService,
                        confidence,
                        pinned: false,
                    }
                } else {
                    RouteDecision { agent, confidence, pinned: false }
                }
            }
            None => RouteDecision { agent: AgentKind::CustomerService, confidence: 0, pinned: false },
        }
    }
}

fn normalize(text: &str) -> String {
    text.to_ascii_lowercase()
}
