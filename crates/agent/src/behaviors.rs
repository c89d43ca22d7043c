//! The closed set of specialist agent behaviors behind one capability
//! interface, selected through an explicit kind-to-implementation table.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use teller_core::domain::agent::{AgentKind, AgentOutcome};
use teller_core::domain::compliance::{ComplianceEventType, ComplianceState};
use teller_core::domain::session::Session;
use teller_core::domain::turn::{TurnRecord, TurnRole};

use crate::llm::{generate_or_fallback, LlmClient};
use crate::prompts;

/// Everything a behavior may see for one turn: the session snapshot, the
/// inbound text, the recent transcript, and what is already on the
/// compliance record.
pub struct TurnContext<'a> {
    pub session: &'a Session,
    pub caller_text: &'a str,
    pub history: &'a [TurnRecord],
    pub compliance: &'a ComplianceState,
}

impl TurnContext<'_> {
    fn normalized_text(&self) -> String {
        self.caller_text.to_ascii_lowercase()
    }

    fn caller_turn_count(&self) -> usize {
        self.history.iter().filter(|turn| turn.role == TurnRole::Caller).count()
    }
}

#[async_trait]
pub trait AgentBehavior: Send + Sync {
    fn kind(&self) -> AgentKind;
    async fn handle(&self, ctx: &TurnContext<'_>) -> AgentOutcome;
}

/// Explicit lookup table from agent kind to implementation.
pub struct AgentRegistry {
    agents: BTreeMap<AgentKind, Arc<dyn AgentBehavior>>,
}

impl AgentRegistry {
    pub fn new(llm: Arc<dyn LlmClient>, bank_name: impl Into<String>) -> Self {
        let bank_name = bank_name.into();
        let mut agents: BTreeMap<AgentKind, Arc<dyn AgentBehavior>> = BTreeMap::new();

        agents.insert(
            AgentKind::CustomerService,
            Arc::new(CustomerServiceBehavior { llm: llm.clone(), bank_name: bank_name.clone() }),
        );
        agents.insert(
            AgentKind::Collections,
            Arc::new(CollectionsBehavior { llm: llm.clone(), bank_name: bank_name.clone() }),
        );
        agents.insert(
            AgentKind::FraudDetection,
            Arc::new(FraudDetectionBehavior { llm: llm.clone(), bank_name: bank_name.clone() }),
        );
        agents.insert(
            AgentKind::Sales,
            Arc::new(SalesBehavior { llm: llm.clone(), bank_name: bank_name.clone() }),
        );
        agents.insert(
            AgentKind::Onboarding,
            Arc::new(OnboardingBehavior { llm: llm.clone(), bank_name: bank_name.clone() }),
        );
        agents.insert(AgentKind::Compliance, Arc::new(ComplianceBehavior { llm, bank_name }));

        Self { agents }
    }

    pub fn get(&self, kind: AgentKind) -> &dyn AgentBehavior {
        self.agents
            .get(&kind)
            .map(Arc::as_ref)
            .unwrap_or_else(|| unreachable!("registry is total over AgentKind"))
    }
}

async fn llm_reply(
    llm: &dyn LlmClient,
    kind: AgentKind,
    bank_name: &str,
    ctx: &TurnContext<'_>,
) -> String {
    let prompt = prompts::build_prompt(kind, bank_name, ctx.session, ctx.history, ctx.caller_text);
    generate_or_fallback(llm, &prompt, prompts::fallback_reply(kind)).await
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase))
}

struct CustomerServiceBehavior {
    llm: Arc<dyn LlmClient>,
    bank_name: String,
}

#[async_trait]
impl AgentBehavior for CustomerServiceBehavior {
    fn kind(&self) -> AgentKind {
        AgentKind::CustomerService
    }

    async fn handle(&self, ctx: &TurnContext<'_>) -> AgentOutcome {
        let text =
            llm_reply(self.llm.as_ref(), self.kind(), &self.bank_name, ctx).await;
        AgentOutcome::reply(text)
    }
}

const CEASE_PHRASES: &[&str] =
    &["stop calling", "cease", "do not contact", "don't contact", "stop contacting"];

const DISPUTE_PHRASES: &[&str] =
    &["i dispute", "not my debt", "wrong amount", "don't owe", "do not owe"];

struct CollectionsBehavior {
    llm: Arc<dyn LlmClient>,
    bank_name: String,
}

#[async_trait]
impl AgentBehavior for CollectionsBehavior {
    fn kind(&self) -> AgentKind {
        AgentKind::Collections
    }

    async fn handle(&self, ctx: &TurnContext<'_>) -> AgentOutcome {
        let text = ctx.normalized_text();
        let cease = contains_any(&text, CEASE_PHRASES);
        let dispute = contains_any(&text, DISPUTE_PHRASES);

        // FDCPA rights invocation: acknowledge, suppress all collection
        // language, and hand the session to the compliance desk.
        if cease || dispute {
            let reply = if dispute {
                "I understand you're disputing this debt. I've noted your dispute and I'm \
                 routing you to a specialist who can provide written debt validation."
            } else {
                "We will honor your request to cease communication. A written notice will \
                 be sent to confirm."
            };

            let mut outcome =
                AgentOutcome::reply(reply).with_override(AgentKind::Compliance);
            if cease {
                outcome = outcome
                    .with_trigger(ComplianceEventType::CeaseAndDesist)
                    .with_metadata("compliance_action", "cease_and_desist");
            }
            if dispute {
                outcome = outcome.with_trigger(ComplianceEventType::DebtDispute);
            }
            return outcome;
        }

        let generated =
            llm_reply(self.llm.as_ref(), self.kind(), &self.bank_name, ctx).await;

        // First collections contact in this session: the Mini-Miranda must
        // lead the reply and go on the compliance record.
        if !ctx.compliance.mini_miranda_given() {
            let disclosure = prompts::mini_miranda(&self.bank_name);
            return AgentOutcome::reply(format!("{disclosure} {generated}"))
                .with_trigger(ComplianceEventType::MiniMiranda)
                .with_metadata("disclosure", "mini_miranda");
        }

        AgentOutcome::reply(generated)
    }
}

const CARD_BLOCK_PHRASES: &[&str] = &[
    "block my card",
    "cancel my card",
    "lost my card",
    "card lost",
    "stolen card",
    "card stolen",
    "stole my card",
    "card is stolen",
];

const ACTIVE_FRAUD_PHRASES: &[&str] = &[
    "unauthorized",
    "didn't make",
    "did not make",
    "didn't authorize",
    "fraud charge",
    "fraudulent",
    "someone used",
];

struct FraudDetectionBehavior {
    llm: Arc<dyn LlmClient>,
    bank_name: String,
}

#[async_trait]
impl AgentBehavior for FraudDetectionBehavior {
    fn kind(&self) -> AgentKind {
        AgentKind::FraudDetection
    }

    async fn handle(&self, ctx: &TurnContext<'_>) -> AgentOutcome {
        let text = ctx.normalized_text();

        if contains_any(&text, CARD_BLOCK_PHRASES) {
            return AgentOutcome::reply(
                "I'm blocking your card immediately for your protection. A replacement will \
                 arrive in 5 to 7 business days, and our fraud team will confirm the hold \
                 with you shortly.",
            )
            .escalating()
            .with_trigger(ComplianceEventType::FraudHold)
            .with_metadata("action", "card_block");
        }

        if contains_any(&text, ACTIVE_FRAUD_PHRASES) {
            return AgentOutcome::reply(
                "I understand there are charges you didn't make. I'm placing a hold on your \
                 account and connecting you with our fraud specialist, who can reverse \
                 charges and secure your account.",
            )
            .escalating()
            .with_trigger(ComplianceEventType::FraudHold)
            .with_metadata("fraud_type", "unauthorized_charges");
        }

        let text = llm_reply(self.llm.as_ref(), self.kind(), &self.bank_name, ctx).await;
        AgentOutcome::reply(text)
    }
}

const OPT_OUT_PHRASES: &[&str] =
    &["not interested", "remove me", "stop calling", "opt out", "don't call"];

struct SalesBehavior {
    llm: Arc<dyn LlmClient>,
    bank_name: String,
}

#[async_trait]
impl AgentBehavior for SalesBehavior {
    fn kind(&self) -> AgentKind {
        AgentKind::Sales
    }

    async fn handle(&self, ctx: &TurnContext<'_>) -> AgentOutcome {
        let text = ctx.normalized_text();

        // TCPA opt-out beats everything, including the consent check, so a
        // revocation is always captured.
        if contains_any(&text, OPT_OUT_PHRASES) {
            return AgentOutcome::reply(
                "Absolutely, I've removed you from our outreach list. Is there anything \
                 else I can help you with today?",
            )
            .with_trigger(ComplianceEventType::SalesOptOut)
            .with_override(AgentKind::CustomerService)
            .with_metadata("action", "tcpa_opt_out");
        }

        // No prior express consent on file: refuse solicitation content and
        // route back to customer service.
        if !ctx.session.marketing_consent {
            return AgentOutcome::reply(
                "I'm not able to share product offers on this call, but our customer \
                 service team can help with anything about your existing accounts.",
            )
            .with_override(AgentKind::CustomerService)
            .with_metadata("reason", "no_marketing_consent");
        }

        let text = llm_reply(self.llm.as_ref(), self.kind(), &self.bank_name, ctx).await;
        AgentOutcome::reply(text)
    }
}

/// Caller turns before onboarding hands off to a human banker for KYC.
const ONBOARDING_HANDOFF_TURNS: usize = 6;

struct OnboardingBehavior {
    llm: Arc<dyn LlmClient>,
    bank_name: String,
}

#[async_trait]
impl AgentBehavior for OnboardingBehavior {
    fn kind(&self) -> AgentKind {
        AgentKind::Onboarding
    }

    async fn handle(&self, ctx: &TurnContext<'_>) -> AgentOutcome {
        if ctx.caller_turn_count() >= ONBOARDING_HANDOFF_TURNS {
            return AgentOutcome::reply(
                "Great, I have your preliminary information. I'm transferring you to a \
                 banker who will complete your application and get your account opened.",
            )
            .escalating()
            .with_metadata("reason", "kyc_handoff");
        }

        let text = llm_reply(self.llm.as_ref(), self.kind(), &self.bank_name, ctx).await;
        AgentOutcome::reply(text)
    }
}

const CLOSING_PHRASES: &[&str] = &["that's all", "that is all", "nothing else", "goodbye"];

struct ComplianceBehavior {
    llm: Arc<dyn LlmClient>,
    bank_name: String,
}

#[async_trait]
impl AgentBehavior for ComplianceBehavior {
    fn kind(&self) -> AgentKind {
        AgentKind::Compliance
    }

    async fn handle(&self, ctx: &TurnContext<'_>) -> AgentOutcome {
        let text = ctx.normalized_text();

        // Terminal routing desk: it may close the session once the caller is
        // done, but it never escalates (it is the escalation target).
        if contains_any(&text, CLOSING_PHRASES) {
            return AgentOutcome::reply(format!(
                "Your case is on file under reference {}. Our compliance team will follow \
                 up in writing. Thank you for your patience.",
                ctx.session.id
            ))
            .ending()
            .with_metadata("end_reason", "complaint_filed");
        }

        let generated =
            llm_reply(self.llm.as_ref(), self.kind(), &self.bank_name, ctx).await;
        AgentOutcome::reply(generated).with_metadata("reference", ctx.session.id.0.clone())
    }
}
