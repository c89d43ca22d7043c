//! Prompt assembly and required disclosure texts.

use teller_core::domain::agent::AgentKind;
use teller_core::domain::session::Session;
use teller_core::domain::turn::{TurnRecord, TurnRole};

/// FDCPA first-contact disclosure delivered by the collections agent.
pub fn mini_miranda(bank_name: &str) -> String {
    format!(
        "This is an attempt to collect a debt. Any information obtained will be used for that \
         purpose. This communication is from {bank_name}, a debt collector."
    )
}

/// Canned safe reply used when generation fails twice; one per specialty so
/// the degraded path still sounds like the agent the caller reached.
pub fn fallback_reply(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::CustomerService | AgentKind::Onboarding => {
            "I'm sorry, I'm having trouble with that request right now. \
             Is there anything else I can help you with?"
        }
        AgentKind::Collections => {
            "I'm having a technical issue. A specialist will follow up with you \
             within one business day."
        }
        AgentKind::FraudDetection => {
            "I'm having trouble completing that, but your report has been noted. \
             Our fraud team will review your account."
        }
        AgentKind::Sales => {
            "I'm sorry, I can't pull up our product details right now. \
             Is there anything else I can help you with?"
        }
        AgentKind::Compliance => {
            "Your concern has been recorded and our compliance team will follow up. \
             Is there anything else?"
        }
    }
}

fn system_prompt(kind: AgentKind, bank_name: &str) -> String {
    let instructions = match kind {
        AgentKind::CustomerService => {
            "You are a professional customer service representative for a US community bank. \
             Be warm, concise, and professional. Never disclose account details to an \
             unverified caller. Keep replies under 60 words; they are read aloud."
        }
        AgentKind::Collections => {
            "You are a compliant debt collection assistant. Never threaten illegal actions, \
             never discuss the debt with third parties, and offer payment options: full \
             payment, payment plan, or hardship program. Keep replies under 60 words."
        }
        AgentKind::FraudDetection => {
            "You are a fraud prevention specialist. Treat every report as urgent, never ask \
             for full card numbers or PINs, and be calm and reassuring. Keep replies under \
             60 words."
        }
        AgentKind::Sales => {
            "You are a consultative banking sales assistant. Be helpful, never pushy, and \
             focus on one product at a time. Keep replies under 60 words."
        }
        AgentKind::Onboarding => {
            "You are an account onboarding specialist. Collect name, address, date of birth, \
             and last four of SSN only, then hand off to a banker. Keep replies under 60 words."
        }
        AgentKind::Compliance => {
            "You are a compliance specialist. Handle complaints with empathy, document \
             everything, and always provide the session id as a reference number. Keep \
             replies under 60 words."
        }
    };

    format!("{instructions}\nBANK: {bank_name}")
}

/// Flatten system instructions, recent transcript, and the inbound turn into
/// one completion prompt.
pub fn build_prompt(
    kind: AgentKind,
    bank_name: &str,
    session: &Session,
    history: &[TurnRecord],
    caller_text: &str,
) -> String {
    let mut prompt = system_prompt(kind, bank_name);
    prompt.push_str(&format!("\nSESSION: {} ({})\n", session.id, session.channel.as_str()));

    for turn in history {
        let speaker = match turn.role {
            TurnRole::Caller => "Caller",
            TurnRole::Agent => "Agent",
        };
        prompt.push_str(&format!("{speaker}: {}\n", turn.content));
    }

    prompt.push_str(&format!("Caller: {caller_text}\nAgent:"));
    prompt
}
