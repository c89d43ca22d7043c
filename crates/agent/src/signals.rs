//! Deterministic conversation signals checked before any model call.

/// Phrases that constitute a human-agent request. Honoring these immediately
/// is a CFPB requirement, so detection is rule-based, not model-based.
const ESCALATION_PHRASES: &[&str] = &[
    "human",
    "agent",
    "representative",
    "person",
    "supervisor",
    "manager",
    "real person",
    "talk to someone",
    "speak to someone",
    "transfer me",
    "operator",
    "live agent",
    "press 0",
    "press zero",
    "speak with",
    "talk with",
    "connect me",
];

const NEGATIVE_WORDS: &[&str] = &[
    "angry",
    "furious",
    "terrible",
    "ridiculous",
    "lawsuit",
    "attorney",
    "lawyer",
    "unacceptable",
    "incompetent",
    "useless",
    "disgusting",
    "scam",
    "stealing",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sentiment {
    Neutral,
    Negative,
    VeryNegative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::VeryNegative => "very_negative",
        }
    }
}

pub fn escalation_requested(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    ESCALATION_PHRASES.iter().any(|phrase| text.contains(phrase))
}

pub fn analyze_sentiment(text: &str) -> Sentiment {
    let text = text.to_ascii_lowercase();
    let count = NEGATIVE_WORDS.iter().filter(|word| text.contains(*word)).count();
    match count {
        0 => Sentiment::Neutral,
        1 => Sentiment::Negative,
        _ => Sentiment::VeryNegative,
    }
}
