pub mod behaviors;
pub mod llm;
pub mod prompts;
pub mod signals;

pub use behaviors::{AgentBehavior, AgentRegistry, TurnContext};
pub use llm::{generate_or_fallback, LlmClient, StaticReplyClient};
pub use signals::{analyze_sentiment, escalation_requested, Sentiment};
