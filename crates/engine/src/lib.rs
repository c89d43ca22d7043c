pub mod compliance;
pub mod metrics;
pub mod orchestrator;
pub mod recovery;
pub mod sessions;
pub mod transcript;

pub use compliance::ComplianceEmitter;
pub use metrics::MetricsAggregator;
pub use orchestrator::{EndSessionRequest, Orchestrator, TurnRequest, TurnReply};
pub use recovery::{ReconcileReport, Reconciler};
pub use sessions::{OpenSession, SessionGuard, SessionManager};
pub use transcript::ConversationLogger;
