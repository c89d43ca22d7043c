pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod policy;
pub mod routing;

pub use audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use domain::agent::{AgentKind, AgentOutcome};
pub use domain::compliance::{ComplianceEvent, ComplianceEventType, ComplianceState};
pub use domain::metrics::DailyMetric;
pub use domain::session::{Channel, Session, SessionId, SessionStatus};
pub use domain::turn::{NewTurn, TurnRecord, TurnRole};
pub use errors::{DomainError, EngineError, InterfaceError};
pub use policy::{CompliancePolicy, TurnDirectives};
pub use routing::{IntentRouter, IntentSignature, RouteDecision, RoutingPolicy};

pub use chrono;
