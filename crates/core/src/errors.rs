use thiserror::Error;

use crate::domain::session::{SessionId, SessionStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidSessionTransition { from: SessionStatus, to: SessionStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures the orchestration engine can surface for one turn. Everything is
/// message-carrying rather than source-carrying so turn outcomes stay
/// cloneable for audit and retry bookkeeping.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown session `{0}`")]
    UnknownSession(SessionId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("compliance write failure: {0}")]
    ComplianceWriteFailure(String),
    #[error("language generation failure: {0}")]
    GenerationFailure(String),
    #[error("storage failure: {0}")]
    StorageFailure(String),
    #[error("turn processing exceeded the {0}s deadline")]
    DeadlineExceeded(u64),
}

impl EngineError {
    pub fn storage(source: impl std::fmt::Display) -> Self {
        Self::StorageFailure(source.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service degraded: {message}")]
    ServiceDegraded { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Caller-facing text. Internal error detail never crosses the boundary;
    /// a fatal turn abort reads as a generic apology with a retry hint.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "We couldn't process that request. Please check the details and try again."
            }
            Self::ServiceDegraded { .. } => {
                "I'm sorry, we're having trouble continuing this conversation right now. \
                 Please try again in a moment."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceDegraded { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl EngineError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::UnknownSession(id) => InterfaceError::BadRequest {
                message: format!("unknown session `{id}`"),
                correlation_id,
            },
            Self::Domain(error) => {
                InterfaceError::BadRequest { message: error.to_string(), correlation_id }
            }
            Self::ComplianceWriteFailure(message)
            | Self::GenerationFailure(message)
            | Self::StorageFailure(message) => {
                InterfaceError::ServiceDegraded { message, correlation_id }
            }
            Self::DeadlineExceeded(secs) => InterfaceError::ServiceDegraded {
                message: format!("turn abandoned after {secs}s"),
                correlation_id,
            },
        }
    }
}
