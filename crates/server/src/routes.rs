use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use teller_core::domain::session::{Channel, SessionId, SessionStatus};
use teller_core::domain::turn::TurnRole;
use teller_core::errors::InterfaceError;
use teller_engine::{EndSessionRequest, Orchestrator, TurnRequest};

use crate::health;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub db_pool: teller_db::DbPool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/turns", post(process_turn))
        .route("/v1/sessions/{session_id}/end", post(end_session))
        .route("/health", axum::routing::get(health::health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct TurnBody {
    session_id: String,
    channel: Channel,
    caller_id: String,
    bank_id: String,
    #[serde(default = "default_role")]
    role: TurnRole,
    content: String,
    #[serde(default)]
    marketing_consent: bool,
}

fn default_role() -> TurnRole {
    TurnRole::Caller
}

#[derive(Debug, Serialize)]
struct TurnResponse {
    reply_text: String,
    session_status: SessionStatus,
    escalated: bool,
}

#[derive(Debug, Deserialize)]
struct EndBody {
    #[serde(default = "default_end_reason")]
    reason: String,
}

fn default_end_reason() -> String {
    "caller_hangup".to_string()
}

struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ServiceDegraded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::warn!(
            event_name = "api.request_failed",
            correlation_id = self.0.correlation_id(),
            error = %self.0,
            "request failed"
        );

        let body = serde_json::json!({
            "error": self.0.user_message(),
            "correlation_id": self.0.correlation_id(),
        });
        (status, Json(body)).into_response()
    }
}

async fn process_turn(
    State(state): State<AppState>,
    Json(body): Json<TurnBody>,
) -> Result<Json<TurnResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    // Only caller turns enter the engine; agent turns are written by the
    // conversation logger itself.
    if body.role != TurnRole::Caller {
        return Err(ApiError(InterfaceError::BadRequest {
            message: "only caller turns can be submitted".to_string(),
            correlation_id,
        }));
    }

    let reply = state
        .orchestrator
        .process_turn(TurnRequest {
            session_id: SessionId(body.session_id),
            channel: body.channel,
            caller_id: body.caller_id,
            bank_id: body.bank_id,
            content: body.content,
            marketing_consent: body.marketing_consent,
        })
        .await
        .map_err(|error| ApiError(error.into_interface(correlation_id)))?;

    Ok(Json(TurnResponse {
        reply_text: reply.reply_text,
        session_status: reply.session_status,
        escalated: reply.escalated,
    }))
}

async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<EndBody>,
) -> Result<StatusCode, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    state
        .orchestrator
        .end_session(EndSessionRequest { session_id: SessionId(session_id), reason: body.reason })
        .await
        .map_err(|error| ApiError(error.into_interface(correlation_id)))?;

    Ok(StatusCode::NO_CONTENT)
}
