use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::routes::AppState;

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database_ok = sqlx::query("SELECT 1").fetch_one(&state.db_pool).await.is_ok();
    let status = if database_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(serde_json::json!({
            "status": if database_ok { "ok" } else { "degraded" },
            "service": "teller-server",
            "checks": { "database": database_ok },
        })),
    )
}
