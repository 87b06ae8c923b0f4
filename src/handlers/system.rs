use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{AppState, models::MessageOnly};

/// HealthOut
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthOut {
    #[schema(example = "ok")]
    pub status: &'static str,
}

/// root
///
/// [Public Route] Welcome banner.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Welcome message", body = MessageOnly)),
    tag = "system"
)]
pub async fn root() -> Json<MessageOnly> {
    Json(MessageOnly::new("Welcome to HOURZ API"))
}

/// health
///
/// [Public Route] Liveness check that also pings the database.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Healthy", body = HealthOut),
        (status = 503, description = "Database unreachable", body = HealthOut)
    ),
    tag = "system"
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthOut>) {
    match state.repo.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthOut { status: "ok" })),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthOut { status: "unhealthy" }),
            )
        }
    }
}
