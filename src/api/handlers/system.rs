//! Liveness endpoint.

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;

use crate::app_state::AppState;

/// `GET /` — Liveness check. Touches no connection.
#[utoipa::path(
    get,
    path = "/",
    tag = "System",
    summary = "Ping",
    description = "Returns `pong` without touching the database.",
    responses(
        (status = 200, description = "Service is alive", body = String),
    )
)]
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// System routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(ping))
}
