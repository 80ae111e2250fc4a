//! Schema endpoints: create and drop the `posts` table.
//!
//! Neither is idempotent. These paths are exempt from fault injection.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Extension, Router};

use crate::app_state::AppState;
use crate::error::{ErrorResponse, ServiceError};
use crate::persistence::statements;
use crate::telemetry::TraceSegment;

/// `POST /init` — Create the `posts` table.
///
/// # Errors
///
/// Returns [`ServiceError::SchemaConflict`] if the table already exists,
/// or an infrastructure error if the database is unavailable.
#[utoipa::path(
    post,
    path = "/init",
    tag = "Schema",
    summary = "Create the posts table",
    responses(
        (status = 200, description = "Table created", body = String),
        (status = 409, description = "Table already exists", body = ErrorResponse),
        (status = 503, description = "Database unavailable", body = ErrorResponse),
    )
)]
pub async fn create_table(
    State(state): State<AppState>,
    Extension(segment): Extension<TraceSegment>,
) -> Result<impl IntoResponse, ServiceError> {
    let mut sub = segment.subsegment("create table");
    let result = state.store.create_table().await;
    sub.put_metadata("sql", statements::CREATE_TABLE);
    sub.finish(result)?;

    tracing::info!("posts table created");
    Ok((StatusCode::OK, "ok"))
}

/// `DELETE /init` — Drop the `posts` table.
///
/// # Errors
///
/// Returns [`ServiceError::SchemaConflict`] if there is no table, or an
/// infrastructure error if the database is unavailable.
#[utoipa::path(
    delete,
    path = "/init",
    tag = "Schema",
    summary = "Drop the posts table",
    responses(
        (status = 200, description = "Table dropped", body = String),
        (status = 409, description = "Table does not exist", body = ErrorResponse),
        (status = 503, description = "Database unavailable", body = ErrorResponse),
    )
)]
pub async fn drop_table(
    State(state): State<AppState>,
    Extension(segment): Extension<TraceSegment>,
) -> Result<impl IntoResponse, ServiceError> {
    let mut sub = segment.subsegment("drop table");
    let result = state.store.drop_table().await;
    sub.put_metadata("sql", statements::DROP_TABLE);
    sub.finish(result)?;

    tracing::info!("posts table dropped");
    Ok((StatusCode::OK, "ok"))
}

/// Schema routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/init", post(create_table).delete(drop_table))
}
