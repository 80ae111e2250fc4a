//! Post handlers: create, get, delete.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};

use crate::api::dto::{CreatePostRequest, PostDto};
use crate::api::extract::PostId;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, ServiceError};
use crate::persistence::statements;
use crate::telemetry::TraceSegment;

/// `POST /posts` — Create a post.
///
/// The body is read raw so that an empty body, malformed JSON and blank
/// fields each get their own error.
///
/// # Errors
///
/// Returns [`ServiceError`] on an empty or malformed body, a blank field,
/// or a storage failure.
#[utoipa::path(
    post,
    path = "/posts",
    tag = "Posts",
    summary = "Create a post",
    description = "Inserts a post. The generated id is returned in the `Location` header.",
    request_body = CreatePostRequest,
    responses(
        (status = 200, description = "Post created", body = String,
            headers(("location" = String, description = "Path of the new post"))),
        (status = 400, description = "Empty body, malformed body, blank or oversized field, or chaos", body = ErrorResponse),
        (status = 409, description = "Table does not exist", body = ErrorResponse),
        (status = 503, description = "Database unavailable", body = ErrorResponse),
    )
)]
pub async fn create_post(
    State(state): State<AppState>,
    Extension(segment): Extension<TraceSegment>,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let new_post = CreatePostRequest::from_body(&body)?.validate()?;
    segment.put_annotation("username", new_post.username.as_str());

    let mut sub = segment.subsegment("create post");
    let result = state.store.insert_post(&new_post).await;
    sub.put_metadata("sql", statements::INSERT_POST);
    let id = sub.finish(result)?;

    segment.put_annotation("post_id", id);
    tracing::info!(post_id = id, username = %new_post.username, "post created");
    Ok((
        StatusCode::OK,
        [(header::LOCATION, format!("/posts/{id}"))],
        "ok",
    ))
}

/// `GET /posts/{pid}` — Fetch the rows with the given id.
///
/// # Errors
///
/// Returns [`ServiceError`] on storage failure. An unknown id is not an
/// error; it yields an empty array.
#[utoipa::path(
    get,
    path = "/posts/{pid}",
    tag = "Posts",
    summary = "Get a post",
    params(
        ("pid" = i32, Path, description = "Post id"),
    ),
    responses(
        (status = 200, description = "Matching rows, possibly none", body = Vec<PostDto>),
        (status = 400, description = "Non-integer id or chaos", body = ErrorResponse),
        (status = 409, description = "Table does not exist", body = ErrorResponse),
        (status = 503, description = "Database unavailable", body = ErrorResponse),
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Extension(segment): Extension<TraceSegment>,
    PostId(pid): PostId,
) -> Result<impl IntoResponse, ServiceError> {
    segment.put_annotation("post_id", pid);

    let mut sub = segment.subsegment("get post");
    let result = state.store.find_posts(pid).await;
    sub.put_metadata("sql", statements::SELECT_POSTS);
    let posts = sub.finish(result)?;

    let rows: Vec<PostDto> = posts.into_iter().map(PostDto::from).collect();
    Ok(Json(rows))
}

/// `DELETE /posts/{pid}` — Delete the rows with the given id.
///
/// Succeeds whether or not a row matched.
///
/// # Errors
///
/// Returns [`ServiceError`] on storage failure.
#[utoipa::path(
    delete,
    path = "/posts/{pid}",
    tag = "Posts",
    summary = "Delete a post",
    params(
        ("pid" = i32, Path, description = "Post id"),
    ),
    responses(
        (status = 200, description = "Deleted, or nothing to delete", body = String),
        (status = 400, description = "Non-integer id or chaos", body = ErrorResponse),
        (status = 409, description = "Table does not exist", body = ErrorResponse),
        (status = 503, description = "Database unavailable", body = ErrorResponse),
    )
)]
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(segment): Extension<TraceSegment>,
    PostId(pid): PostId,
) -> Result<impl IntoResponse, ServiceError> {
    segment.put_annotation("post_id", pid);

    let mut sub = segment.subsegment("delete post");
    let result = state.store.delete_posts(pid).await;
    sub.put_metadata("sql", statements::DELETE_POSTS);
    let deleted = sub.finish(result)?;

    tracing::debug!(post_id = pid, deleted, "delete executed");
    Ok((StatusCode::OK, "ok"))
}

/// Post routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/{pid}", get(get_post).delete(delete_post))
}
