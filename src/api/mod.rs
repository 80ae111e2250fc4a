//! REST API layer: route handlers, DTOs, OpenAPI document and router
//! composition.

pub mod dto;
pub mod extract;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::middleware::{inject_faults, trace_segments};

/// OpenAPI document for every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "chaos-posts",
        description = "Posts CRUD service with trace segments and fault injection"
    ),
    paths(
        handlers::system::ping,
        handlers::init::create_table,
        handlers::init::drop_table,
        handlers::posts::create_post,
        handlers::posts::get_post,
        handlers::posts::delete_post,
    ),
    components(schemas(
        dto::CreatePostRequest,
        dto::PostDto,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "System", description = "Liveness"),
        (name = "Schema", description = "Create and drop the posts table"),
        (name = "Posts", description = "Post CRUD"),
    )
)]
pub struct ApiDoc;

/// Builds the complete router.
///
/// Fault injection is a route layer: it runs only for matched routes and
/// before their handlers. Trace segments wrap everything, including
/// unmatched paths and chaos rejections.
pub fn build_router(state: AppState) -> Router {
    let api = handlers::routes().route_layer(from_fn_with_state(
        Arc::clone(&state.fault_injector),
        inject_faults,
    ));

    #[cfg(feature = "swagger-ui")]
    let api = api.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    api.layer(from_fn_with_state(state.tracer.clone(), trace_segments))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/", "/init", "/posts", "/posts/{pid}"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
