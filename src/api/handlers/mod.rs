//! REST endpoint handlers organized by resource.

pub mod init;
pub mod posts;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes every resource route.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(system::routes())
        .merge(init::routes())
        .merge(posts::routes())
}
