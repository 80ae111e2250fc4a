//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::middleware::FaultInjector;
use crate::persistence::PostStore;
use crate::telemetry::Tracer;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Storage for the `posts` table.
    pub store: Arc<dyn PostStore>,
    /// Opens and submits request segments.
    pub tracer: Tracer,
    /// Chaos decisions for the route layer.
    pub fault_injector: Arc<FaultInjector>,
}
