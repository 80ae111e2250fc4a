//! Tracing middleware: one trace segment per request.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Instrument, info_span};

use crate::telemetry::Tracer;

/// Response header carrying the request's trace id.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Wraps the request in a trace segment.
///
/// Opens the segment before anything else runs, records method and URL,
/// and hands a clone to handlers through the request extensions. Once the
/// response exists the status code is recorded, the segment is closed and
/// submitted, and the trace id is echoed in [`TRACE_ID_HEADER`].
pub async fn trace_segments(State(tracer): State<Tracer>, mut req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let url = req.uri().to_string();
    let segment = tracer.begin_segment(req.uri().path());
    segment.put_http_request(method.as_str(), &url);
    req.extensions_mut().insert(segment.clone());

    let span = info_span!(
        "segment",
        trace_id = %segment.trace_id(),
        segment = %segment.name(),
        method = %method,
        url = %url,
    );
    let mut response = next.run(req).instrument(span).await;

    segment.put_http_status(response.status().as_u16());
    if let Ok(value) = HeaderValue::from_str(segment.trace_id()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    tracer.end_segment(&segment);
    response
}
