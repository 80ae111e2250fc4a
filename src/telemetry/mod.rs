//! Request tracing: segments, sub-segments and the backends receiving them.
//!
//! [`Tracer`] opens one [`TraceSegment`] per request and submits it to a
//! [`SegmentSink`] once the response is ready. Logging setup for the
//! process lives here as well.

pub mod segment;
pub mod sink;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

pub use segment::{SegmentRecord, Subsegment, SubsegmentRecord, TraceSegment};
pub use sink::{DaemonSink, LogSink, MemorySink, SegmentSink};

use crate::config::LogFormat;

/// Opens request segments and forwards closed ones to a sink.
#[derive(Debug, Clone)]
pub struct Tracer {
    service_name: Arc<str>,
    sink: Arc<dyn SegmentSink>,
}

impl Tracer {
    /// Creates a tracer reporting to `sink`.
    #[must_use]
    pub fn new(service_name: &str, sink: Arc<dyn SegmentSink>) -> Self {
        Self {
            service_name: Arc::from(service_name),
            sink,
        }
    }

    /// Service name used for the root path segment.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Opens the segment for a request to `path`.
    ///
    /// The segment is named after the path without its leading `/`; the
    /// root path takes the service name instead.
    #[must_use]
    pub fn begin_segment(&self, path: &str) -> TraceSegment {
        let name = path.strip_prefix('/').unwrap_or(path);
        if name.is_empty() {
            TraceSegment::begin(self.service_name.as_ref())
        } else {
            TraceSegment::begin(name)
        }
    }

    /// Closes `segment` and submits it to the sink.
    pub fn end_segment(&self, segment: &TraceSegment) {
        self.sink.submit(segment.close());
    }
}

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling this
/// twice leaves the first subscriber in place.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
