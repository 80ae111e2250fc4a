//! Tracing backends that receive closed segments.

use std::fmt;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Mutex, PoisonError};

use super::segment::SegmentRecord;

/// Header line the trace daemon expects before every segment document.
pub const DAEMON_HEADER: &str = r#"{"format":"json","version":1}"#;

/// Receives every closed segment.
pub trait SegmentSink: Send + Sync + fmt::Debug {
    /// Hands a closed segment to the backend. Must not block.
    fn submit(&self, segment: SegmentRecord);
}

/// Emits each segment document as a structured `tracing` event on the
/// `trace_segments` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl SegmentSink for LogSink {
    fn submit(&self, segment: SegmentRecord) {
        match serde_json::to_string(&segment) {
            Ok(document) => tracing::info!(
                target: "trace_segments",
                trace_id = %segment.trace_id,
                segment = %segment.name,
                document = %document,
                "segment closed"
            ),
            Err(err) => tracing::warn!(
                target: "trace_segments",
                trace_id = %segment.trace_id,
                error = %err,
                "segment could not be serialized"
            ),
        }
    }
}

/// Sends segment documents over UDP to a trace daemon.
#[derive(Debug)]
pub struct DaemonSink {
    socket: UdpSocket,
    daemon: SocketAddr,
}

impl DaemonSink {
    /// Binds an ephemeral non-blocking socket for sending to `daemon`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the local socket cannot be bound.
    pub fn connect(daemon: SocketAddr) -> io::Result<Self> {
        let local = if daemon.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket, daemon })
    }

    /// Encodes a segment as a daemon datagram.
    ///
    /// # Errors
    ///
    /// Returns the serialization error if the segment cannot be encoded.
    pub fn encode(segment: &SegmentRecord) -> Result<String, serde_json::Error> {
        Ok(format!("{DAEMON_HEADER}\n{}", serde_json::to_string(segment)?))
    }
}

impl SegmentSink for DaemonSink {
    fn submit(&self, segment: SegmentRecord) {
        let datagram = match Self::encode(&segment) {
            Ok(datagram) => datagram,
            Err(err) => {
                tracing::warn!(trace_id = %segment.trace_id, error = %err, "segment could not be serialized");
                return;
            }
        };
        if let Err(err) = self.socket.send_to(datagram.as_bytes(), self.daemon) {
            tracing::warn!(
                daemon = %self.daemon,
                trace_id = %segment.trace_id,
                error = %err,
                "segment dropped"
            );
        }
    }
}

/// Keeps closed segments in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    segments: Mutex<Vec<SegmentRecord>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every segment received so far.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentRecord> {
        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the most recently received segment.
    #[must_use]
    pub fn last(&self) -> Option<SegmentRecord> {
        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl SegmentSink for MemorySink {
    fn submit(&self, segment: SegmentRecord) {
        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(segment);
    }
}
