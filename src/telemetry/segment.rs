//! Trace segments and sub-segments.
//!
//! A [`TraceSegment`] covers one inbound request. It is a cheap, cloneable
//! handle: the tracing middleware keeps one clone and puts another into the
//! request extensions for handlers. Handlers open a [`Subsegment`] around
//! each unit of work; the sub-segment is closed and attached to its parent
//! when the guard drops, so error paths close it too.
//!
//! Closing a segment yields a [`SegmentRecord`], the document submitted to
//! the tracing backend.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Free-form metadata, grouped under the `default` namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    /// Metadata in the default namespace.
    pub default: BTreeMap<String, Value>,
}

impl Metadata {
    /// Returns `true` when no metadata was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default.is_empty()
    }
}

/// HTTP request fields of a segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpRequestRecord {
    /// Request method.
    pub method: String,
    /// Request URL.
    pub url: String,
}

/// HTTP response fields of a segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponseRecord {
    /// Numeric response status.
    pub status: u16,
}

/// HTTP section of a segment document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpRecord {
    /// Request side.
    pub request: HttpRequestRecord,
    /// Response side, absent if the request never completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<HttpResponseRecord>,
}

/// A closed sub-segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsegmentRecord {
    /// Unit-of-work name, e.g. `create post`.
    pub name: String,
    /// 16 hex character identifier.
    pub id: String,
    /// Start time.
    #[serde(serialize_with = "epoch_seconds")]
    pub start_time: DateTime<Utc>,
    /// End time.
    #[serde(serialize_with = "epoch_seconds")]
    pub end_time: DateTime<Utc>,
    /// Set when the unit of work failed.
    #[serde(skip_serializing_if = "is_false")]
    pub error: bool,
    /// Indexed key/values.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Value>,
    /// Free-form metadata.
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// A closed segment, as submitted to the tracing backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRecord {
    /// Segment name, derived from the request path.
    pub name: String,
    /// 16 hex character identifier.
    pub id: String,
    /// Trace identifier, `1-<epoch hex>-<24 hex>`.
    pub trace_id: String,
    /// Start time.
    #[serde(serialize_with = "epoch_seconds")]
    pub start_time: DateTime<Utc>,
    /// End time.
    #[serde(serialize_with = "epoch_seconds")]
    pub end_time: DateTime<Utc>,
    /// HTTP request and response fields.
    pub http: HttpRecord,
    /// Set for 4xx responses.
    #[serde(skip_serializing_if = "is_false")]
    pub error: bool,
    /// Set for 5xx responses.
    #[serde(skip_serializing_if = "is_false")]
    pub fault: bool,
    /// Indexed key/values.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Value>,
    /// Free-form metadata.
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    /// Closed sub-segments in closing order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subsegments: Vec<SubsegmentRecord>,
}

impl SegmentRecord {
    /// Finds the first sub-segment named `name`.
    #[must_use]
    pub fn subsegment(&self, name: &str) -> Option<&SubsegmentRecord> {
        self.subsegments.iter().find(|s| s.name == name)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

#[allow(clippy::cast_precision_loss)]
fn epoch_seconds<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(time.timestamp_micros() as f64 / 1_000_000.0)
}

fn new_entity_id() -> String {
    format!("{:016x}", uuid::Uuid::new_v4().as_u128() & u128::from(u64::MAX))
}

fn new_trace_id(now: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().as_u128() >> 32;
    format!("1-{:08x}-{random:024x}", now.timestamp())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct SegmentState {
    http: HttpRecord,
    annotations: BTreeMap<String, Value>,
    metadata: Metadata,
    subsegments: Vec<SubsegmentRecord>,
}

#[derive(Debug)]
struct SegmentInner {
    id: String,
    trace_id: String,
    name: String,
    started_at: DateTime<Utc>,
    state: Mutex<SegmentState>,
}

/// Handle to the trace segment of one request.
#[derive(Clone)]
pub struct TraceSegment {
    inner: Arc<SegmentInner>,
}

impl fmt::Debug for TraceSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceSegment")
            .field("name", &self.inner.name)
            .field("trace_id", &self.inner.trace_id)
            .finish_non_exhaustive()
    }
}

impl TraceSegment {
    /// Opens a segment named `name`.
    #[must_use]
    pub fn begin(name: impl Into<String>) -> Self {
        let started_at = Utc::now();
        Self {
            inner: Arc::new(SegmentInner {
                id: new_entity_id(),
                trace_id: new_trace_id(started_at),
                name: name.into(),
                started_at,
                state: Mutex::new(SegmentState::default()),
            }),
        }
    }

    /// Segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Trace identifier.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.inner.trace_id
    }

    /// Segment identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Records the request method and URL.
    pub fn put_http_request(&self, method: &str, url: &str) {
        lock(&self.inner.state).http.request = HttpRequestRecord {
            method: method.to_string(),
            url: url.to_string(),
        };
    }

    /// Records the response status code.
    pub fn put_http_status(&self, status: u16) {
        lock(&self.inner.state).http.response = Some(HttpResponseRecord { status });
    }

    /// Adds an indexed annotation. A repeated key overwrites.
    pub fn put_annotation(&self, key: &str, value: impl Into<Value>) {
        lock(&self.inner.state)
            .annotations
            .insert(key.to_string(), value.into());
    }

    /// Adds free-form metadata. A repeated key overwrites.
    pub fn put_metadata(&self, key: &str, value: impl Into<Value>) {
        lock(&self.inner.state)
            .metadata
            .default
            .insert(key.to_string(), value.into());
    }

    /// Opens a sub-segment for one named unit of work.
    #[must_use]
    pub fn subsegment(&self, name: &str) -> Subsegment {
        tracing::debug!(segment = %self.inner.name, subsegment = name, "subsegment opened");
        Subsegment {
            parent: self.clone(),
            record: Some(SubsegmentRecord {
                name: name.to_string(),
                id: new_entity_id(),
                start_time: Utc::now(),
                end_time: Utc::now(),
                error: false,
                annotations: BTreeMap::new(),
                metadata: Metadata::default(),
            }),
        }
    }

    fn attach(&self, record: SubsegmentRecord) {
        lock(&self.inner.state).subsegments.push(record);
    }

    /// Closes the segment and snapshots it as a [`SegmentRecord`].
    ///
    /// Sub-segments still open at this point are not included.
    #[must_use]
    pub fn close(&self) -> SegmentRecord {
        let state = lock(&self.inner.state);
        let status = state.http.response.as_ref().map_or(0, |r| r.status);
        SegmentRecord {
            name: self.inner.name.clone(),
            id: self.inner.id.clone(),
            trace_id: self.inner.trace_id.clone(),
            start_time: self.inner.started_at,
            end_time: Utc::now(),
            http: state.http.clone(),
            error: (400..500).contains(&status),
            fault: status >= 500,
            annotations: state.annotations.clone(),
            metadata: state.metadata.clone(),
            subsegments: state.subsegments.clone(),
        }
    }
}

/// Guard for an open sub-segment; closes it when dropped.
#[derive(Debug)]
pub struct Subsegment {
    parent: TraceSegment,
    record: Option<SubsegmentRecord>,
}

impl Subsegment {
    /// Adds an indexed annotation to this sub-segment.
    pub fn put_annotation(&mut self, key: &str, value: impl Into<Value>) {
        if let Some(record) = self.record.as_mut() {
            record.annotations.insert(key.to_string(), value.into());
        }
    }

    /// Adds free-form metadata to this sub-segment.
    pub fn put_metadata(&mut self, key: &str, value: impl Into<Value>) {
        if let Some(record) = self.record.as_mut() {
            record.metadata.default.insert(key.to_string(), value.into());
        }
    }

    /// Flags the unit of work as failed.
    pub fn mark_error(&mut self) {
        if let Some(record) = self.record.as_mut() {
            record.error = true;
        }
    }

    /// Closes the sub-segment with the outcome of its unit of work.
    ///
    /// A failure flags the sub-segment and records the error text as
    /// `error` metadata; the result is handed back unchanged.
    ///
    /// # Errors
    ///
    /// Returns `result` as given.
    pub fn finish<T, E: fmt::Display>(mut self, result: Result<T, E>) -> Result<T, E> {
        if let Err(err) = &result {
            self.mark_error();
            self.put_metadata("error", err.to_string());
        }
        result
    }
}

impl Drop for Subsegment {
    fn drop(&mut self) {
        if let Some(mut record) = self.record.take() {
            record.end_time = Utc::now();
            tracing::debug!(
                segment = %self.parent.name(),
                subsegment = %record.name,
                error = record.error,
                "subsegment closed"
            );
            self.parent.attach(record);
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_have_expected_shape() {
        let segment = TraceSegment::begin("posts");
        assert_eq!(segment.id().len(), 16);

        let parts: Vec<&str> = segment.trace_id().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.first(), Some(&"1"));
        assert_eq!(parts.get(1).map(|p| p.len()), Some(8));
        assert_eq!(parts.get(2).map(|p| p.len()), Some(24));
    }

    #[test]
    fn close_captures_http_annotations_and_subsegments() {
        let segment = TraceSegment::begin("posts/7");
        segment.put_http_request("GET", "/posts/7");
        segment.put_annotation("post_id", 7);
        {
            let mut sub = segment.subsegment("get post");
            sub.put_metadata("sql", "SELECT 1");
        }
        segment.put_http_status(200);

        let record = segment.close();
        assert_eq!(record.name, "posts/7");
        assert_eq!(record.http.request.method, "GET");
        assert_eq!(record.http.response, Some(HttpResponseRecord { status: 200 }));
        assert_eq!(record.annotations.get("post_id"), Some(&Value::from(7)));
        assert!(!record.error && !record.fault);

        let Some(sub) = record.subsegment("get post") else {
            panic!("subsegment missing");
        };
        assert_eq!(sub.metadata.default.get("sql"), Some(&Value::from("SELECT 1")));
        assert!(sub.end_time >= sub.start_time);
    }

    #[test]
    fn failed_unit_of_work_flags_subsegment() {
        let segment = TraceSegment::begin("init");
        let sub = segment.subsegment("create table");
        let result: Result<(), String> = sub.finish(Err("table exists".to_string()));
        assert!(result.is_err());

        let record = segment.close();
        let Some(sub) = record.subsegment("create table") else {
            panic!("subsegment missing");
        };
        assert!(sub.error);
        assert_eq!(
            sub.metadata.default.get("error"),
            Some(&Value::from("table exists"))
        );
    }

    #[test]
    fn status_class_sets_error_and_fault() {
        let client = TraceSegment::begin("a");
        client.put_http_status(400);
        let record = client.close();
        assert!(record.error && !record.fault);

        let server = TraceSegment::begin("b");
        server.put_http_status(503);
        let record = server.close();
        assert!(!record.error && record.fault);
    }

    #[test]
    fn document_uses_epoch_seconds_and_omits_empty_sections() {
        let segment = TraceSegment::begin("posts");
        segment.put_http_request("POST", "/posts");
        segment.put_http_status(200);
        let Ok(doc) = serde_json::to_value(segment.close()) else {
            panic!("serialization failed");
        };
        assert!(doc.get("start_time").is_some_and(Value::is_f64));
        assert!(doc.get("subsegments").is_none());
        assert!(doc.get("annotations").is_none());
        assert!(doc.get("error").is_none());
        assert_eq!(
            doc.pointer("/http/response/status"),
            Some(&Value::from(200))
        );
    }
}
