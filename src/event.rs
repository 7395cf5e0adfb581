use std::collections::BTreeMap;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};

use crate::entry::HttpRequest;
use crate::severity::Severity;

/// One structured log event as seen by the hook.
///
/// Events are owned snapshots: [`Hook::fire`](crate::hook::Hook::fire)
/// takes the event by value, so the delivery task can never race with
/// the caller mutating field data. The tracing layer builds these from
/// `tracing` events; they can also be constructed directly.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    /// Structured fields attached to the event. Keys are iterated in
    /// map order during normalization.
    pub fields: BTreeMap<String, FieldValue>,
    /// Call site of the event, when the producer knows it.
    pub caller: Option<Caller>,
}

impl LogEvent {
    /// Create an event stamped with the current time.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        LogEvent {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            fields: BTreeMap::new(),
            caller: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a field. Inserting an existing key replaces its value.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = Some(caller);
        self
    }
}

/// Call-site descriptor of an event: source file, enclosing function (or
/// module path) and 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub file: String,
    pub function: String,
    pub line: u32,
}

impl Caller {
    pub fn new(file: impl Into<String>, function: impl Into<String>, line: u32) -> Self {
        Caller {
            file: file.into(),
            function: function.into(),
            line,
        }
    }
}

/// Value of a structured field.
///
/// The normalizer treats each variant differently: strings become labels
/// verbatim, captured inbound requests and pre-built descriptors become
/// the entry's HTTP request descriptor, and everything else is
/// stringified into a label.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A plain string, copied into the label map as-is.
    Str(String),
    /// An inbound HTTP request captured from an `http::Request`; the
    /// normalizer extracts the descriptor from it.
    Request(CapturedRequest),
    /// An already-built descriptor, adopted without inspection.
    Http(HttpRequest),
    /// Any other value, stringified by the normalizer.
    Value(serde_json::Value),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Value(value.into())
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Value(value.into())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Value(value.into())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Value(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Value(value.into())
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        FieldValue::Value(value)
    }
}

impl From<HttpRequest> for FieldValue {
    fn from(value: HttpRequest) -> Self {
        FieldValue::Http(value)
    }
}

impl From<CapturedRequest> for FieldValue {
    fn from(value: CapturedRequest) -> Self {
        FieldValue::Request(value)
    }
}

impl<B> From<&http::Request<B>> for FieldValue {
    fn from(request: &http::Request<B>) -> Self {
        FieldValue::Request(CapturedRequest::from_request(request))
    }
}

/// Owned snapshot of an inbound `http::Request`, taken at the call site
/// so the event can outlive the request body and connection.
///
/// The request line and headers are cloned wholesale; the peer address
/// is not part of `http::Request` and must be supplied separately via
/// [`with_remote_addr`](CapturedRequest::with_remote_addr).
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRequest {
    pub(crate) method: http::Method,
    pub(crate) uri: http::Uri,
    pub(crate) headers: http::HeaderMap,
    pub(crate) remote_addr: Option<SocketAddr>,
}

impl CapturedRequest {
    pub fn from_request<B>(request: &http::Request<B>) -> Self {
        CapturedRequest {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            remote_addr: None,
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}
