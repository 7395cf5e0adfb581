use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP request descriptor carried by a log entry.
///
/// Field names follow the `httpRequest` object of the Cloud Logging
/// [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry).
/// Empty fields are omitted from the serialized payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub referer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
}

/// The monitored resource a log entry is recorded against.
///
/// See <https://cloud.google.com/logging/docs/api/v2/resource-list> for
/// the label set each resource type expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoredResource {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl MonitoredResource {
    pub fn new(type_: impl Into<String>) -> Self {
        MonitoredResource {
            type_: type_.into(),
            labels: BTreeMap::new(),
        }
    }

    /// The `global` resource type with no labels. A reasonable choice
    /// for processes that do not run on Google infrastructure.
    pub fn global() -> Self {
        MonitoredResource::new("global")
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// One log entry of a [`WriteRequest`], shaped like the REST
/// representation accepted by `entries:write`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub severity: String,
    /// RFC 3339 timestamp of the event.
    pub timestamp: String,
    pub text_payload: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request: Option<HttpRequest>,
}

/// Body of a `https://logging.googleapis.com/v2/entries:write` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub log_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<MonitoredResource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub partial_success: bool,
    pub entries: Vec<LogEntry>,
}
