use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::entry::HttpRequest;
use crate::event::LogEvent;
use crate::normalize::NormalizedRecord;

/// Error-tracking event duplicated from an error-severity log event.
///
/// Mirrors the Error Reporting `ReportedErrorEvent` wire shape. The
/// service name comes from configuration; the version and affected user
/// are read from the `version` and `user` labels when present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorEvent {
    pub event_time: String,
    pub message: String,
    pub service_context: ServiceContext,
    pub context: ErrorContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceContext {
    pub service: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorContext {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request: Option<HttpRequestContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_location: Option<SourceLocation>,
}

/// Request descriptor in Error Reporting form. Note the API spells
/// `referrer` in full, unlike the `referer` of the logging descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpRequestContext {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub referrer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote_ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceLocation {
    pub file_path: String,
    pub function_name: String,
    pub line_number: i64,
}

impl ErrorEvent {
    /// Assemble the error event for one log event and its normalized
    /// record.
    pub fn build(service: &str, event: &LogEvent, record: &NormalizedRecord) -> Self {
        ErrorEvent {
            event_time: event
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            message: event.message.clone(),
            service_context: ServiceContext {
                service: service.to_string(),
                version: record.labels.get("version").cloned().unwrap_or_default(),
            },
            context: ErrorContext {
                user: record.labels.get("user").cloned().unwrap_or_default(),
                http_request: record.http_request.as_ref().map(HttpRequestContext::from),
                report_location: event.caller.as_ref().map(|caller| SourceLocation {
                    file_path: caller.file.clone(),
                    function_name: caller.function.clone(),
                    line_number: i64::from(caller.line),
                }),
            },
        }
    }
}

impl From<&HttpRequest> for HttpRequestContext {
    fn from(descriptor: &HttpRequest) -> Self {
        HttpRequestContext {
            method: descriptor.request_method.clone(),
            url: descriptor.request_url.clone(),
            user_agent: descriptor.user_agent.clone(),
            referrer: descriptor.referer.clone(),
            remote_ip: descriptor.remote_ip.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Caller;
    use crate::normalize::normalize;
    use crate::severity::Severity;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn builds_full_event_from_labels_caller_and_descriptor() {
        let event = LogEvent::new(Severity::Error, "boom")
            .with_timestamp(Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap())
            .with_field("version", "1.4.2")
            .with_field("user", "alice")
            .with_field(
                "http_request",
                HttpRequest {
                    request_method: "POST".into(),
                    request_url: "https://example.com/pay".into(),
                    referer: "https://example.com/cart".into(),
                    remote_ip: "192.0.2.9".into(),
                    user_agent: "checkout/2".into(),
                },
            )
            .with_caller(Caller::new("src/pay.rs", "pay::charge", 42));
        let record = normalize(&event.fields);

        let error_event = ErrorEvent::build("checkout", &event, &record);

        assert_eq!(
            serde_json::to_value(&error_event).unwrap(),
            json!({
                "eventTime": "2023-04-05T06:07:08Z",
                "message": "boom",
                "serviceContext": {"service": "checkout", "version": "1.4.2"},
                "context": {
                    "user": "alice",
                    "httpRequest": {
                        "method": "POST",
                        "url": "https://example.com/pay",
                        "userAgent": "checkout/2",
                        "referrer": "https://example.com/cart",
                        "remoteIp": "192.0.2.9"
                    },
                    "reportLocation": {
                        "filePath": "src/pay.rs",
                        "functionName": "pay::charge",
                        "lineNumber": 42
                    }
                }
            })
        );
    }

    #[test]
    fn omits_optional_parts_that_are_absent() {
        let event = LogEvent::new(Severity::Fatal, "boom")
            .with_timestamp(Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap());
        let record = normalize(&event.fields);

        let error_event = ErrorEvent::build("checkout", &event, &record);

        assert_eq!(
            serde_json::to_value(&error_event).unwrap(),
            json!({
                "eventTime": "2023-04-05T06:07:08Z",
                "message": "boom",
                "serviceContext": {"service": "checkout"},
                "context": {}
            })
        );
    }
}
