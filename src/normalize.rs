use std::collections::BTreeMap;

use crate::entry::HttpRequest;
use crate::event::{CapturedRequest, FieldValue};
use crate::DIAGNOSTIC_TARGET;

/// Labels and the optional HTTP descriptor derived from one event's
/// fields. Built per fire, handed to a single delivery task, then
/// dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    pub labels: BTreeMap<String, String>,
    pub http_request: Option<HttpRequest>,
}

/// Flatten structured fields into string labels, extracting at most one
/// HTTP request descriptor.
///
/// Per field: strings are copied into the label map verbatim; a captured
/// inbound request has its method, URL, `Referer` header, peer IP and
/// `User-Agent` header extracted into the descriptor; a pre-built
/// [`HttpRequest`] is adopted as the descriptor directly; any other
/// value is stringified (JSON strings without quotes, everything else in
/// compact JSON form). Fields that produced a descriptor do not appear
/// in the label map.
///
/// Fields are visited in map key order, so when several fields carry an
/// HTTP request the last one in key order wins. Replacing an earlier
/// descriptor is reported on the diagnostic stream. Normalizing the
/// same fields twice yields identical records.
pub fn normalize(fields: &BTreeMap<String, FieldValue>) -> NormalizedRecord {
    let mut record = NormalizedRecord::default();
    let mut descriptor_key: Option<&str> = None;

    for (key, value) in fields {
        match value {
            FieldValue::Str(text) => {
                record.labels.insert(key.clone(), text.clone());
            }
            FieldValue::Request(captured) => {
                adopt_descriptor(&mut record, &mut descriptor_key, key, extract(captured));
            }
            FieldValue::Http(descriptor) => {
                adopt_descriptor(&mut record, &mut descriptor_key, key, descriptor.clone());
            }
            FieldValue::Value(value) => {
                record.labels.insert(key.clone(), stringify(value));
            }
        }
    }

    record
}

fn adopt_descriptor<'a>(
    record: &mut NormalizedRecord,
    descriptor_key: &mut Option<&'a str>,
    key: &'a str,
    descriptor: HttpRequest,
) {
    if let Some(replaced) = descriptor_key.replace(key) {
        tracing::warn!(
            target: DIAGNOSTIC_TARGET,
            replaced,
            kept = key,
            "multiple fields carry an HTTP request, keeping the last in key order"
        );
    }
    record.http_request = Some(descriptor);
}

fn extract(request: &CapturedRequest) -> HttpRequest {
    HttpRequest {
        request_method: request.method.to_string(),
        request_url: request.uri.to_string(),
        referer: header_value(request, http::header::REFERER),
        remote_ip: request
            .remote_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default(),
        user_agent: header_value(request, http::header::USER_AGENT),
    }
}

fn header_value(request: &CapturedRequest, name: http::header::HeaderName) -> String {
    request
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
