use std::sync::Arc;

use chrono::SecondsFormat;

use crate::config::Settings;
use crate::entry::{LogEntry, WriteRequest};
use crate::event::LogEvent;
use crate::normalize::NormalizedRecord;
use crate::report::ErrorEvent;
use crate::severity::Severity;
use crate::sink::{AgentChannel, DeliveryError, EntryWriter, ErrorReporter};
use crate::DIAGNOSTIC_TARGET;

/// Delivery backend selected at build time.
///
/// Exactly one of the two variants exists per hook: direct cloud API
/// delivery, or a local forwarding agent that ships records on the
/// process's behalf.
pub(crate) enum Backend {
    Api {
        writer: Arc<dyn EntryWriter>,
        reporter: Option<Arc<dyn ErrorReporter>>,
    },
    Agent {
        channel: Arc<dyn AgentChannel>,
    },
}

impl Backend {
    /// Deliver one normalized event. Called from the per-fire task; any
    /// error is final and handled by the caller's failure funnel.
    pub(crate) async fn deliver(
        &self,
        settings: &Settings,
        event: &LogEvent,
        record: &NormalizedRecord,
    ) -> Result<(), DeliveryError> {
        match self {
            Backend::Api { writer, reporter } => {
                deliver_api(writer.as_ref(), reporter.as_deref(), settings, event, record).await
            }
            Backend::Agent { channel } => {
                deliver_agent(channel.as_ref(), settings, event, record).await
            }
        }
    }
}

async fn deliver_api(
    writer: &dyn EntryWriter,
    reporter: Option<&dyn ErrorReporter>,
    settings: &Settings,
    event: &LogEvent,
    record: &NormalizedRecord,
) -> Result<(), DeliveryError> {
    if event.severity.is_error() {
        if let Some(service) = &settings.error_service {
            match reporter {
                Some(reporter) => {
                    let error_event = ErrorEvent::build(service, event, record);
                    return reporter.report(&settings.project_id, &error_event).await;
                }
                None => {
                    tracing::warn!(
                        target: DIAGNOSTIC_TARGET,
                        "error reporting service is set but no reporter is available, \
                         writing a plain entry instead"
                    );
                }
            }
        }
    }
    writer.write(&write_request(settings, event, record)).await
}

async fn deliver_agent(
    channel: &dyn AgentChannel,
    settings: &Settings,
    event: &LogEvent,
    record: &NormalizedRecord,
) -> Result<(), DeliveryError> {
    let flat = flat_record(event, record)?;
    if event.severity.is_error() {
        if let Some(service) = &settings.error_service {
            let error_event = ErrorEvent::build(service, event, record);
            let base =
                serde_json::to_value(&error_event).map_err(|source| DeliveryError::Serialize {
                    context: "error event",
                    source,
                })?;
            let merged = merge_flat_over(base, flat);
            return channel.post(&settings.error_log_name, &merged).await;
        }
        if !settings.errors_in_regular_log {
            return channel.post(&settings.error_log_name, &flat).await;
        }
    }
    channel.post(&settings.log_name, &flat).await
}

/// Log name for a plain entry: error-severity events are diverted to
/// the error log name unless the hook was told to keep them in the
/// regular log.
fn entry_log_name(settings: &Settings, severity: Severity) -> &str {
    if severity.is_error() && !settings.errors_in_regular_log {
        &settings.error_log_name
    } else {
        &settings.log_name
    }
}

fn write_request(
    settings: &Settings,
    event: &LogEvent,
    record: &NormalizedRecord,
) -> WriteRequest {
    WriteRequest {
        log_name: entry_log_name(settings, event.severity).to_string(),
        resource: settings.resource.clone(),
        labels: settings.labels.clone(),
        partial_success: settings.partial_success,
        entries: vec![LogEntry {
            severity: event.severity.cloud_severity().to_string(),
            timestamp: event
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            text_payload: event.message.clone(),
            labels: record.labels.clone(),
            http_request: record.http_request.clone(),
        }],
    }
}

/// Flat record in the schema the forwarding agent expects: the base
/// keys, the normalized labels merged at top level (labels win on
/// collision), and the descriptor under `httpRequest`. Static labels
/// belong to the API envelope and are not included here.
fn flat_record(
    event: &LogEvent,
    record: &NormalizedRecord,
) -> Result<serde_json::Value, DeliveryError> {
    let mut map = serde_json::Map::new();
    map.insert("severity".into(), event.severity.cloud_severity().into());
    map.insert(
        "timestampSeconds".into(),
        event.timestamp.timestamp().to_string().into(),
    );
    map.insert(
        "timestampNanos".into(),
        event.timestamp.timestamp_subsec_nanos().to_string().into(),
    );
    map.insert("message".into(), event.message.clone().into());
    for (key, value) in &record.labels {
        map.insert(key.clone(), value.clone().into());
    }
    if let Some(descriptor) = &record.http_request {
        let value =
            serde_json::to_value(descriptor).map_err(|source| DeliveryError::Serialize {
                context: "http request descriptor",
                source,
            })?;
        map.insert("httpRequest".into(), value);
    }
    Ok(serde_json::Value::Object(map))
}

/// Overlay the flat record onto the serialized error event. On key
/// collision the flat record wins.
fn merge_flat_over(mut base: serde_json::Value, flat: serde_json::Value) -> serde_json::Value {
    if let (serde_json::Value::Object(base), serde_json::Value::Object(flat)) = (&mut base, flat) {
        for (key, value) in flat {
            base.insert(key, value);
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MonitoredResource;
    use crate::normalize::normalize;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWriter {
        requests: Mutex<Vec<WriteRequest>>,
    }

    #[async_trait]
    impl EntryWriter for RecordingWriter {
        async fn write(&self, request: &WriteRequest) -> Result<(), DeliveryError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<(String, ErrorEvent)>>,
    }

    #[async_trait]
    impl ErrorReporter for RecordingReporter {
        async fn report(&self, project_id: &str, event: &ErrorEvent) -> Result<(), DeliveryError> {
            self.events
                .lock()
                .unwrap()
                .push((project_id.to_string(), event.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        posts: Mutex<Vec<(String, serde_json::Value)>>,
    }

    #[async_trait]
    impl AgentChannel for RecordingChannel {
        async fn post(
            &self,
            channel: &str,
            record: &serde_json::Value,
        ) -> Result<(), DeliveryError> {
            self.posts
                .lock()
                .unwrap()
                .push((channel.to_string(), record.clone()));
            Ok(())
        }
    }

    fn settings(error_service: Option<&str>) -> Settings {
        Settings {
            levels: Severity::all().to_vec(),
            project_id: "p".into(),
            resource: Some(MonitoredResource::global()),
            log_name: "projects/p/logs/app".into(),
            error_log_name: "projects/p/logs/app_errors".into(),
            labels: BTreeMap::new(),
            partial_success: false,
            error_service: error_service.map(Into::into),
            errors_in_regular_log: false,
        }
    }

    fn event(severity: Severity) -> LogEvent {
        LogEvent::new(severity, "something happened")
            .with_timestamp(Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap())
            .with_field("user", "alice")
    }

    #[tokio::test]
    async fn api_plain_event_writes_one_entry_to_regular_log() {
        let writer = Arc::new(RecordingWriter::default());
        let reporter = Arc::new(RecordingReporter::default());
        let backend = Backend::Api {
            writer: writer.clone(),
            reporter: Some(reporter.clone()),
        };
        let event = event(Severity::Info);

        backend
            .deliver(&settings(Some("svc")), &event, &normalize(&event.fields))
            .await
            .unwrap();

        let requests = writer.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].log_name, "projects/p/logs/app");
        assert_eq!(requests[0].entries.len(), 1);
        assert_eq!(requests[0].entries[0].severity, "INFO");
        assert_eq!(requests[0].entries[0].text_payload, "something happened");
        assert_eq!(requests[0].entries[0].labels["user"], "alice");
        assert!(reporter.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resource_labels_ride_along_on_every_write() {
        let writer = Arc::new(RecordingWriter::default());
        let backend = Backend::Api {
            writer: writer.clone(),
            reporter: None,
        };
        let resource = MonitoredResource::new("gce_instance")
            .with_label("instance_id", "i-1234")
            .with_label("zone", "us-central1-a");
        let settings = Settings {
            resource: Some(resource.clone()),
            ..settings(None)
        };
        let event = event(Severity::Info);

        backend
            .deliver(&settings, &event, &normalize(&event.fields))
            .await
            .unwrap();

        let requests = writer.requests.lock().unwrap();
        assert_eq!(requests[0].resource.as_ref(), Some(&resource));
        assert_eq!(requests[0].resource.as_ref().unwrap().labels["zone"], "us-central1-a");
    }

    #[tokio::test]
    async fn api_error_with_service_goes_to_the_reporter() {
        let writer = Arc::new(RecordingWriter::default());
        let reporter = Arc::new(RecordingReporter::default());
        let backend = Backend::Api {
            writer: writer.clone(),
            reporter: Some(reporter.clone()),
        };
        let event = event(Severity::Error);

        backend
            .deliver(&settings(Some("svc")), &event, &normalize(&event.fields))
            .await
            .unwrap();

        let events = reporter.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "p");
        assert_eq!(events[0].1.service_context.service, "svc");
        assert_eq!(events[0].1.context.user, "alice");
        assert!(writer.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn api_error_without_service_is_diverted_to_the_error_log() {
        let writer = Arc::new(RecordingWriter::default());
        let backend = Backend::Api {
            writer: writer.clone(),
            reporter: None,
        };
        let event = event(Severity::Fatal);

        backend
            .deliver(&settings(None), &event, &normalize(&event.fields))
            .await
            .unwrap();

        let requests = writer.requests.lock().unwrap();
        assert_eq!(requests[0].log_name, "projects/p/logs/app_errors");
        assert_eq!(requests[0].entries[0].severity, "CRITICAL");
    }

    #[tokio::test]
    async fn api_error_diversion_can_be_disabled() {
        let writer = Arc::new(RecordingWriter::default());
        let backend = Backend::Api {
            writer: writer.clone(),
            reporter: None,
        };
        let mut settings = settings(None);
        settings.errors_in_regular_log = true;
        let event = event(Severity::Error);

        backend
            .deliver(&settings, &event, &normalize(&event.fields))
            .await
            .unwrap();

        let requests = writer.requests.lock().unwrap();
        assert_eq!(requests[0].log_name, "projects/p/logs/app");
    }

    #[tokio::test]
    async fn api_error_without_reporter_falls_back_to_an_entry() {
        let writer = Arc::new(RecordingWriter::default());
        let backend = Backend::Api {
            writer: writer.clone(),
            reporter: None,
        };
        let event = event(Severity::Error);

        backend
            .deliver(&settings(Some("svc")), &event, &normalize(&event.fields))
            .await
            .unwrap();

        let requests = writer.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].log_name, "projects/p/logs/app_errors");
    }

    #[tokio::test]
    async fn agent_plain_event_posts_the_flat_record() {
        let channel = Arc::new(RecordingChannel::default());
        let backend = Backend::Agent {
            channel: channel.clone(),
        };
        let mut settings = settings(None);
        settings.labels.insert("env".into(), "prod".into());
        let event = event(Severity::Warn);

        backend
            .deliver(&settings, &event, &normalize(&event.fields))
            .await
            .unwrap();

        let posts = channel.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "projects/p/logs/app");
        let record = &posts[0].1;
        assert_eq!(record["severity"], "WARNING");
        assert_eq!(record["timestampSeconds"], "1680674828");
        assert_eq!(record["timestampNanos"], "0");
        assert_eq!(record["message"], "something happened");
        assert_eq!(record["user"], "alice");
        assert_eq!(record.get("env"), None);
    }

    #[tokio::test]
    async fn agent_error_with_service_posts_the_merged_record() {
        let channel = Arc::new(RecordingChannel::default());
        let backend = Backend::Agent {
            channel: channel.clone(),
        };
        let event = event(Severity::Panic).with_field("eventTime", "overridden");

        backend
            .deliver(&settings(Some("svc")), &event, &normalize(&event.fields))
            .await
            .unwrap();

        let posts = channel.posts.lock().unwrap();
        assert_eq!(posts[0].0, "projects/p/logs/app_errors");
        let record = &posts[0].1;
        assert_eq!(record["severity"], "EMERGENCY");
        assert_eq!(record["serviceContext"]["service"], "svc");
        assert_eq!(record["message"], "something happened");
        // the flat record overlays the serialized error event
        assert_eq!(record["eventTime"], "overridden");
    }

    #[tokio::test]
    async fn agent_error_without_service_uses_the_error_log() {
        let channel = Arc::new(RecordingChannel::default());
        let backend = Backend::Agent {
            channel: channel.clone(),
        };
        let event = event(Severity::Error);

        backend
            .deliver(&settings(None), &event, &normalize(&event.fields))
            .await
            .unwrap();

        let posts = channel.posts.lock().unwrap();
        assert_eq!(posts[0].0, "projects/p/logs/app_errors");
        assert_eq!(posts[0].1.get("eventTime"), None);
    }
}
