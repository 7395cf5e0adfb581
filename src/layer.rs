use std::collections::BTreeMap;

use tracing::field::{Field, Visit};
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Registry;

use crate::entry::HttpRequest;
use crate::event::{Caller, FieldValue, LogEvent};
use crate::hook::Hook;
use crate::severity::Severity;
use crate::DIAGNOSTIC_TARGET;

/// Conventional field name for an HTTP request descriptor. A string
/// field with this name whose value parses as descriptor JSON is turned
/// into the entry's `httpRequest` instead of a label.
pub const HTTP_REQUEST_FIELD: &str = "http_request";

/// `tracing_subscriber` layer that converts events into [`LogEvent`]s
/// and fires them through a [`Hook`].
///
/// Each matching event becomes one fire-and-forget delivery; the
/// application thread is never blocked on network I/O. Events with a
/// severity the hook does not claim are ignored, as are the crate's own
/// diagnostics. `tracing` has no fatal or panic level, so those two
/// severities are only reachable through [`Hook::fire`] directly.
pub struct StackdriverLayer {
    hook: Hook,
}

impl StackdriverLayer {
    pub fn new(hook: Hook) -> StackdriverLayer {
        StackdriverLayer { hook }
    }

    /// The hook this layer fires into. Useful for draining on shutdown.
    pub fn hook(&self) -> &Hook {
        &self.hook
    }
}

impl<S> Layer<S> for StackdriverLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        // Spans and the crate's own diagnostics stay visible to the rest
        // of the stack; only events outside the claimed level set are
        // filtered, and those skip field recording entirely.
        if !metadata.is_event() || metadata.target() == DIAGNOSTIC_TARGET {
            return true;
        }
        self.hook.enabled(severity_for(metadata.level()))
    }

    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target() == DIAGNOSTIC_TARGET {
            return;
        }
        let severity = severity_for(meta.level());
        if !self.hook.enabled(severity) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut visitor = EventVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let mut log_event = LogEvent::new(severity, message.unwrap_or_default());
        log_event.fields = fields;
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            log_event = log_event.with_caller(Caller::new(
                file,
                meta.module_path().unwrap_or_default(),
                line,
            ));
        }

        self.hook.fire(log_event);
    }
}

fn severity_for(level: &Level) -> Severity {
    if *level == Level::ERROR {
        Severity::Error
    } else if *level == Level::WARN {
        Severity::Warn
    } else if *level == Level::INFO {
        Severity::Info
    } else if *level == Level::DEBUG {
        Severity::Debug
    } else {
        Severity::Trace
    }
}

struct EventVisitor<'a> {
    fields: &'a mut BTreeMap<String, FieldValue>,
    message: &'a mut Option<String>,
}

impl<'a> Visit for EventVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else if field.name() == HTTP_REQUEST_FIELD {
            match serde_json::from_str::<HttpRequest>(value) {
                Ok(descriptor) => {
                    self.fields
                        .insert(field.name().to_string(), FieldValue::Http(descriptor));
                }
                Err(_) => {
                    self.fields
                        .insert(field.name().to_string(), FieldValue::Str(value.to_string()));
                }
            }
        } else {
            self.fields
                .insert(field.name().to_string(), FieldValue::Str(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // The implicit message of every event macro arrives here as
        // `fmt::Arguments`.
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(
                field.name().to_string(),
                FieldValue::Str(format!("{:?}", value)),
            );
        }
    }
}

/// Install a [`Registry`] carrying this layer as the global default
/// subscriber, so all `tracing` events in the process reach the hook.
pub fn install(hook: Hook) -> Result<(), SetGlobalDefaultError> {
    let subscriber = Registry::default().with(StackdriverLayer::new(hook));
    tracing::subscriber::set_global_default(subscriber)
}

/// Like [`install`], with a console `fmt` layer on top so events stay
/// visible locally.
pub fn install_with_fmt(hook: Hook) -> Result<(), SetGlobalDefaultError> {
    let subscriber = Registry::default()
        .with(StackdriverLayer::new(hook))
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)
}
