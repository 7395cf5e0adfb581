use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::backend::Backend;
use crate::entry::MonitoredResource;
use crate::hook::{FailureObserver, Hook};
use crate::severity::Severity;
use crate::sink::{AgentChannel, DeliveryError, EntryWriter, ErrorReporter};

/// Log name used when none is configured.
const DEFAULT_LOG_NAME: &str = "default";

/// Immutable hook settings produced by the [`Builder`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Severities the hook claims via its level query.
    pub levels: Vec<Severity>,
    /// Project the logs belong to. Empty in agent mode.
    pub project_id: String,
    /// Monitored resource sent with every API batch.
    pub resource: Option<MonitoredResource>,
    /// Fully qualified regular log name.
    pub log_name: String,
    /// Fully qualified log name for diverted error entries.
    pub error_log_name: String,
    /// Static labels sent with every API batch.
    pub labels: BTreeMap<String, String>,
    /// Allow the backend to accept well-formed entries of a batch even
    /// if others are malformed.
    pub partial_success: bool,
    /// Error reporting service name; enables the error-tracking path.
    pub error_service: Option<String>,
    /// Keep error-severity entries in the regular log instead of
    /// diverting them to the error log name.
    pub errors_in_regular_log: bool,
}

/// Error raised while assembling a hook. Construction is strict: a
/// misconfigured hook is refused outright rather than silently dropping
/// events later.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no delivery backend was provided")]
    MissingBackend,

    #[error("both an entry writer and an agent channel were provided")]
    ConflictingBackends,

    #[error("the monitored resource was not provided")]
    MissingResource,

    #[error("the project id was not provided")]
    MissingProject,

    #[error("error reporting service `{0}` is set but no error reporter was provided")]
    MissingReporter(String),

    #[error("no tokio runtime available to spawn delivery tasks on")]
    NoRuntime,
}

/// Builds the hook.
#[derive(Default)]
pub struct Builder {
    levels: Vec<Severity>,
    project_id: String,
    resource: Option<MonitoredResource>,
    log_name: String,
    error_log_name: Option<String>,
    labels: BTreeMap<String, String>,
    partial_success: bool,
    error_service: Option<String>,
    errors_in_regular_log: bool,
    max_in_flight: Option<usize>,
    observer: Option<FailureObserver>,
    writer: Option<Arc<dyn EntryWriter>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    channel: Option<Arc<dyn AgentChannel>>,
    runtime: Option<tokio::runtime::Handle>,
}

impl Builder {
    /// Creates the builder. All severities are claimed by default.
    pub fn new() -> Builder {
        Builder {
            levels: Severity::all().to_vec(),
            ..Default::default()
        }
    }

    /// Sets the severities the hook claims. Defaults to all of them.
    pub fn levels(self, levels: impl IntoIterator<Item = Severity>) -> Builder {
        Builder {
            levels: levels.into_iter().collect(),
            ..self
        }
    }

    /// Sets the project id used to qualify log names and address the
    /// error reporting API. Required unless an agent channel is used.
    pub fn project_id(self, project_id: impl Into<String>) -> Builder {
        Builder {
            project_id: project_id.into(),
            ..self
        }
    }

    /// Sets the monitored resource sent with every API batch. Required
    /// unless an agent channel is used.
    pub fn resource(self, resource: MonitoredResource) -> Builder {
        Builder {
            resource: Some(resource),
            ..self
        }
    }

    /// Sets the log name. Defaults to `default`; qualified as
    /// `projects/{project}/logs/{name}` when a project id is set.
    pub fn log_name(self, name: impl Into<String>) -> Builder {
        Builder {
            log_name: name.into(),
            ..self
        }
    }

    /// Adds one static label sent with every API batch.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Builder {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Replaces the static labels sent with every API batch.
    pub fn labels(self, labels: BTreeMap<String, String>) -> Builder {
        Builder { labels, ..self }
    }

    /// Toggles partial-success writes. Defaults to off.
    pub fn partial_success(self, enabled: bool) -> Builder {
        Builder {
            partial_success: enabled,
            ..self
        }
    }

    /// Sets the error reporting service name. Error-severity events are
    /// then duplicated to error tracking instead of written as plain
    /// entries. Requires an error reporter in API mode.
    pub fn error_reporting_service(self, service: impl Into<String>) -> Builder {
        Builder {
            error_service: Some(service.into()),
            ..self
        }
    }

    /// Sets the log name for diverted error entries. Defaults to the
    /// regular log name with an `_errors` suffix.
    pub fn error_reporting_log_name(self, name: impl Into<String>) -> Builder {
        Builder {
            error_log_name: Some(name.into()),
            ..self
        }
    }

    /// Keeps error-severity entries in the regular log instead of
    /// diverting them to the error log name. Defaults to off.
    pub fn errors_in_regular_log(self, enabled: bool) -> Builder {
        Builder {
            errors_in_regular_log: enabled,
            ..self
        }
    }

    /// Caps the number of deliveries running at once. Fire still
    /// returns immediately; excess deliveries queue inside their tasks.
    /// Defaults to no cap.
    pub fn max_in_flight(self, limit: usize) -> Builder {
        Builder {
            max_in_flight: Some(limit),
            ..self
        }
    }

    /// Registers an observer called with every delivery failure, after
    /// the failure has been logged and counted.
    pub fn on_failure(
        self,
        observer: impl Fn(&DeliveryError) + Send + Sync + 'static,
    ) -> Builder {
        Builder {
            observer: Some(Arc::new(observer)),
            ..self
        }
    }

    /// Delivers entries through the given writer (API mode).
    pub fn entry_writer(self, writer: Arc<dyn EntryWriter>) -> Builder {
        Builder {
            writer: Some(writer),
            ..self
        }
    }

    /// Delivers error events through the given reporter (API mode).
    pub fn error_reporter(self, reporter: Arc<dyn ErrorReporter>) -> Builder {
        Builder {
            reporter: Some(reporter),
            ..self
        }
    }

    /// Delivers flat records through the given channel (agent mode).
    pub fn agent_channel(self, channel: Arc<dyn AgentChannel>) -> Builder {
        Builder {
            channel: Some(channel),
            ..self
        }
    }

    /// Sets the runtime delivery tasks are spawned on. Defaults to the
    /// runtime the builder runs under.
    pub fn runtime(self, handle: tokio::runtime::Handle) -> Builder {
        Builder {
            runtime: Some(handle),
            ..self
        }
    }

    /// Consumes the builder, returning the hook.
    ///
    /// Exactly one delivery backend must be present. API mode requires
    /// a project id and a monitored resource, and an error reporter
    /// when an error reporting service is named. Log names are
    /// defaulted and qualified here.
    pub fn build(self) -> Result<Hook, BuildError> {
        let agent_mode = self.channel.is_some();
        if agent_mode && (self.writer.is_some() || self.reporter.is_some()) {
            return Err(BuildError::ConflictingBackends);
        }
        if !agent_mode {
            if self.writer.is_none() {
                return Err(BuildError::MissingBackend);
            }
            if self.resource.is_none() {
                return Err(BuildError::MissingResource);
            }
            if self.project_id.is_empty() {
                return Err(BuildError::MissingProject);
            }
            if let Some(service) = &self.error_service {
                if self.reporter.is_none() {
                    return Err(BuildError::MissingReporter(service.clone()));
                }
            }
        }

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => tokio::runtime::Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };

        let name = if self.log_name.is_empty() {
            DEFAULT_LOG_NAME
        } else {
            self.log_name.as_str()
        };
        let log_name = qualify(&self.project_id, name);
        let error_log_name = match &self.error_log_name {
            Some(name) => qualify(&self.project_id, name),
            None => format!("{log_name}_errors"),
        };

        let settings = Settings {
            levels: self.levels,
            project_id: self.project_id,
            resource: self.resource,
            log_name,
            error_log_name,
            labels: self.labels,
            partial_success: self.partial_success,
            error_service: self.error_service,
            errors_in_regular_log: self.errors_in_regular_log,
        };

        let backend = match (self.channel, self.writer) {
            (Some(channel), _) => Backend::Agent { channel },
            (None, Some(writer)) => Backend::Api {
                writer,
                reporter: self.reporter,
            },
            (None, None) => return Err(BuildError::MissingBackend),
        };

        Ok(Hook::assemble(
            settings,
            backend,
            runtime,
            self.max_in_flight,
            self.observer,
        ))
    }
}

/// Log names are addressed as `projects/{project}/logs/{name}` by the
/// API. Agent channels have no project and use the bare name as their
/// tag.
fn qualify(project_id: &str, name: &str) -> String {
    if project_id.is_empty() {
        name.to_string()
    } else {
        format!("projects/{project_id}/logs/{name}")
    }
}
