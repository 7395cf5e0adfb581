//! A Google Cloud Logging (Stackdriver) hook for [`tracing`], with
//! optional duplication of error-severity events to Error Reporting.
//!
//! # Usage
//!
//! Build a [`Hook`] with the [`Builder`], picking one delivery backend:
//!
//! 1. **API**: hand the builder an entry writer (and optionally an error
//!    reporter), usually one [`api::ApiClient`] serving as both over
//!    REST. Requires the `api-client` feature, on by default.
//! 2. **Agent**: hand it an [`agent::ForwardClient`] posting flat
//!    records to a local forwarding agent, which then owns upstream
//!    delivery.
//!
//! Then either fire [`LogEvent`]s directly, or install the
//! [`StackdriverLayer`] so every `tracing` event is converted and fired
//! for you. Every fire is one fire-and-forget delivery task; call
//! [`Hook::wait`] before shutdown so nothing is lost.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tracing_stackdriver_sink::api::{ApiClient, MetadataTokenSource};
//! use tracing_stackdriver_sink::{layer, Builder, MonitoredResource};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(ApiClient::new(Arc::new(MetadataTokenSource::new())));
//! let hook = Builder::new()
//!     .project_id("my-project")
//!     .resource(MonitoredResource::global())
//!     .log_name("app")
//!     .entry_writer(client.clone())
//!     .error_reporter(client)
//!     .error_reporting_service("app")
//!     .build()?;
//! layer::install_with_fmt(hook.clone())?;
//!
//! tracing::info!(user = "alice", "signed in");
//! hook.wait().await;
//! # Ok(())
//! # }
//! ```

/// Target used for the crate's own diagnostics. Swallowed delivery
/// failures are logged through `tracing` under this target; the layer
/// skips it so diagnostics never feed back into the hook, and
/// integrators can filter on it.
pub const DIAGNOSTIC_TARGET: &str = "stackdriver_sink";

/// Ordered severity set, wider than `tracing`'s level set.
pub mod severity;

/// The owned event snapshot handed to [`Hook::fire`].
pub mod event;

/// Cloud Logging wire shapes.
pub mod entry;

/// Flattens event fields into labels and at most one HTTP descriptor.
pub mod normalize;

/// Error Reporting wire shapes.
pub mod report;

/// Delivery capability traits and the delivery error taxonomy.
pub mod sink;

mod backend;

/// Hook configuration and construction.
pub mod config;

/// The dispatcher: fire, drain, counters.
pub mod hook;

/// `tracing_subscriber` integration.
pub mod layer;

/// Client for a local forwarding agent.
pub mod agent;

/// REST clients for the logging and error reporting APIs.
#[cfg(feature = "api-client")]
pub mod api;

/// Environment helpers.
pub mod env;

pub use crate::config::{BuildError, Builder, Settings};
pub use crate::entry::{HttpRequest, MonitoredResource};
pub use crate::event::{Caller, CapturedRequest, FieldValue, LogEvent};
pub use crate::hook::{FailureObserver, Hook};
pub use crate::layer::{StackdriverLayer, HTTP_REQUEST_FIELD};
pub use crate::severity::Severity;
pub use crate::sink::{AgentChannel, DeliveryError, EntryWriter, ErrorReporter};
