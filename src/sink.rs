use async_trait::async_trait;
use thiserror::Error;

use crate::entry::WriteRequest;
use crate::report::ErrorEvent;

/// Failure surfaced by a delivery capability.
///
/// Delivery errors are never returned to the caller of `fire`; the hook
/// logs them on the diagnostic stream, counts them, hands them to the
/// optional failure observer and drops them.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A payload could not be serialized to JSON.
    #[error("{context}: {source}")]
    Serialize {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Transport-level failure while talking to the cloud API.
    #[cfg(feature = "api-client")]
    #[error("{context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The remote service answered with a non-success status.
    #[error("{context}: status {status}: {body}")]
    Status {
        context: &'static str,
        status: u16,
        body: String,
    },

    /// Socket-level failure while talking to the local forwarding agent.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Anything else a custom backend wants to surface.
    #[error("{0}")]
    Other(String),
}

/// Asynchronous destination for log entry batches produced by the hook.
///
/// Implementations transport a [`WriteRequest`] to a concrete backend
/// (the Cloud Logging REST API, a test double, a file). The hook calls
/// `write` from a background task and never awaits it on the
/// application thread.
#[async_trait]
pub trait EntryWriter: Send + Sync {
    /// Send a single batch of log entries to the underlying backend.
    ///
    /// **Parameters**
    /// - `request`: fully-populated [`WriteRequest`]; the hook always
    ///   sends exactly one entry per batch.
    ///
    /// **Returns**
    /// - `Ok(())` if the batch was accepted by the backend.
    /// - `Err(..)` if the backend failed (network error, serialization
    ///   error, HTTP status, etc.). The hook treats this as final:
    ///   failures are logged and swallowed, never retried.
    async fn write(&self, request: &WriteRequest) -> Result<(), DeliveryError>;
}

/// Destination for error-tracking events duplicated from error-severity
/// log events.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    /// Report one error event against the given project.
    ///
    /// **Returns**
    /// - `Ok(())` if the event was accepted.
    /// - `Err(..)` on any failure; the hook logs and swallows it.
    async fn report(&self, project_id: &str, event: &ErrorEvent) -> Result<(), DeliveryError>;
}

/// Destination for flat records posted to a local forwarding agent.
#[async_trait]
pub trait AgentChannel: Send + Sync {
    /// Post one flat record under the given channel tag.
    ///
    /// **Returns**
    /// - `Ok(())` if the record was handed to the agent.
    /// - `Err(..)` on any failure; the hook logs and swallows it.
    async fn post(&self, channel: &str, record: &serde_json::Value) -> Result<(), DeliveryError>;
}
