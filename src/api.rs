use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::entry::WriteRequest;
use crate::report::ErrorEvent;
use crate::sink::{DeliveryError, EntryWriter, ErrorReporter};

const LOGGING_ENDPOINT: &str = "https://logging.googleapis.com/v2/entries:write";
const REPORTING_ENDPOINT: &str = "https://clouderrorreporting.googleapis.com/v1beta1";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Supplies OAuth2 access tokens for API calls.
///
/// The client asks before every request; implementations cache as they
/// see fit. Credential files and richer auth flows stay outside this
/// crate, behind this trait.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, DeliveryError>;
}

/// Fixed token, for tests and short-lived jobs.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> StaticTokenSource {
        StaticTokenSource {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String, DeliveryError> {
        Ok(self.token.clone())
    }
}

/// Fetches tokens from the GCE metadata server, caching each one and
/// renewing it a minute before it expires.
pub struct MetadataTokenSource {
    client: Client,
    endpoint: String,
    cached: Mutex<CachedToken>,
}

#[derive(Default)]
struct CachedToken {
    token: Option<String>,
    renew_after: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl MetadataTokenSource {
    pub fn new() -> MetadataTokenSource {
        MetadataTokenSource::with_endpoint(METADATA_TOKEN_URL)
    }

    /// Points the source at a different token endpoint, for tests and
    /// metadata proxies.
    pub fn with_endpoint(endpoint: impl Into<String>) -> MetadataTokenSource {
        MetadataTokenSource {
            client: Client::new(),
            endpoint: endpoint.into(),
            cached: Mutex::new(CachedToken::default()),
        }
    }
}

impl Default for MetadataTokenSource {
    fn default() -> Self {
        MetadataTokenSource::new()
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<String, DeliveryError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = &cached.token {
            if Utc::now() < cached.renew_after {
                return Ok(token.clone());
            }
        }

        let response = self
            .client
            .get(&self.endpoint)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|source| DeliveryError::Transport {
                context: "fetching an access token from the metadata server",
                source,
            })?;
        let response = check_status(response, "fetching an access token").await?;
        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|source| DeliveryError::Transport {
                    context: "decoding the access token response",
                    source,
                })?;

        cached.renew_after =
            Utc::now() + chrono::Duration::seconds(token.expires_in.saturating_sub(60) as i64);
        cached.token = Some(token.access_token.clone());
        Ok(token.access_token)
    }
}

/// REST client for the Cloud Logging and Error Reporting APIs.
///
/// Implements both API delivery capabilities, so a single instance can
/// serve as the hook's entry writer and error reporter.
pub struct ApiClient {
    client: Client,
    tokens: Arc<dyn TokenSource>,
    logging_endpoint: String,
    reporting_endpoint: String,
}

impl ApiClient {
    pub fn new(tokens: Arc<dyn TokenSource>) -> ApiClient {
        ApiClient::with_endpoints(tokens, LOGGING_ENDPOINT, REPORTING_ENDPOINT)
    }

    /// Points the client at different endpoints, for tests and
    /// API-compatible proxies.
    pub fn with_endpoints(
        tokens: Arc<dyn TokenSource>,
        logging_endpoint: impl Into<String>,
        reporting_endpoint: impl Into<String>,
    ) -> ApiClient {
        ApiClient {
            client: Client::new(),
            tokens,
            logging_endpoint: logging_endpoint.into(),
            reporting_endpoint: reporting_endpoint.into(),
        }
    }

    fn report_url(&self, project_id: &str) -> String {
        format!(
            "{}/projects/{}/events:report",
            self.reporting_endpoint,
            urlencoding::encode(project_id)
        )
    }
}

#[async_trait]
impl EntryWriter for ApiClient {
    async fn write(&self, request: &WriteRequest) -> Result<(), DeliveryError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(&self.logging_endpoint)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|source| DeliveryError::Transport {
                context: "posting entries to the logging API",
                source,
            })?;
        check_status(response, "writing log entries").await?;
        Ok(())
    }
}

#[async_trait]
impl ErrorReporter for ApiClient {
    async fn report(&self, project_id: &str, event: &ErrorEvent) -> Result<(), DeliveryError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(self.report_url(project_id))
            .bearer_auth(token)
            .json(event)
            .send()
            .await
            .map_err(|source| DeliveryError::Transport {
                context: "posting an event to the error reporting API",
                source,
            })?;
        check_status(response, "reporting an error event").await?;
        Ok(())
    }
}

async fn check_status(
    response: reqwest::Response,
    context: &'static str,
) -> Result<reqwest::Response, DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DeliveryError::Status {
        context,
        status: status.as_u16(),
        body,
    })
}
