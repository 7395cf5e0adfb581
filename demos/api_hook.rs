use std::sync::Arc;

use tracing::{error, info};
use tracing_stackdriver_sink::api::{ApiClient, MetadataTokenSource};
use tracing_stackdriver_sink::{env, layer, Builder, MonitoredResource};

/// Ships log events straight to the cloud logging API, with error-level
/// events duplicated into the error reporting service. Run on GCE or
/// anywhere else the metadata server is reachable:
///
///   GOOGLE_CLOUD_PROJECT=my-project cargo run --example api_hook
#[tokio::main]
async fn main() {
    let project = env::project_id_from_env()
        .expect("GOOGLE_CLOUD_PROJECT must name the target project");

    let client = Arc::new(ApiClient::new(Arc::new(MetadataTokenSource::new())));
    let hook = Builder::new()
        .project_id(project)
        .resource(MonitoredResource::global())
        .log_name("api_hook_demo")
        .label("app", "api_hook_demo")
        .error_reporting_service("api-hook-demo")
        .entry_writer(client.clone())
        .error_reporter(client)
        .build()
        .expect("failed to build the stackdriver hook");

    layer::install_with_fmt(hook.clone()).expect("failed to install the subscriber");

    info!("api hook example started");
    error!(user = "demo", "simulated error sent to error reporting");

    hook.wait().await;
}
