use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_stackdriver_sink::agent::ForwardClient;
use tracing_stackdriver_sink::{layer, Builder};

/// Ships log events to a local forwarding agent (fluentd with the
/// google-fluentd output) listening on the default forward port:
///
///   cargo run --example agent_hook
#[tokio::main]
async fn main() {
    let hook = Builder::new()
        .agent_channel(Arc::new(ForwardClient::localhost()))
        .log_name("agent_hook_demo")
        .build()
        .expect("failed to build the stackdriver hook");

    layer::install_with_fmt(hook.clone()).expect("failed to install the subscriber");

    info!("agent hook example started");
    warn!(disk = "sda1", "disk usage above threshold");
    error!(user = "demo", "simulated error forwarded to the agent");

    hook.wait().await;
}
