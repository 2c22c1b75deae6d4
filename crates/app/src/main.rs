mod router;
mod sink;
mod telemetry;
mod webhook;

use std::net::SocketAddr;

use prstats_core::{Pipeline, PipelineSettings};
use prstats_util::{load_env_file, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let pipeline = Pipeline::new(PipelineSettings {
        secret: config.webhook_secret.to_vec(),
        namespace: config.metrics_namespace.clone(),
        duration_unit: config.duration_unit,
        timestamp_policy: config.timestamp_policy,
    });
    let sink = sink::MetricsSink::from_config(&config)?;
    let state = router::AppState::new(metrics, pipeline, sink.clone());

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        sink = sink.label(),
        namespace = %config.metrics_namespace,
        duration_unit = config.duration_unit.as_str(),
        timestamp_policy = config.timestamp_policy.as_str(),
        "starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
