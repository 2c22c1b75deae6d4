use std::time::Duration;

use metrics::{counter, histogram};
use prstats_collector::{CollectorClient, CollectorError};
use prstats_core::{MetricSubmission, COUNT_METRIC, REPO_DIMENSION};
use prstats_util::AppConfig;
use reqwest::Client;
use thiserror::Error;
use url::Url;

/// Upper bound on one collector call, well inside GitHub's 10 s delivery timeout.
const COLLECTOR_TIMEOUT: Duration = Duration::from_secs(2);
const COLLECTOR_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Destination for derived pull request metrics.
#[derive(Clone)]
pub enum MetricsSink {
    /// Records into the process-wide Prometheus recorder served on `/metrics`.
    Recorder,
    /// Forwards each submission to a remote collector.
    Collector(CollectorClient),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("collector rejected submission: {0}")]
    Collector(#[from] CollectorError),
}

impl MetricsSink {
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        match &config.collector_url {
            Some(url) => Self::collector(url.clone()),
            None => Ok(Self::Recorder),
        }
    }

    /// Collector sink whose calls give up after [`COLLECTOR_TIMEOUT`].
    pub fn collector(base_url: Url) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(COLLECTOR_CONNECT_TIMEOUT)
            .timeout(COLLECTOR_TIMEOUT)
            .build()?;
        Ok(Self::Collector(CollectorClient::new(base_url, http)))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Recorder => "recorder",
            Self::Collector(_) => "collector",
        }
    }

    /// Delivers one submission. No retries are attempted.
    pub async fn submit(&self, submission: &MetricSubmission) -> Result<(), SinkError> {
        match self {
            Self::Recorder => {
                record(submission);
                Ok(())
            }
            Self::Collector(client) => Ok(client.put_metric_data(submission).await?),
        }
    }
}

fn record(submission: &MetricSubmission) {
    for datum in &submission.metric_data {
        let namespace = submission.namespace.clone();
        let repo = datum
            .dimension(REPO_DIMENSION)
            .unwrap_or("unknown")
            .to_string();

        if datum.metric_name == COUNT_METRIC {
            counter!(datum.metric_name.clone(), "namespace" => namespace, "repo" => repo)
                .increment(datum.value as u64);
        } else {
            histogram!(datum.metric_name.clone(), "namespace" => namespace, "repo" => repo)
                .record(datum.value);
        }
    }
}
