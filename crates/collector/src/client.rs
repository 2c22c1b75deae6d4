use prstats_core::MetricSubmission;
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tracing::debug;
use url::Url;

const PUT_METRIC_DATA_PATH: &str = "metrics";

/// Client delivering metric submissions to a remote collector.
///
/// Submissions are POSTed as JSON to `<base_url>/metrics`. The base URL is
/// expected to end with a `/` so that joining keeps any path prefix.
#[derive(Clone)]
pub struct CollectorClient {
    http: Client,
    base_url: Url,
}

impl CollectorClient {
    pub fn new(base_url: Url, http: Client) -> Self {
        Self { http, base_url }
    }

    /// Sends one batch of data points. The call is made exactly once.
    pub async fn put_metric_data(
        &self,
        submission: &MetricSubmission,
    ) -> Result<(), CollectorError> {
        let url = self.base_url.join(PUT_METRIC_DATA_PATH)?;
        debug!(
            stage = "emit",
            %url,
            namespace = %submission.namespace,
            points = submission.metric_data.len(),
            "posting metric data"
        );

        let response = self.http.post(url).json(submission).send().await?;
        ensure_success(response).await
    }
}

/// Errors produced by the collector client.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn ensure_success(response: Response) -> Result<(), CollectorError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(CollectorError::Status { status, body });
    }
    Ok(())
}
