use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use metrics::{counter, histogram};
use prstats_core::{Headers, InboundRequest, MetricSubmission, OutboundResponse, Outcome};
use tracing::{error, info};

use crate::router::AppState;

/// Receives a GitHub webhook delivery and answers with a plain-text status.
///
/// The response is decided by the pipeline alone; metric submission happens
/// afterwards and its failures are logged without changing the answer.
pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let start = Instant::now();
    let request = inbound_request(&headers, &body);

    let evaluation = state.pipeline().evaluate(&request);
    let outcome = evaluation.outcome;
    let label = outcome.metric_label();

    if matches!(
        outcome,
        Outcome::MissingSignature | Outcome::InvalidSignature
    ) {
        counter!("webhook_invalid_signature_total", "reason" => label).increment(1);
    }

    if let Some(submission) = evaluation.submission.as_ref() {
        emit(&state, submission).await;
    }

    counter!("webhook_requests_total", "outcome" => label).increment(1);
    histogram!("webhook_ack_latency_seconds", "outcome" => label)
        .record(start.elapsed().as_secs_f64());
    info!(
        stage = "ingress",
        outcome = label,
        status = evaluation.response.status,
        body_len = body.len(),
        "webhook processed"
    );

    into_response(evaluation.response)
}

async fn emit(state: &AppState, submission: &MetricSubmission) {
    let sink = state.sink();
    match sink.submit(submission).await {
        Ok(()) => info!(
            stage = "emit",
            sink = sink.label(),
            namespace = %submission.namespace,
            points = submission.metric_data.len(),
            "metrics submitted"
        ),
        Err(err) => {
            counter!("metrics_submission_failures_total", "sink" => sink.label()).increment(1);
            error!(
                stage = "emit",
                sink = sink.label(),
                namespace = %submission.namespace,
                error = %err,
                "metric submission failed"
            );
        }
    }
}

fn inbound_request(headers: &HeaderMap, body: &Bytes) -> InboundRequest {
    let headers: Headers = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
        .collect();
    InboundRequest::new(headers, body.to_vec())
}

fn into_response(response: OutboundResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        response.body,
    )
        .into_response()
}
