//! Request pipeline: verify, filter, decode, derive.
//!
//! [`Pipeline::evaluate`] never fails. Every recognized problem with a
//! delivery ends in an [`Outcome`] that maps onto a fixed status/body pair, and
//! only a successfully derived closed pull request carries a
//! [`MetricSubmission`] for the caller to emit.

use tracing::{info, warn};

use crate::decoder;
use crate::deriver::{DeriveError, MetricDeriver};
use crate::filter;
use crate::signature::{SignatureError, SignatureVerifier};
use crate::types::{
    DerivedMetrics, DurationUnit, InboundRequest, MetricSubmission, OutboundResponse,
    TimestampPolicy, DEFAULT_NAMESPACE,
};

/// Settings injected into the pipeline by the host.
#[derive(Clone)]
pub struct PipelineSettings {
    pub secret: Vec<u8>,
    pub namespace: String,
    pub duration_unit: DurationUnit,
    pub timestamp_policy: TimestampPolicy,
}

impl PipelineSettings {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            duration_unit: DurationUnit::default(),
            timestamp_policy: TimestampPolicy::default(),
        }
    }
}

impl std::fmt::Debug for PipelineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSettings")
            .field("secret", &"<redacted>")
            .field("namespace", &self.namespace)
            .field("duration_unit", &self.duration_unit)
            .field("timestamp_policy", &self.timestamp_policy)
            .finish()
    }
}

/// Terminal classification of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    MissingSignature,
    InvalidSignature,
    IgnoredEvent,
    ParseError,
    NotClosed,
    InvalidTimestamp,
    Recorded,
}

impl Outcome {
    pub fn status(self) -> u16 {
        match self {
            Self::MissingSignature
            | Self::InvalidSignature
            | Self::ParseError
            | Self::InvalidTimestamp => 400,
            Self::IgnoredEvent | Self::NotClosed | Self::Recorded => 200,
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            Self::MissingSignature => "Missing signature",
            Self::InvalidSignature => "Invalid Signature",
            Self::IgnoredEvent => "Ignored event",
            Self::ParseError => "Parse error",
            Self::NotClosed => "Pull request not closed",
            Self::InvalidTimestamp => "Invalid timestamp",
            Self::Recorded => "Metrics recorded",
        }
    }

    /// Label used for service metrics.
    pub fn metric_label(self) -> &'static str {
        match self {
            Self::MissingSignature => "missing_signature",
            Self::InvalidSignature => "invalid_signature",
            Self::IgnoredEvent => "ignored_event",
            Self::ParseError => "parse_error",
            Self::NotClosed => "not_closed",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::Recorded => "recorded",
        }
    }

    pub fn response(self) -> OutboundResponse {
        OutboundResponse::new(self.status(), self.body())
    }
}

impl From<SignatureError> for Outcome {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Missing => Self::MissingSignature,
            SignatureError::Mismatch => Self::InvalidSignature,
        }
    }
}

/// Result of running one request through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub outcome: Outcome,
    pub response: OutboundResponse,
    pub metrics: Option<DerivedMetrics>,
    /// Present only for [`Outcome::Recorded`].
    pub submission: Option<MetricSubmission>,
}

impl Evaluation {
    fn terminal(outcome: Outcome) -> Self {
        Self {
            outcome,
            response: outcome.response(),
            metrics: None,
            submission: None,
        }
    }

    fn recorded(namespace: &str, metrics: DerivedMetrics) -> Self {
        let submission = MetricSubmission {
            namespace: namespace.to_string(),
            metric_data: metrics.data_points(),
        };
        Self {
            outcome: Outcome::Recorded,
            response: Outcome::Recorded.response(),
            metrics: Some(metrics),
            submission: Some(submission),
        }
    }
}

/// Stateless webhook pipeline shared by all requests.
#[derive(Debug, Clone)]
pub struct Pipeline {
    verifier: SignatureVerifier,
    deriver: MetricDeriver,
    namespace: String,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            verifier: SignatureVerifier::new(&settings.secret),
            deriver: MetricDeriver::new(settings.duration_unit, settings.timestamp_policy),
            namespace: settings.namespace,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Runs a delivery through verification, filtering, decoding and derivation.
    pub fn evaluate(&self, request: &InboundRequest) -> Evaluation {
        if let Err(err) = self.verifier.verify_request(request) {
            warn!(stage = "verify", error = %err, "rejected webhook signature");
            return Evaluation::terminal(err.into());
        }

        let headers = request.headers();
        if !filter::is_relevant(headers) {
            info!(
                stage = "filter",
                event = filter::event_name(headers).unwrap_or("<none>"),
                "ignoring webhook event"
            );
            return Evaluation::terminal(Outcome::IgnoredEvent);
        }

        let payload = match decoder::decode(request.body()) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(stage = "decode", error = %err, "failed to decode webhook payload");
                return Evaluation::terminal(Outcome::ParseError);
            }
        };

        if !payload.is_closed() {
            info!(
                stage = "filter",
                action = %payload.action,
                repo = %payload.repository_name,
                "pull request not closed, skipping"
            );
            return Evaluation::terminal(Outcome::NotClosed);
        }

        match self.deriver.derive(&payload) {
            Ok(metrics) => {
                info!(
                    stage = "derive",
                    repo = %metrics.dimension,
                    duration = metrics.duration,
                    unit = metrics.unit.as_str(),
                    size = metrics.size,
                    changed_files = metrics.changed_files,
                    "closed pull request measured"
                );
                Evaluation::recorded(&self.namespace, metrics)
            }
            Err(DeriveError::NotClosed) => Evaluation::terminal(Outcome::NotClosed),
            Err(err @ DeriveError::InvalidTimestamp { .. }) => {
                warn!(stage = "derive", error = %err, "rejected webhook timestamp");
                Evaluation::terminal(Outcome::InvalidTimestamp)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Headers, MetricUnit, REPO_DIMENSION};
    use serde_json::{json, Value};

    const SECRET: &str = "pipeline-secret";

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineSettings::new(SECRET))
    }

    fn closed_body(created_at: &str, closed_at: Value, action: &str) -> String {
        json!({
            "action": action,
            "pull_request": {
                "created_at": created_at,
                "closed_at": closed_at,
                "additions": 10,
                "deletions": 5,
                "changed_files": 3,
                "base": {"repo": {"full_name": "acme/widget"}}
            }
        })
        .to_string()
    }

    fn signed_request(pipeline: &Pipeline, event: &str, body: &str) -> InboundRequest {
        let signature = pipeline.verifier().sign(body.as_bytes()).expect("sign");
        InboundRequest::new(Headers::new(), body)
            .with_header("X-Hub-Signature", signature)
            .with_header("X-GitHub-Event", event)
    }

    #[test]
    fn records_closed_pull_request() {
        let pipeline = pipeline();
        let body = closed_body(
            "2020-01-01T00:00:00Z",
            json!("2020-01-03T00:00:00Z"),
            "closed",
        );
        let evaluation = pipeline.evaluate(&signed_request(&pipeline, "pull_request", &body));

        assert_eq!(evaluation.outcome, Outcome::Recorded);
        assert_eq!(evaluation.response, OutboundResponse::new(200, "Metrics recorded"));

        let submission = evaluation.submission.expect("submission");
        assert_eq!(submission.namespace, "SSDL");
        let by_name = |name: &str| {
            submission
                .metric_data
                .iter()
                .find(|datum| datum.metric_name == name)
                .cloned()
                .unwrap_or_else(|| panic!("missing {name}"))
        };
        assert_eq!(by_name("prcount").value, 1.0);
        assert_eq!(by_name("prcount").unit, MetricUnit::Count);
        assert!(by_name("prdays").value >= 1.0);
        assert_eq!(by_name("prsize").value, 15.0);
        assert!(submission
            .metric_data
            .iter()
            .all(|datum| datum.dimension(REPO_DIMENSION) == Some("acme/widget")));
    }

    #[test]
    fn missing_signature_is_rejected_before_anything_else() {
        let pipeline = pipeline();
        let request = InboundRequest::new(Headers::new(), "not json")
            .with_header("X-GitHub-Event", "push");

        let evaluation = pipeline.evaluate(&request);
        assert_eq!(evaluation.outcome, Outcome::MissingSignature);
        assert_eq!(evaluation.response, OutboundResponse::new(400, "Missing signature"));
        assert!(evaluation.submission.is_none());
    }

    #[test]
    fn mismatched_signature_is_rejected() {
        let pipeline = pipeline();
        let body = closed_body("2020-01-01T00:00:00Z", json!("2020-01-03T00:00:00Z"), "closed");
        let request = InboundRequest::new(Headers::new(), body)
            .with_header("x-hub-signature", "sha1=0000000000000000000000000000000000000000")
            .with_header("X-GitHub-Event", "pull_request");

        let evaluation = pipeline.evaluate(&request);
        assert_eq!(evaluation.response, OutboundResponse::new(400, "Invalid Signature"));
    }

    #[test]
    fn header_name_case_does_not_matter() {
        let pipeline = pipeline();
        let body = closed_body("2020-01-01T00:00:00Z", json!("2020-01-03T00:00:00Z"), "closed");
        let signature = pipeline.verifier().sign(body.as_bytes()).expect("sign");
        let request = InboundRequest::new(Headers::new(), body.clone())
            .with_header("x-hub-signature", signature)
            .with_header("x-github-event", "pull_request");

        let lower = pipeline.evaluate(&request);
        let canonical = pipeline.evaluate(&signed_request(&pipeline, "pull_request", &body));
        assert_eq!(lower, canonical);
    }

    #[test]
    fn other_events_are_acknowledged_and_ignored() {
        let pipeline = pipeline();
        for event in ["push", "issues", "Pull_Request"] {
            let evaluation = pipeline.evaluate(&signed_request(&pipeline, event, "{}"));
            assert_eq!(evaluation.outcome, Outcome::IgnoredEvent);
            assert_eq!(evaluation.response.status, 200);
            assert!(evaluation.submission.is_none());
        }
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let pipeline = pipeline();
        let evaluation = pipeline.evaluate(&signed_request(&pipeline, "pull_request", "{oops"));
        assert_eq!(evaluation.response, OutboundResponse::new(400, "Parse error"));
    }

    #[test]
    fn open_or_unclosed_pull_requests_emit_nothing() {
        let pipeline = pipeline();
        let opened = closed_body("2020-01-01T00:00:00Z", Value::Null, "opened");
        let closed_without_time = closed_body("2020-01-01T00:00:00Z", Value::Null, "closed");
        let edited_with_time = closed_body(
            "2020-01-01T00:00:00Z",
            json!("2020-01-03T00:00:00Z"),
            "edited",
        );

        for body in [opened, closed_without_time, edited_with_time] {
            let evaluation = pipeline.evaluate(&signed_request(&pipeline, "pull_request", &body));
            assert_eq!(evaluation.outcome, Outcome::NotClosed);
            assert_eq!(
                evaluation.response,
                OutboundResponse::new(200, "Pull request not closed")
            );
            assert!(evaluation.submission.is_none());
        }
    }

    #[test]
    fn zero_elapsed_duration_reports_one() {
        let pipeline = pipeline();
        let body = closed_body(
            "2020-01-01T00:00:00Z",
            json!("2020-01-01T00:00:00Z"),
            "closed",
        );
        let evaluation = pipeline.evaluate(&signed_request(&pipeline, "pull_request", &body));
        let metrics = evaluation.metrics.expect("metrics");
        assert_eq!(metrics.duration, 1);
    }

    #[test]
    fn strict_timestamps_reject_the_delivery() {
        let mut settings = PipelineSettings::new(SECRET);
        settings.timestamp_policy = TimestampPolicy::Strict;
        settings.duration_unit = DurationUnit::Hours;
        settings.namespace = "PRStats".to_string();
        let pipeline = Pipeline::new(settings);

        let body = closed_body("garbage", json!("2020-01-01T00:00:00Z"), "closed");
        let evaluation = pipeline.evaluate(&signed_request(&pipeline, "pull_request", &body));
        assert_eq!(evaluation.response, OutboundResponse::new(400, "Invalid timestamp"));
        assert!(evaluation.submission.is_none());
        assert_eq!(pipeline.namespace(), "PRStats");
    }
}
