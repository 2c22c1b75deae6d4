//! Pull-request metrics pipeline for GitHub webhooks.
//!
//! The crate is free of I/O: the host hands over an [`InboundRequest`] and
//! receives an [`Evaluation`] holding the response and, for closed pull
//! requests, the [`MetricSubmission`] to deliver.

pub mod decoder;
pub mod deriver;
pub mod filter;
pub mod pipeline;
pub mod signature;
pub mod types;

pub use decoder::{decode, DecodeError};
pub use deriver::{DeriveError, MetricDeriver};
pub use filter::is_relevant;
pub use pipeline::{Evaluation, Outcome, Pipeline, PipelineSettings};
pub use signature::{SignatureError, SignatureVerifier};
pub use types::{
    DerivedMetrics, Dimension, DurationUnit, Headers, InboundRequest, MetricDatum,
    MetricSubmission, MetricUnit, OutboundResponse, TimestampPolicy, UnknownSetting,
    WebhookPayload, COUNT_METRIC, DEFAULT_NAMESPACE, REPO_DIMENSION, SIZE_METRIC,
};
