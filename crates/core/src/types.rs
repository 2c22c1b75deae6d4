use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the dimension attached to every emitted data point.
pub const REPO_DIMENSION: &str = "repo";
/// Metric counting processed closed pull requests.
pub const COUNT_METRIC: &str = "prcount";
/// Metric carrying `additions + deletions`.
pub const SIZE_METRIC: &str = "prsize";
/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "SSDL";

/// Request headers with case-insensitive name lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Returns the first value whose header name matches `name` ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns every value whose header name matches `name` ignoring ASCII case.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// A single webhook delivery as handed over by the HTTP host.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    headers: Headers,
    body: Vec<u8>,
}

impl InboundRequest {
    pub fn new(headers: Headers, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Raw body bytes exactly as received; the signature covers these bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Decoded subset of a GitHub `pull_request` webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookPayload {
    pub action: String,
    pub created_at: String,
    /// `None` while the pull request is still open.
    pub closed_at: Option<String>,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    /// Fully qualified `owner/name` of the base repository.
    pub repository_name: String,
}

impl WebhookPayload {
    /// Returns `true` when the delivery reports a closed pull request with a close timestamp.
    pub fn is_closed(&self) -> bool {
        self.action == "closed" && self.closed_at.is_some()
    }
}

/// Metrics derived from one closed pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedMetrics {
    pub count: u64,
    /// Time the pull request was open, in `unit`, never below 1.
    pub duration: u64,
    pub unit: DurationUnit,
    pub size: u64,
    pub changed_files: u64,
    pub dimension: String,
}

impl DerivedMetrics {
    /// Data points emitted for this pull request, each tagged with the repository dimension.
    pub fn data_points(&self) -> Vec<MetricDatum> {
        let dimensions = vec![Dimension::new(REPO_DIMENSION, self.dimension.clone())];
        vec![
            MetricDatum {
                metric_name: COUNT_METRIC.to_string(),
                unit: MetricUnit::Count,
                value: self.count as f64,
                dimensions: dimensions.clone(),
            },
            MetricDatum {
                metric_name: self.unit.metric_name().to_string(),
                unit: self.unit.datum_unit(),
                value: self.duration as f64,
                dimensions: dimensions.clone(),
            },
            MetricDatum {
                metric_name: SIZE_METRIC.to_string(),
                unit: MetricUnit::Count,
                value: self.size as f64,
                dimensions,
            },
        ]
    }
}

/// Unit the open duration of a pull request is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationUnit {
    Seconds,
    Hours,
    #[default]
    Days,
}

impl DurationUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seconds => "seconds",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }

    /// Name of the data point carrying the duration.
    pub fn metric_name(self) -> &'static str {
        match self {
            Self::Seconds | Self::Hours => "prduration",
            Self::Days => "prdays",
        }
    }

    fn datum_unit(self) -> MetricUnit {
        match self {
            Self::Seconds => MetricUnit::Seconds,
            Self::Hours | Self::Days => MetricUnit::None,
        }
    }
}

impl FromStr for DurationUnit {
    type Err = UnknownSetting;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "seconds" | "secs" => Ok(Self::Seconds),
            "hours" => Ok(Self::Hours),
            "days" => Ok(Self::Days),
            _ => Err(UnknownSetting {
                setting: "duration unit",
                value: value.to_string(),
            }),
        }
    }
}

/// How the deriver treats timestamps that do not parse as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPolicy {
    /// Log the failure and use the zero instant in its place.
    #[default]
    Lenient,
    /// Reject the delivery.
    Strict,
}

impl TimestampPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }
}

impl FromStr for TimestampPolicy {
    type Err = UnknownSetting;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            _ => Err(UnknownSetting {
                setting: "timestamp policy",
                value: value.to_string(),
            }),
        }
    }
}

/// Returned when a textual setting does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported {setting} '{value}'")]
pub struct UnknownSetting {
    pub setting: &'static str,
    pub value: String,
}

/// Unit attached to a data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    Count,
    Seconds,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One named, dimensioned numeric observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDatum {
    pub metric_name: String,
    pub unit: MetricUnit,
    pub value: f64,
    pub dimensions: Vec<Dimension>,
}

impl MetricDatum {
    /// Value of the dimension called `name`, if attached.
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|dimension| dimension.name == name)
            .map(|dimension| dimension.value.as_str())
    }
}

/// Batch of data points delivered to the metrics backend in one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSubmission {
    pub namespace: String,
    pub metric_data: Vec<MetricDatum>,
}

/// Terminal answer to the webhook sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundResponse {
    pub status: u16,
    pub body: String,
}

impl OutboundResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}
