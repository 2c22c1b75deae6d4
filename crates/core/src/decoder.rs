use serde::Deserialize;
use thiserror::Error;

use crate::types::WebhookPayload;

/// Errors that can occur while decoding a webhook body.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to parse payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parses a raw `pull_request` webhook body into a [`WebhookPayload`].
///
/// Unknown fields are ignored. `action`, `pull_request.created_at` and
/// `pull_request.base.repo.full_name` are required; `closed_at` may be absent
/// or `null`. Line and file counts default to zero when absent and must be
/// non-negative integers when present.
pub fn decode(body: &[u8]) -> Result<WebhookPayload, DecodeError> {
    let raw: RawWebhook = serde_json::from_slice(body)?;
    let pull_request = raw.pull_request;

    Ok(WebhookPayload {
        action: raw.action,
        created_at: pull_request.created_at,
        closed_at: pull_request.closed_at,
        additions: pull_request.additions,
        deletions: pull_request.deletions,
        changed_files: pull_request.changed_files,
        repository_name: pull_request.base.repo.full_name,
    })
}

#[derive(Debug, Deserialize)]
struct RawWebhook {
    action: String,
    pull_request: RawPullRequest,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    created_at: String,
    #[serde(default)]
    closed_at: Option<String>,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changed_files: u64,
    base: RawBase,
}

#[derive(Debug, Deserialize)]
struct RawBase {
    repo: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    full_name: String,
}
