use crate::types::Headers;

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const PULL_REQUEST_EVENT: &str = "pull_request";

/// Returns `true` when the delivery is a `pull_request` event.
///
/// The header name is matched ignoring case; the value must be exactly
/// `pull_request`.
pub fn is_relevant(headers: &Headers) -> bool {
    headers
        .get_all(EVENT_HEADER)
        .any(|value| value == PULL_REQUEST_EVENT)
}

/// Event name reported by the sender, used for logging ignored deliveries.
pub fn event_name(headers: &Headers) -> Option<&str> {
    headers.get(EVENT_HEADER)
}
