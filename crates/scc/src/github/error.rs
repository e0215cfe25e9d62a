//! GitHub API error types and response classification.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpResponse;
use crate::source::SourceError;

/// Cooldown used when GitHub signals a secondary rate limit without saying
/// how long to wait.
pub const DEFAULT_SECONDARY_COOLDOWN: Duration = Duration::from_secs(60);

/// Errors that can occur when talking to the GitHub REST or GraphQL API.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Secondary rate limit, retry after {retry_after:?}")]
    SecondaryRateLimit { retry_after: Duration },

    #[error("GraphQL error: {message}")]
    GraphQl {
        kind: Option<String>,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<GitHubError> for SourceError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Http(message) => SourceError::connection(message),
            GitHubError::Json(e) => SourceError::decode(e.to_string()),
            GitHubError::Api { status, message } => SourceError::Api { status, message },
            GitHubError::NotFound(resource) => SourceError::not_found(resource),
            GitHubError::SecondaryRateLimit { retry_after } => {
                SourceError::SecondaryRateLimit { retry_after }
            }
            GitHubError::GraphQl { kind, message } => match kind.as_deref() {
                Some("NOT_FOUND") => SourceError::not_found(message),
                _ => SourceError::Api {
                    status: 200,
                    message: format!("graphql: {message}"),
                },
            },
            GitHubError::Config(message) => SourceError::invalid_argument(message),
        }
    }
}

/// Pull the `message` field out of a GitHub error body, falling back to the raw text.
fn error_message(response: &HttpResponse) -> String {
    serde_json::from_slice::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|v| v.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| response.text())
}

/// Whether a 403/429 reply is GitHub's secondary (abuse) rate limit.
fn is_secondary_rate_limit(response: &HttpResponse, message: &str) -> bool {
    if response.status != 403 && response.status != 429 {
        return false;
    }
    if response.header("retry-after").is_some() {
        return true;
    }
    let message = message.to_ascii_lowercase();
    message.contains("secondary rate limit") || message.contains("abuse")
}

/// How long GitHub asks us to wait.
///
/// `Retry-After` wins; otherwise, when the primary budget is also spent,
/// wait until `x-ratelimit-reset`; otherwise one minute.
fn secondary_cooldown(response: &HttpResponse, now: DateTime<Utc>) -> Duration {
    if let Some(wait) = response.retry_after() {
        return wait;
    }

    if response.header("x-ratelimit-remaining") == Some("0")
        && let Some(reset_at) = response
            .header_value::<i64>("x-ratelimit-reset")
            .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
    {
        return (reset_at - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_secs(1));
    }

    DEFAULT_SECONDARY_COOLDOWN
}

/// Classify a non-success reply. `resource` names what was requested, for
/// not-found errors.
pub fn classify_response(response: &HttpResponse, resource: &str) -> GitHubError {
    let message = error_message(response);

    if response.status == 404 {
        return GitHubError::NotFound(resource.to_string());
    }

    if is_secondary_rate_limit(response, &message) {
        return GitHubError::SecondaryRateLimit {
            retry_after: secondary_cooldown(response, Utc::now()),
        };
    }

    GitHubError::Api {
        status: response.status,
        message,
    }
}
