//! GitLab API error types and response classification.

use std::time::Duration;

use thiserror::Error;

use crate::http::HttpResponse;
use crate::source::SourceError;

/// Cooldown used when GitLab throttles without a `Retry-After` header.
pub const DEFAULT_THROTTLE_COOLDOWN: Duration = Duration::from_secs(60);

/// Errors that can occur when talking to the GitLab API.
#[derive(Debug, Error)]
pub enum GitLabError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GitLab API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<GitLabError> for SourceError {
    fn from(err: GitLabError) -> Self {
        match err {
            GitLabError::Http(message) => SourceError::connection(message),
            GitLabError::Json(e) => SourceError::decode(e.to_string()),
            GitLabError::Api { status, message } => SourceError::Api { status, message },
            GitLabError::NotFound(resource) => SourceError::not_found(resource),
            GitLabError::RateLimited { retry_after } => {
                SourceError::SecondaryRateLimit { retry_after }
            }
            GitLabError::Config(message) => SourceError::invalid_argument(message),
        }
    }
}

/// GitLab reports errors as `{"message": ...}` or `{"error": ...}`, where
/// `message` may itself be an object of field errors.
fn error_message(response: &HttpResponse) -> String {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) else {
        return response.text();
    };
    match value.get("message").or_else(|| value.get("error")) {
        Some(serde_json::Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => response.text(),
    }
}

/// Classify a non-success reply. `resource` names what was requested.
pub fn classify_response(response: &HttpResponse, resource: &str) -> GitLabError {
    match response.status {
        404 => GitLabError::NotFound(resource.to_string()),
        429 => GitLabError::RateLimited {
            retry_after: response
                .retry_after()
                .unwrap_or(DEFAULT_THROTTLE_COOLDOWN),
        },
        status => GitLabError::Api {
            status,
            message: error_message(response),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ErrorKind;

    fn response(status: u16, headers: Vec<(&str, &str)>, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn throttling_becomes_rate_limit_signal() {
        let err: SourceError =
            classify_response(&response(429, vec![("Retry-After", "4")], ""), "x").into();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));

        let err: SourceError = classify_response(&response(429, Vec::new(), ""), "x").into();
        assert_eq!(err.retry_after(), Some(DEFAULT_THROTTLE_COOLDOWN));
    }

    #[test]
    fn field_errors_are_rendered() {
        let resp = response(
            400,
            Vec::new(),
            r#"{"message":{"name":["has already been taken"]}}"#,
        );
        let err: SourceError = classify_response(&resp, "projects").into();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.to_string().contains("has already been taken"));
    }

    #[test]
    fn missing_resource_is_not_found() {
        let resp = response(404, Vec::new(), r#"{"message":"404 Variable Not Found"}"#);
        let err: SourceError = classify_response(&resp, "variable ASERTO_PUSH_KEY").into();
        assert!(err.is_not_found());
    }
}
