//! Timeouts, retry budgets and endpoints shared by both providers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default public GitHub REST endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Default public GitLab host.
pub const GITLAB_URL: &str = "https://gitlab.com";

/// Tag created by `initial_tag` on an untagged repository.
pub const INITIAL_TAG: &str = "v0.0.0";

/// Settings for the provider facades.
///
/// Durations are whole seconds so the struct loads directly from TOML or
/// `SCC_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Budget for writes that race with repository initialisation.
    pub create_repo_timeout_secs: u64,
    /// Budget for waiting on tags, workflow runs and fresh commits.
    pub wait_tag_timeout_secs: u64,
    /// Budget for a single call across secondary rate-limit cooldowns.
    pub rate_limit_timeout_secs: u64,
    /// Attempts per call when the provider keeps answering with a rate limit.
    pub rate_limit_retry_count: u32,
    /// GitHub REST base URL; GraphQL is served from `<base>/graphql`.
    pub github_api_url: String,
    /// GitLab host; the v4 API is served from `<host>/api/v4`.
    pub gitlab_url: String,
    /// Per-request HTTP timeout.
    pub http_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            create_repo_timeout_secs: 30,
            wait_tag_timeout_secs: 20,
            rate_limit_timeout_secs: 120,
            rate_limit_retry_count: 5,
            github_api_url: GITHUB_API_URL.to_string(),
            gitlab_url: GITLAB_URL.to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl SourceConfig {
    #[must_use]
    pub fn create_repo_timeout(&self) -> Duration {
        Duration::from_secs(self.create_repo_timeout_secs)
    }

    #[must_use]
    pub fn wait_tag_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_tag_timeout_secs)
    }

    #[must_use]
    pub fn rate_limit_timeout(&self) -> Duration {
        Duration::from_secs(self.rate_limit_timeout_secs)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Config with every retry budget set to zero: one attempt per call.
    #[must_use]
    pub fn without_retries() -> Self {
        Self {
            create_repo_timeout_secs: 0,
            wait_tag_timeout_secs: 0,
            rate_limit_timeout_secs: 0,
            rate_limit_retry_count: 1,
            ..Self::default()
        }
    }
}
