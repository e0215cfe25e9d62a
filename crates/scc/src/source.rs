//! Provider-agnostic facade over source-control hosting providers.
//!
//! The [`Source`] trait is the single surface an onboarding service talks
//! to: validate a token, list what it can see, create and configure a
//! repository, commit initial files and tag the first release. GitHub and
//! GitLab implement it on top of narrow API traits, wrapping their calls in
//! the shared resilience helpers from this module:
//!
//! - [`rate_limit::with_rate_limit_retry`] waits out secondary rate limits
//! - [`crate::retry::retry`] retries eventually-consistent steps until a deadline
//! - [`pagination::paginate`] serves page requests over either page style
//!
//! # Example
//!
//! ```ignore
//! use scc::source::{AccessToken, PageRequest, SourceConfig, SourceKind};
//!
//! let source = scc::connect(SourceKind::GitHub, &SourceConfig::default())?;
//! let token = AccessToken::personal(std::env::var("GITHUB_TOKEN")?);
//! source.validate_connection(&token, &["repo".to_string()]).await?;
//! let repos = source.list_repos(&token, "octo-org", Some(&PageRequest::all())).await?;
//! ```

mod config;
mod errors;
pub mod pagination;
pub mod rate_limit;
pub mod scopes;
mod types;

pub use config::{GITHUB_API_URL, GITLAB_URL, INITIAL_TAG, SourceConfig};
pub use errors::{ErrorKind, Result, SourceError, short_error_message};
pub use pagination::{FETCH_ALL, MAX_PAGE_SIZE, PageRequest, PageResponse, Paged};
pub use rate_limit::{RateLimitPolicy, with_rate_limit_retry};
pub use types::{AccessToken, Commit, CommitRef, Org, Profile, Repo, Source, SourceKind};

pub(crate) use types::split_full_name;
