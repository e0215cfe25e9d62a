//! scc - source-control provider abstraction.
//!
//! One [`Source`](source::Source) interface for provisioning and configuring
//! repositories on GitHub and GitLab: validate a token, list organizations
//! and repositories, create a repository, store CI secrets, commit initial
//! files and tag the first release.
//!
//! # Features
//!
//! - `github` - GitHub provider (REST + GraphQL, sealed-box secrets)
//! - `gitlab` - GitLab provider (v4 REST)
//!
//! # Example
//!
//! ```ignore
//! use scc::source::{AccessToken, SourceConfig, SourceKind};
//!
//! let source = scc::connect(SourceKind::GitLab, &SourceConfig::default())?;
//! let token = AccessToken::personal("glpat-...");
//! let profile = source.profile(&token).await?;
//! ```

pub mod http;
pub mod retry;
pub mod source;

#[cfg(feature = "github")]
pub mod github;

#[cfg(feature = "gitlab")]
pub mod gitlab;

pub use source::{
    AccessToken, Commit, CommitRef, ErrorKind, Org, PageRequest, PageResponse, Paged, Profile,
    Repo, Result, Source, SourceConfig, SourceError, SourceKind,
};

/// Build the facade for `kind` over the real provider clients.
#[cfg_attr(
    not(any(feature = "github", feature = "gitlab")),
    allow(unused_variables)
)]
pub fn connect(kind: SourceKind, config: &SourceConfig) -> Result<Box<dyn Source>> {
    match kind {
        #[cfg(feature = "github")]
        SourceKind::GitHub => Ok(Box::new(github::GitHubSource::from_config(config)?)),
        #[cfg(feature = "gitlab")]
        SourceKind::GitLab => Ok(Box::new(gitlab::GitLabSource::from_config(config)?)),
        #[cfg(not(all(feature = "github", feature = "gitlab")))]
        other => Err(SourceError::invalid_argument(format!(
            "provider {other} is not enabled in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(all(feature = "github", feature = "gitlab"))]
    #[test]
    fn test_connect_builds_each_provider() {
        let config = SourceConfig::default();
        for kind in [SourceKind::GitHub, SourceKind::GitLab] {
            let source = connect(kind, &config).expect("source");
            assert_eq!(source.kind(), kind);
        }
    }

    #[cfg(feature = "github")]
    #[test]
    fn test_connect_rejects_bad_endpoint() {
        let config = SourceConfig {
            github_api_url: "not a url".to_string(),
            ..SourceConfig::default()
        };
        match connect(SourceKind::GitHub, &config) {
            Err(err) => assert_eq!(err.kind(), ErrorKind::InvalidArgument),
            Ok(_) => panic!("invalid url accepted"),
        }
    }

    #[cfg(not(all(feature = "github", feature = "gitlab")))]
    #[test]
    fn test_connect_rejects_disabled_provider() {
        let disabled = if cfg!(feature = "github") {
            SourceKind::GitLab
        } else {
            SourceKind::GitHub
        };
        match connect(disabled, &SourceConfig::default()) {
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::InvalidArgument);
                assert!(err.to_string().contains("not enabled"));
            }
            Ok(_) => panic!("disabled provider connected"),
        }
    }
}
