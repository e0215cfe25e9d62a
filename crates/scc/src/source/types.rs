use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::Result;
use super::pagination::{PageRequest, Paged};

/// Credential supplied by the caller on every operation. Never stored.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    pub token: String,
    /// OAuth token type (`bearer`, `oauth`, ...). Empty for personal access tokens.
    #[serde(default)]
    pub token_type: String,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_type: token_type.into(),
        }
    }

    /// Personal access token with no OAuth type.
    pub fn personal(token: impl Into<String>) -> Self {
        Self::new(token, "")
    }

    /// Whether the token came from an OAuth flow rather than a personal token.
    #[must_use]
    pub fn is_oauth(&self) -> bool {
        matches!(
            self.token_type.to_ascii_lowercase().as_str(),
            "bearer" | "oauth" | "oauth2"
        )
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// A repository as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub name: String,
    /// Owning user, organization or group path.
    pub org: String,
    /// Web URL of the repository.
    pub url: String,
    /// Web URL of the repository's CI runs.
    pub ci_url: String,
}

/// An organization or group the token can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Org {
    pub name: String,
    /// Stable path or slug, usable as an owner in other calls.
    pub id: String,
}

/// Authenticated identity plus the repositories it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub repos: Vec<Repo>,
}

/// One atomic multi-file change on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub branch: String,
    pub message: String,
    pub owner: String,
    pub repo: String,
    /// File path to full file contents.
    pub content: BTreeMap<String, String>,
}

impl Commit {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Result of `create_commit_on_branch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    /// Head of the branch after the call.
    pub sha: String,
    /// False when the branch already held the requested content.
    pub created: bool,
}

/// Supported hosting providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    GitHub,
    GitLab,
}

impl SourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::GitHub => "github",
            SourceKind::GitLab => "gitlab",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" | "gh" => Ok(SourceKind::GitHub),
            "gitlab" | "gl" => Ok(SourceKind::GitLab),
            _ => Err(format!("unknown source provider: {s}")),
        }
    }
}

/// Uniform operations over a hosting provider.
///
/// Implementations hold no per-call state; every call takes the caller's
/// credential and can run concurrently with any other call.
#[async_trait]
pub trait Source: Send + Sync {
    /// Which provider this is.
    fn kind(&self) -> SourceKind;

    /// Check the token against the identity endpoint and, where the provider
    /// reports scopes, that every pattern in `required_scopes` is granted.
    async fn validate_connection(
        &self,
        token: &AccessToken,
        required_scopes: &[String],
    ) -> Result<()>;

    /// Authenticated username plus every repository it owns.
    async fn profile(&self, token: &AccessToken) -> Result<Profile>;

    /// Organizations or groups visible to the token.
    async fn list_orgs(&self, token: &AccessToken, page: Option<&PageRequest>)
    -> Result<Paged<Org>>;

    /// Repositories owned by `owner` (a user or an organization).
    async fn list_repos(
        &self,
        token: &AccessToken,
        owner: &str,
        page: Option<&PageRequest>,
    ) -> Result<Paged<Repo>>;

    /// Create `owner/name`.
    async fn create_repo(&self, token: &AccessToken, owner: &str, name: &str) -> Result<()>;

    async fn get_repo(&self, token: &AccessToken, owner: &str, name: &str) -> Result<Repo>;

    async fn get_default_branch(&self, token: &AccessToken, owner: &str, name: &str)
    -> Result<String>;

    /// Whether a secret (GitHub) or CI variable (GitLab) named `secret_name` exists.
    async fn has_secret(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        secret_name: &str,
    ) -> Result<bool>;

    /// Store `value` under `secret_name`.
    ///
    /// Fails with `RepoAlreadyConnected` when the secret exists and
    /// `overwrite` is false.
    async fn add_secret_to_repo(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        secret_name: &str,
        value: &str,
        overwrite: bool,
    ) -> Result<()>;

    /// Tag an untagged repository with the initial release tag.
    ///
    /// No-op when the repository already has a tag. `sha` defaults to the tip
    /// of the default branch. When `workflow_file_name` is given, makes sure
    /// the workflow has a run for the new tag.
    async fn initial_tag(
        &self,
        token: &AccessToken,
        full_name: &str,
        workflow_file_name: Option<&str>,
        sha: Option<&str>,
    ) -> Result<()>;

    /// Commit `commit.content` to `commit.branch`, unless the branch already
    /// holds exactly that content.
    async fn create_commit_on_branch(&self, token: &AccessToken, commit: &Commit)
    -> Result<CommitRef>;
}

/// Split `owner/repo` into its two parts.
pub(crate) fn split_full_name(full_name: &str) -> Option<(&str, &str)> {
    let mut parts = full_name.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            Some((owner, repo))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_round_trip() {
        for kind in [SourceKind::GitHub, SourceKind::GitLab] {
            assert_eq!(kind.to_string().parse::<SourceKind>(), Ok(kind));
        }
        assert_eq!("GH".parse::<SourceKind>(), Ok(SourceKind::GitHub));
        assert!("bitbucket".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_access_token_debug_redacts_secret() {
        let token = AccessToken::new("ghp_secret", "bearer");
        let debug = format!("{token:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("bearer"));
        assert!(token.is_oauth());
        assert!(!AccessToken::personal("glpat").is_oauth());
    }

    #[test]
    fn test_split_full_name() {
        assert_eq!(split_full_name("octo/demo"), Some(("octo", "demo")));
        assert_eq!(split_full_name("octo"), None);
        assert_eq!(split_full_name("octo/demo/extra"), None);
        assert_eq!(split_full_name("/demo"), None);
        assert_eq!(split_full_name("octo/"), None);
    }
}
