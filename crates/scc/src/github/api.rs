//! Narrow capability traits over the GitHub APIs.
//!
//! [`GitHubSource`](super::GitHubSource) only talks to GitHub through these
//! traits, so tests can swap in in-memory fakes. [`GitHubClient`](super::GitHubClient)
//! implements both over an [`HttpTransport`](crate::http::HttpTransport).

use async_trait::async_trait;

use super::types::{
    BranchSnapshot, CommitOnBranchInput, GitHubCommit, GitHubPublicKey, GitHubRef, GitHubRepo,
    GitHubTag, IdentityReply, RepoNode, ViewerRepositories, WorkflowRun,
};
use crate::source::pagination::{Cursor, Page, PageQuery};
use crate::source::{AccessToken, Result};

/// GitHub REST v3 operations.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// `GET /user`. Non-success replies are returned, not raised.
    async fn authenticated_user(&self, token: &AccessToken) -> Result<IdentityReply>;

    async fn get_repo(&self, token: &AccessToken, owner: &str, repo: &str) -> Result<GitHubRepo>;

    /// Create `name` in `org`, or in the authenticated user's namespace when `org` is `None`.
    /// The repository is initialised with a first commit.
    async fn create_repo(
        &self,
        token: &AccessToken,
        org: Option<&str>,
        name: &str,
    ) -> Result<GitHubRepo>;

    async fn list_tags(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        per_page: u32,
    ) -> Result<Vec<GitHubTag>>;

    /// Look up a ref such as `heads/main`.
    async fn get_ref(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<GitHubRef>;

    /// Names of every Actions secret on the repository.
    async fn list_secret_names(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<String>>;

    async fn get_public_key(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
    ) -> Result<GitHubPublicKey>;

    async fn put_secret(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        name: &str,
        encrypted_value: &str,
        key_id: &str,
    ) -> Result<()>;

    /// Runs of the workflow defined in `.github/workflows/<workflow_file>`.
    async fn list_workflow_runs(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        workflow_file: &str,
    ) -> Result<Vec<WorkflowRun>>;

    /// Fire a `workflow_dispatch` event for `workflow_file` at `git_ref`.
    async fn dispatch_workflow(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        workflow_file: &str,
        git_ref: &str,
    ) -> Result<()>;

    async fn get_commit(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<GitHubCommit>;
}

/// GitHub GraphQL v4 operations.
#[async_trait]
pub trait GitHubGraphQl: Send + Sync {
    /// The viewer's login and one page of repositories they own.
    async fn viewer_repositories(
        &self,
        token: &AccessToken,
        query: PageQuery<Cursor>,
    ) -> Result<ViewerRepositories>;

    /// Logins of organizations the viewer belongs to.
    async fn viewer_organizations(
        &self,
        token: &AccessToken,
        query: PageQuery<Cursor>,
    ) -> Result<Page<String, Cursor>>;

    /// Repository search, e.g. `user:octo-org`.
    async fn search_repositories(
        &self,
        token: &AccessToken,
        search: &str,
        query: PageQuery<Cursor>,
    ) -> Result<Page<RepoNode, Cursor>>;

    /// Tip of `branch` and the text of each of `paths` on it.
    async fn branch_snapshot(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        branch: &str,
        paths: &[&str],
    ) -> Result<BranchSnapshot>;

    /// Returns the oid of the new commit.
    async fn create_commit_on_branch(
        &self,
        token: &AccessToken,
        input: &CommitOnBranchInput,
    ) -> Result<String>;

    /// Create a fully qualified ref (`refs/tags/...`) at `oid`.
    async fn create_ref(
        &self,
        token: &AccessToken,
        repository_id: &str,
        name: &str,
        oid: &str,
    ) -> Result<()>;
}
