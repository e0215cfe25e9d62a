//! Narrow capability trait over the GitLab v4 REST API.
//!
//! Projects are addressed by their full path (`group/subgroup/project`).

use async_trait::async_trait;

use super::types::{
    CommitAction, GitLabBranch, GitLabCommit, GitLabFile, GitLabGroup, GitLabNamespace,
    GitLabProject, GitLabTag, GitLabVariable, UserReply,
};
use crate::source::pagination::{Page, PageQuery};
use crate::source::{AccessToken, Result};

#[async_trait]
pub trait GitLabApi: Send + Sync {
    /// `GET /user`. Non-success replies are returned, not raised.
    async fn current_user(&self, token: &AccessToken) -> Result<UserReply>;

    async fn list_user_projects(
        &self,
        token: &AccessToken,
        user: &str,
        query: PageQuery<u32>,
    ) -> Result<Page<GitLabProject, u32>>;

    async fn list_group_projects(
        &self,
        token: &AccessToken,
        group: &str,
        query: PageQuery<u32>,
    ) -> Result<Page<GitLabProject, u32>>;

    /// Groups, top-level and nested, where the token has at least developer access.
    async fn list_groups(
        &self,
        token: &AccessToken,
        query: PageQuery<u32>,
    ) -> Result<Page<GitLabGroup, u32>>;

    async fn get_project(&self, token: &AccessToken, project: &str) -> Result<GitLabProject>;

    /// Look up a user or group namespace by path.
    async fn get_namespace(&self, token: &AccessToken, path: &str) -> Result<GitLabNamespace>;

    /// Create a public project `name` in `namespace_id`.
    async fn create_project(
        &self,
        token: &AccessToken,
        name: &str,
        namespace_id: u64,
    ) -> Result<GitLabProject>;

    /// Protect tags matching `pattern`, allowing maintainers to create them.
    async fn protect_tags(&self, token: &AccessToken, project: &str, pattern: &str) -> Result<()>;

    async fn list_tags(
        &self,
        token: &AccessToken,
        project: &str,
        per_page: u32,
    ) -> Result<Vec<GitLabTag>>;

    async fn get_branch(
        &self,
        token: &AccessToken,
        project: &str,
        branch: &str,
    ) -> Result<GitLabBranch>;

    async fn create_tag(
        &self,
        token: &AccessToken,
        project: &str,
        tag: &str,
        git_ref: &str,
    ) -> Result<()>;

    async fn get_variable(
        &self,
        token: &AccessToken,
        project: &str,
        key: &str,
    ) -> Result<GitLabVariable>;

    /// Create a masked, protected variable.
    async fn create_variable(
        &self,
        token: &AccessToken,
        project: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;

    async fn update_variable(
        &self,
        token: &AccessToken,
        project: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;

    async fn get_file(
        &self,
        token: &AccessToken,
        project: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<GitLabFile>;

    async fn create_commit(
        &self,
        token: &AccessToken,
        project: &str,
        branch: &str,
        message: &str,
        actions: &[CommitAction],
    ) -> Result<GitLabCommit>;
}
