//! GitHub REST and GraphQL data types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::source::pagination::{Cursor, Page};

/// Reply from the identity endpoint, kept whole so the caller can judge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityReply {
    pub status: u16,
    /// Login of the authenticated user, when the reply could be decoded.
    pub login: Option<String>,
    /// Scopes granted to the token (`X-OAuth-Scopes`).
    pub scopes: Vec<String>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    pub node_id: String,
    pub owner: GitHubUser,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubTag {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub object: GitHubObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubObject {
    pub sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSecret {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSecretList {
    pub total_count: usize,
    pub secrets: Vec<GitHubSecret>,
}

/// Public key used to seal Actions secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubPublicKey {
    pub key_id: String,
    /// Base64-encoded Curve25519 key.
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunList {
    pub total_count: usize,
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
}

/// Repository node shared by the viewer and search GraphQL queries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoNode {
    pub name: String,
    pub owner: RepoOwner,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoOwner {
    pub login: String,
}

/// The authenticated viewer plus one page of the repositories they own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerRepositories {
    pub login: String,
    pub page: Page<RepoNode, Cursor>,
}

/// Branch tip and file contents read in one GraphQL round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchSnapshot {
    /// Commit the branch points at; `None` when the branch has no commits.
    pub head_oid: Option<String>,
    /// Path to text content; `None` when the file does not exist.
    pub files: BTreeMap<String, Option<String>>,
}

/// Input for the `createCommitOnBranch` mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOnBranchInput {
    pub branch: CommittableBranch,
    pub expected_head_oid: String,
    pub message: CommitMessage,
    pub file_changes: FileChanges,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittableBranch {
    pub repository_name_with_owner: String,
    pub branch_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitMessage {
    pub headline: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChanges {
    pub additions: Vec<FileAddition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAddition {
    pub path: String,
    /// Base64-encoded file contents.
    pub contents: String,
}

/// Generic GraphQL connection page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphQlConnection<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<Option<T>>,
    pub page_info: GraphQlPageInfo,
    #[serde(default)]
    pub total_count: Option<usize>,
    #[serde(default)]
    pub repository_count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphQlPageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

impl<T> GraphQlConnection<T> {
    /// Convert to a normalized page, dropping null nodes.
    pub(crate) fn into_page(self) -> Page<T, Cursor> {
        let next = match (self.page_info.has_next_page, self.page_info.end_cursor) {
            (true, Some(cursor)) if !cursor.is_empty() => Some(Cursor(cursor)),
            _ => None,
        };
        Page::new(
            self.nodes.into_iter().flatten().collect(),
            next,
            self.total_count.or(self.repository_count),
        )
    }
}
