//! [`Source`] implementation for GitHub.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::api::{GitHubApi, GitHubGraphQl};
use super::client::GitHubClient;
use super::seal::{CryptoBoxSealer, SecretSealer};
use super::types::{
    CommitMessage, CommitOnBranchInput, CommittableBranch, FileAddition, FileChanges,
};
use crate::retry::retry;
use crate::source::pagination::{Cursor, Page, PageQuery, paginate};
use crate::source::scopes::check_scopes;
use crate::source::{
    AccessToken, Commit, CommitRef, INITIAL_TAG, MAX_PAGE_SIZE, Org, PageRequest,
    Paged, Profile, RateLimitPolicy, Repo, Result, Source, SourceConfig, SourceError, SourceKind,
    short_error_message, split_full_name, with_rate_limit_retry,
};

/// GitHub provider facade.
///
/// REST calls go through [`GitHubApi`], GraphQL calls through
/// [`GitHubGraphQl`]; every call is wrapped in the secondary rate-limit
/// handler.
#[derive(Clone)]
pub struct GitHubSource {
    config: SourceConfig,
    policy: RateLimitPolicy,
    rest: Arc<dyn GitHubApi>,
    graphql: Arc<dyn GitHubGraphQl>,
    sealer: Arc<dyn SecretSealer>,
}

impl GitHubSource {
    pub fn new(
        config: SourceConfig,
        rest: Arc<dyn GitHubApi>,
        graphql: Arc<dyn GitHubGraphQl>,
        sealer: Arc<dyn SecretSealer>,
    ) -> Self {
        Self {
            policy: RateLimitPolicy::from(&config),
            config,
            rest,
            graphql,
            sealer,
        }
    }

    /// Facade over the real GitHub client at `config.github_api_url`.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let client = Arc::new(GitHubClient::new(&config.github_api_url, config.http_timeout())?);
        Ok(Self::new(
            config.clone(),
            client.clone(),
            client,
            Arc::new(CryptoBoxSealer),
        ))
    }

    async fn limited<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_rate_limit_retry(&self.policy, call).await
    }

    async fn search_page(
        &self,
        token: &AccessToken,
        search: &str,
        query: PageQuery<Cursor>,
    ) -> Result<Page<Repo, Cursor>> {
        let page = self
            .limited(move || {
                self.graphql
                    .search_repositories(token, search, query.clone())
            })
            .await?;
        Ok(page.map(Repo::from))
    }

    async fn org_page(
        &self,
        token: &AccessToken,
        query: PageQuery<Cursor>,
    ) -> Result<Page<Org, Cursor>> {
        let page = self
            .limited(move || self.graphql.viewer_organizations(token, query.clone()))
            .await?;
        Ok(page.map(|login| Org {
            name: login.clone(),
            id: login,
        }))
    }

    async fn secret_exists(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        secret_name: &str,
    ) -> Result<bool> {
        let names = retry(self.config.create_repo_timeout(), move |_| {
            self.limited(move || self.rest.list_secret_names(token, owner, repo))
        })
        .await
        .map_err(|e| e.context("failed to list repo secrets"))?;

        Ok(names.iter().any(|name| name == secret_name))
    }

    /// Poll for a run of `workflow_file`; dispatch it at the initial tag if
    /// none shows up in time.
    ///
    /// A run that starts between the last poll and the dispatch is not
    /// detected, so the workflow can end up running twice.
    async fn ensure_workflow_run(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        workflow_file: &str,
    ) -> Result<()> {
        let polled = retry(self.config.wait_tag_timeout(), move |_| async move {
            let runs = self
                .limited(move || {
                    self.rest
                        .list_workflow_runs(token, owner, repo, workflow_file)
                })
                .await?;
            if runs.is_empty() {
                return Err(SourceError::not_found(format!("workflow runs of {workflow_file}")));
            }
            Ok(())
        })
        .await;

        if let Err(err) = polled {
            tracing::debug!(
                "Triggering workflow dispatch for {} at {}: {}",
                workflow_file,
                INITIAL_TAG,
                short_error_message(&err)
            );
            self.limited(move || {
                self.rest
                    .dispatch_workflow(token, owner, repo, workflow_file, INITIAL_TAG)
            })
            .await
            .map_err(|e| e.context(format!("failed to dispatch workflow {workflow_file}")))?;
        }

        Ok(())
    }

    /// Wait until `sha` is readable through the REST API.
    async fn wait_for_commit(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<()> {
        retry(self.config.wait_tag_timeout(), move |_| async move {
            let not_found = || SourceError::CommitNotFound {
                sha: sha.to_string(),
                repo: format!("{owner}/{repo}"),
            };

            match self
                .limited(move || self.rest.get_commit(token, owner, repo, sha))
                .await
            {
                Ok(commit) if commit.sha == sha => Ok(()),
                Ok(_) => Err(not_found()),
                Err(err) if err.is_not_found() => Err(not_found()),
                Err(err) => Err(err),
            }
        })
        .await
        .map_err(|e| e.context("failed to wait for commit"))
    }
}

fn commit_input(commit: &Commit, head: String) -> CommitOnBranchInput {
    CommitOnBranchInput {
        branch: CommittableBranch {
            repository_name_with_owner: commit.full_name(),
            branch_name: commit.branch.clone(),
        },
        expected_head_oid: head,
        message: CommitMessage {
            headline: commit.message.clone(),
        },
        file_changes: FileChanges {
            additions: commit
                .content
                .iter()
                .map(|(path, content)| FileAddition {
                    path: path.clone(),
                    contents: STANDARD.encode(content),
                })
                .collect(),
        },
    }
}

#[async_trait]
impl Source for GitHubSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GitHub
    }

    async fn validate_connection(
        &self,
        token: &AccessToken,
        required_scopes: &[String],
    ) -> Result<()> {
        let reply = self
            .limited(move || self.rest.authenticated_user(token))
            .await
            .map_err(|e| e.context("failed to connect to Github"))?;

        if reply.status != 200 {
            return Err(SourceError::unexpected_reply(
                "unexpected reply from GitHub",
                reply.status,
                reply.body,
            ));
        }

        check_scopes(&reply.scopes, required_scopes)
    }

    async fn profile(&self, token: &AccessToken) -> Result<Profile> {
        let mut repos = Vec::new();
        let mut cursor: Option<Cursor> = None;

        let username = loop {
            let query = PageQuery {
                per_page: MAX_PAGE_SIZE.unsigned_abs(),
                token: cursor.take(),
            };
            let viewer = self
                .limited(move || self.graphql.viewer_repositories(token, query.clone()))
                .await
                .map_err(|e| e.context("error running query against github graphql server"))?;

            repos.extend(viewer.page.items.into_iter().map(Repo::from));

            match viewer.page.next {
                Some(next) => cursor = Some(next),
                None => break viewer.login,
            }
        };

        Ok(Profile { username, repos })
    }

    async fn list_orgs(
        &self,
        token: &AccessToken,
        page: Option<&PageRequest>,
    ) -> Result<Paged<Org>> {
        paginate(page, move |query| self.org_page(token, query))
            .await
            .map_err(|e| e.context("failed to list organizations"))
    }

    async fn list_repos(
        &self,
        token: &AccessToken,
        owner: &str,
        page: Option<&PageRequest>,
    ) -> Result<Paged<Repo>> {
        let search = format!("user:{owner}");
        let search = search.as_str();
        paginate(page, move |query| self.search_page(token, search, query))
            .await
            .map_err(|e| e.context(format!("failed to list repos of {owner}")))
    }

    async fn create_repo(&self, token: &AccessToken, owner: &str, name: &str) -> Result<()> {
        let user = self
            .limited(move || self.rest.authenticated_user(token))
            .await
            .map_err(|e| e.context("failed to read user from github"))?;

        let org = match user.login.as_deref() {
            Some(login) if login == owner => None,
            Some(_) => Some(owner),
            None => {
                return Err(SourceError::unexpected_reply(
                    "failed to read user from github",
                    user.status,
                    user.body,
                ));
            }
        };

        self.limited(move || self.rest.create_repo(token, org, name))
            .await
            .map_err(|e| e.context("failed to create repo"))?;

        tracing::info!("Created GitHub repository {}/{}", owner, name);
        Ok(())
    }

    async fn get_repo(&self, token: &AccessToken, owner: &str, name: &str) -> Result<Repo> {
        let repo = self
            .limited(move || self.rest.get_repo(token, owner, name))
            .await
            .map_err(|e| e.context("failed to get repo"))?;
        Ok(Repo::from(repo))
    }

    async fn get_default_branch(
        &self,
        token: &AccessToken,
        owner: &str,
        name: &str,
    ) -> Result<String> {
        let repo = self
            .limited(move || self.rest.get_repo(token, owner, name))
            .await
            .map_err(|e| e.context("failed to get repo"))?;

        repo.default_branch.ok_or_else(|| SourceError::RepoEmpty {
            repo: repo.full_name,
        })
    }

    async fn has_secret(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        secret_name: &str,
    ) -> Result<bool> {
        self.secret_exists(token, owner, repo, secret_name).await
    }

    async fn add_secret_to_repo(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        secret_name: &str,
        value: &str,
        overwrite: bool,
    ) -> Result<()> {
        if owner.is_empty() {
            return Err(SourceError::invalid_argument("no org name was provided"));
        }
        if repo.is_empty() {
            return Err(SourceError::invalid_argument("no repo name was provided"));
        }

        let key = retry(self.config.create_repo_timeout(), move |_| {
            self.limited(move || self.rest.get_public_key(token, owner, repo))
        })
        .await
        .map_err(|e| e.context("failed to get public repo key for encryption"))?;

        let encrypted = self
            .sealer
            .seal(&key.key, value.as_bytes())
            .map_err(|e| e.context("failed to encrypt secret for github actions"))?;

        if !overwrite && self.secret_exists(token, owner, repo, secret_name).await? {
            return Err(SourceError::RepoAlreadyConnected {
                repo: format!("{owner}/{repo}"),
            });
        }

        let encrypted = encrypted.as_str();
        let key_id = key.key_id.as_str();
        retry(self.config.create_repo_timeout(), move |_| {
            self.limited(move || {
                self.rest
                    .put_secret(token, owner, repo, secret_name, encrypted, key_id)
            })
        })
        .await
        .map_err(|e| e.context(format!("failed to store secret {secret_name} on {owner}/{repo}")))?;

        tracing::info!("Stored secret {} on {}/{}", secret_name, owner, repo);
        Ok(())
    }

    async fn initial_tag(
        &self,
        token: &AccessToken,
        full_name: &str,
        workflow_file_name: Option<&str>,
        sha: Option<&str>,
    ) -> Result<()> {
        let (owner, name) = split_full_name(full_name).ok_or_else(|| {
            SourceError::invalid_argument(format!(
                "invalid full github repo name '{full_name}', should be in the form owner/repo"
            ))
        })?;

        let repo = self
            .limited(move || self.rest.get_repo(token, owner, name))
            .await
            .map_err(|e| e.context("failed to get repo"))?;

        let tags = self
            .limited(move || self.rest.list_tags(token, owner, name, 1))
            .await
            .map_err(|e| e.context(format!("failed to list tags for repo '{full_name}'")))?;
        if !tags.is_empty() {
            tracing::debug!("{} is already tagged, skipping initial tag", full_name);
            return Ok(());
        }

        let sha = match sha {
            Some(sha) => sha.to_string(),
            None => {
                let empty = || SourceError::RepoEmpty {
                    repo: full_name.to_string(),
                };
                let branch = repo.default_branch.as_deref().ok_or_else(empty)?;
                let head_ref = format!("heads/{branch}");
                let head_ref = head_ref.as_str();
                match self
                    .limited(move || self.rest.get_ref(token, owner, name, head_ref))
                    .await
                {
                    Ok(found) => found.object.sha,
                    Err(err) if err.is_not_found() || err.api_status() == Some(409) => {
                        return Err(empty());
                    }
                    Err(err) => return Err(err.context("failed to read default branch head")),
                }
            }
        };

        let tag_ref = format!("refs/tags/{INITIAL_TAG}");
        let (node_id, tag_ref, sha) = (repo.node_id.as_str(), tag_ref.as_str(), sha.as_str());
        self.limited(move || self.graphql.create_ref(token, node_id, tag_ref, sha))
            .await
            .map_err(|e| e.context("failed to create tag"))?;
        tracing::info!("Tagged {} at {} as {}", full_name, sha, INITIAL_TAG);

        if let Some(workflow_file) = workflow_file_name {
            tracing::warn!(
                "Trigger manual dispatch for {} if a workflow run doesn't exist",
                workflow_file
            );
            self.ensure_workflow_run(token, owner, name, workflow_file)
                .await?;
        }

        Ok(())
    }

    async fn create_commit_on_branch(
        &self,
        token: &AccessToken,
        commit: &Commit,
    ) -> Result<CommitRef> {
        let paths: Vec<&str> = commit.content.keys().map(String::as_str).collect();
        let paths = paths.as_slice();

        let outcome = retry(self.config.create_repo_timeout(), move |_| async move {
            let snapshot = self
                .limited(move || {
                    self.graphql.branch_snapshot(
                        token,
                        &commit.owner,
                        &commit.repo,
                        &commit.branch,
                        paths,
                    )
                })
                .await
                .map_err(|e| e.context("failed to query latest commit"))?;

            let Some(head) = snapshot.head_oid else {
                return Err(SourceError::RepoEmpty {
                    repo: commit.full_name(),
                });
            };

            let unchanged = commit.content.iter().all(|(path, content)| {
                snapshot.files.get(path).and_then(Option::as_deref) == Some(content.as_str())
            });
            if unchanged {
                return Ok(CommitRef {
                    sha: head,
                    created: false,
                });
            }

            let input = commit_input(commit, head);
            let input = &input;
            let oid = self
                .limited(move || self.graphql.create_commit_on_branch(token, input))
                .await
                .map_err(|e| e.context("failed to create commit"))?;

            Ok(CommitRef {
                sha: oid,
                created: true,
            })
        })
        .await?;

        if !outcome.created {
            tracing::debug!(
                "{} already holds the requested content, nothing to commit",
                commit.full_name()
            );
            return Ok(outcome);
        }

        self.wait_for_commit(token, &commit.owner, &commit.repo, &outcome.sha)
            .await?;
        tracing::info!(
            "Committed {} to {}:{}",
            outcome.sha,
            commit.full_name(),
            commit.branch
        );
        Ok(outcome)
    }
}

impl std::fmt::Debug for GitHubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSource")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

