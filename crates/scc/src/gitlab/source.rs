//! [`Source`] implementation for GitLab.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::api::GitLabApi;
use super::client::GitLabClient;
use super::types::{CommitAction, FileAction, GitLabFile, GitLabProject};
use crate::retry::retry;
use crate::source::pagination::{Page, PageQuery, paginate};
use crate::source::{
    AccessToken, Commit, CommitRef, INITIAL_TAG, Org, PageRequest, Paged, Profile,
    RateLimitPolicy, Repo, Result, Source, SourceConfig, SourceError, SourceKind,
    split_full_name, with_rate_limit_retry,
};

/// Tag pattern protected on every created project.
const PROTECTED_TAGS: &str = "v*";

/// GitLab provider facade.
#[derive(Clone)]
pub struct GitLabSource {
    config: SourceConfig,
    policy: RateLimitPolicy,
    api: Arc<dyn GitLabApi>,
}

fn decode_file(file: &GitLabFile) -> String {
    if file.encoding == "base64" {
        match STANDARD.decode(file.content.trim()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => file.content.clone(),
        }
    } else {
        file.content.clone()
    }
}

impl GitLabSource {
    pub fn new(config: SourceConfig, api: Arc<dyn GitLabApi>) -> Self {
        Self {
            policy: RateLimitPolicy::from(&config),
            config,
            api,
        }
    }

    /// Facade over the real GitLab client at `config.gitlab_url`.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let client = GitLabClient::new(&config.gitlab_url, config.http_timeout())?;
        Ok(Self::new(config.clone(), Arc::new(client)))
    }

    async fn limited<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_rate_limit_retry(&self.policy, call).await
    }

    async fn current_username(&self, token: &AccessToken) -> Result<String> {
        let reply = self
            .limited(move || self.api.current_user(token))
            .await
            .map_err(|e| e.context("failed to connect to Gitlab"))?;

        match reply.user {
            Some(user) if reply.status == 200 => Ok(user.username),
            _ => Err(SourceError::unexpected_reply(
                "unexpected reply from Gitlab",
                reply.status,
                reply.body,
            )),
        }
    }

    /// One page of `user`'s projects, without projects owned elsewhere.
    async fn owned_projects_page(
        &self,
        token: &AccessToken,
        user: &str,
        query: PageQuery<u32>,
    ) -> Result<Page<Repo, u32>> {
        let page = self
            .limited(move || self.api.list_user_projects(token, user, query.clone()))
            .await?;

        let Page { items, next, total } = page;
        let items = items
            .into_iter()
            .filter(|project: &GitLabProject| project.namespace.full_path == user)
            .map(Repo::from)
            .collect();
        Ok(Page::new(items, next, total))
    }

    async fn group_projects_page(
        &self,
        token: &AccessToken,
        group: &str,
        query: PageQuery<u32>,
    ) -> Result<Page<Repo, u32>> {
        let page = self
            .limited(move || self.api.list_group_projects(token, group, query.clone()))
            .await?;
        Ok(page.map(Repo::from))
    }

    async fn groups_page(
        &self,
        token: &AccessToken,
        query: PageQuery<u32>,
    ) -> Result<Page<Org, u32>> {
        let page = self
            .limited(move || self.api.list_groups(token, query.clone()))
            .await?;
        Ok(page.map(Org::from))
    }

    async fn variable_exists(
        &self,
        token: &AccessToken,
        project: &str,
        key: &str,
    ) -> Result<bool> {
        match self
            .limited(move || self.api.get_variable(token, project, key))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.context(format!("failed to read variable {key} of {project}"))),
        }
    }

    async fn branch_head(
        &self,
        token: &AccessToken,
        project: &str,
        branch: &str,
    ) -> Result<String> {
        match self
            .limited(move || self.api.get_branch(token, project, branch))
            .await
        {
            Ok(found) => Ok(found.commit.id),
            Err(err) if err.is_not_found() => Err(SourceError::RepoEmpty {
                repo: project.to_string(),
            }),
            Err(err) => Err(err.context(format!("failed to read branch {branch} of {project}"))),
        }
    }
}

#[async_trait]
impl Source for GitLabSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GitLab
    }

    async fn validate_connection(
        &self,
        token: &AccessToken,
        required_scopes: &[String],
    ) -> Result<()> {
        let username = self.current_username(token).await?;
        if !required_scopes.is_empty() {
            tracing::debug!(
                "GitLab does not report token scopes, not checking {:?} for {}",
                required_scopes,
                username
            );
        }
        Ok(())
    }

    async fn profile(&self, token: &AccessToken) -> Result<Profile> {
        let username = self.current_username(token).await?;
        let user = username.as_str();
        let repos = paginate(Some(&PageRequest::all()), move |query| {
            self.owned_projects_page(token, user, query)
        })
        .await
        .map_err(|e| e.context(format!("failed to list projects of {username}")))?;

        Ok(Profile {
            username,
            repos: repos.items,
        })
    }

    async fn list_orgs(
        &self,
        token: &AccessToken,
        page: Option<&PageRequest>,
    ) -> Result<Paged<Org>> {
        paginate(page, move |query| self.groups_page(token, query))
            .await
            .map_err(|e| e.context("failed to list groups"))
    }

    async fn list_repos(
        &self,
        token: &AccessToken,
        owner: &str,
        page: Option<&PageRequest>,
    ) -> Result<Paged<Repo>> {
        PageRequest::validate(page)?;
        let username = self.current_username(token).await?;

        let listed = if username == owner {
            paginate(page, move |query| {
                self.owned_projects_page(token, owner, query)
            })
            .await
        } else {
            paginate(page, move |query| {
                self.group_projects_page(token, owner, query)
            })
            .await
        };

        listed.map_err(|e| e.context(format!("failed to list repos of {owner}")))
    }

    async fn create_repo(&self, token: &AccessToken, owner: &str, name: &str) -> Result<()> {
        let namespace = self
            .limited(move || self.api.get_namespace(token, owner))
            .await
            .map_err(|e| e.context(format!("failed to resolve namespace {owner}")))?;

        let namespace_id = namespace.id;
        let project = self
            .limited(move || self.api.create_project(token, name, namespace_id))
            .await
            .map_err(|e| e.context("failed to create project"))?;
        tracing::info!("Created GitLab project {}", project.path_with_namespace);

        // The project stays in place when protection fails.
        let full_path = project.path_with_namespace.as_str();
        retry(self.config.create_repo_timeout(), move |_| {
            self.limited(move || self.api.protect_tags(token, full_path, PROTECTED_TAGS))
        })
        .await
        .map_err(|e| e.context(format!("failed to protect tags of {full_path}")))?;

        Ok(())
    }

    async fn get_repo(&self, token: &AccessToken, owner: &str, name: &str) -> Result<Repo> {
        let full_path = format!("{owner}/{name}");
        let full_path = full_path.as_str();
        let project = self
            .limited(move || self.api.get_project(token, full_path))
            .await
            .map_err(|e| e.context("failed to get repo"))?;
        Ok(Repo::from(project))
    }

    async fn get_default_branch(
        &self,
        token: &AccessToken,
        owner: &str,
        name: &str,
    ) -> Result<String> {
        let full_path = format!("{owner}/{name}");
        let project_path = full_path.as_str();
        let project = self
            .limited(move || self.api.get_project(token, project_path))
            .await
            .map_err(|e| e.context("failed to get repo"))?;

        project
            .default_branch
            .ok_or(SourceError::RepoEmpty { repo: full_path })
    }

    async fn has_secret(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        secret_name: &str,
    ) -> Result<bool> {
        let project = format!("{owner}/{repo}");
        self.variable_exists(token, &project, secret_name).await
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
            return Err(SourceError::invalid_argument("no group name was provided"));
        }
        if repo.is_empty() {
            return Err(SourceError::invalid_argument("no project name was provided"));
        }

        let full_path = format!("{owner}/{repo}");
        let project = full_path.as_str();
        let exists = self.variable_exists(token, project, secret_name).await?;

        if exists && !overwrite {
            return Err(SourceError::RepoAlreadyConnected { repo: full_path });
        }

        let stored = if exists {
            self.limited(move || self.api.update_variable(token, project, secret_name, value))
                .await
        } else {
            self.limited(move || self.api.create_variable(token, project, secret_name, value))
                .await
        };
        let context = format!("failed to store variable {secret_name} on {project}");
        stored.map_err(|e| e.context(context))?;

        tracing::info!("Stored variable {} on {}", secret_name, project);
        Ok(())
    }

    async fn initial_tag(
        &self,
        token: &AccessToken,
        full_name: &str,
        workflow_file_name: Option<&str>,
        sha: Option<&str>,
    ) -> Result<()> {
        if split_full_name(full_name).is_none() {
            return Err(SourceError::invalid_argument(format!(
                "invalid full gitlab repo name '{full_name}', should be in the form owner/repo"
            )));
        }

        let project = self
            .limited(move || self.api.get_project(token, full_name))
            .await
            .map_err(|e| e.context("failed to get repo"))?;

        let tags = self
            .limited(move || self.api.list_tags(token, full_name, 1))
            .await
            .map_err(|e| e.context(format!("failed to list tags for repo '{full_name}'")))?;
        if !tags.is_empty() {
            tracing::debug!("{} is already tagged, skipping initial tag", full_name);
            return Ok(());
        }

        let sha = match sha {
            Some(sha) => sha.to_string(),
            None => {
                let branch = project.default_branch.as_deref().ok_or_else(|| {
                    SourceError::RepoEmpty {
                        repo: full_name.to_string(),
                    }
                })?;
                self.branch_head(token, full_name, branch).await?
            }
        };

        let target = sha.as_str();
        self.limited(move || self.api.create_tag(token, full_name, INITIAL_TAG, target))
            .await
            .map_err(|e| e.context("failed to create tag"))?;
        tracing::info!("Tagged {} at {} as {}", full_name, sha, INITIAL_TAG);

        if let Some(workflow_file) = workflow_file_name {
            tracing::debug!(
                "GitLab pipelines start on tag push, ignoring workflow {}",
                workflow_file
            );
        }

        Ok(())
    }

    async fn create_commit_on_branch(
        &self,
        token: &AccessToken,
        commit: &Commit,
    ) -> Result<CommitRef> {
        let full_path = commit.full_name();
        let project = full_path.as_str();
        let branch = commit.branch.as_str();

        let mut actions = Vec::with_capacity(commit.content.len());
        for (path, content) in &commit.content {
            let path_ref = path.as_str();
            let action = match self
                .limited(move || self.api.get_file(token, project, path_ref, branch))
                .await
            {
                Ok(file) if decode_file(&file) == *content => None,
                Ok(_) => Some(FileAction::Update),
                Err(err) if err.is_not_found() => Some(FileAction::Create),
                Err(err) => {
                    return Err(err.context(format!("failed to read {path} on {project}")));
                }
            };

            if let Some(action) = action {
                actions.push(CommitAction {
                    action,
                    file_path: path.clone(),
                    content: content.clone(),
                });
            }
        }

        if actions.is_empty() {
            tracing::debug!(
                "{} already holds the requested content, nothing to commit",
                project
            );
            let sha = self.branch_head(token, project, branch).await?;
            return Ok(CommitRef {
                sha,
                created: false,
            });
        }

        let actions = actions.as_slice();
        let message = commit.message.as_str();
        let created = self
            .limited(move || {
                self.api
                    .create_commit(token, project, branch, message, actions)
            })
            .await
            .map_err(|e| e.context("failed to create commit"))?;

        tracing::info!("Committed {} to {}:{}", created.id, project, branch);
        Ok(CommitRef {
            sha: created.id,
            created: true,
        })
    }
}

impl std::fmt::Debug for GitLabSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabSource")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
