//! GitHub GraphQL v4 queries and mutations.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::GitHubClient;
use super::api::GitHubGraphQl;
use super::error::GitHubError;
use super::types::{
    BranchSnapshot, CommitOnBranchInput, GraphQlConnection, RepoNode, ViewerRepositories,
};
use crate::source::pagination::{Cursor, Page, PageQuery};
use crate::source::{AccessToken, Result};

const VIEWER_REPOSITORIES: &str = r"
query($first: Int!, $after: String) {
  viewer {
    login
    repositories(first: $first, after: $after, ownerAffiliations: [OWNER]) {
      totalCount
      pageInfo { hasNextPage endCursor }
      nodes { name url owner { login } }
    }
  }
}";

const VIEWER_ORGANIZATIONS: &str = r"
query($first: Int!, $after: String) {
  viewer {
    organizations(first: $first, after: $after) {
      totalCount
      pageInfo { hasNextPage endCursor }
      nodes { login }
    }
  }
}";

const SEARCH_REPOSITORIES: &str = r"
query($q: String!, $first: Int!, $after: String) {
  search(query: $q, type: REPOSITORY, first: $first, after: $after) {
    repositoryCount
    pageInfo { hasNextPage endCursor }
    nodes { ... on Repository { name url owner { login } } }
  }
}";

const CREATE_COMMIT_ON_BRANCH: &str = r"
mutation($input: CreateCommitOnBranchInput!) {
  createCommitOnBranch(input: $input) { commit { oid } }
}";

const CREATE_REF: &str = r"
mutation($input: CreateRefInput!) {
  createRef(input: $input) { ref { name } }
}";

#[derive(Debug, Deserialize)]
struct GraphQlReply<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ViewerData<C> {
    viewer: C,
}

#[derive(Debug, Deserialize)]
struct ViewerRepos {
    login: String,
    repositories: GraphQlConnection<RepoNode>,
}

#[derive(Debug, Deserialize)]
struct ViewerOrgs {
    organizations: GraphQlConnection<OrgNode>,
}

#[derive(Debug, Deserialize)]
struct OrgNode {
    login: String,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: GraphQlConnection<RepoNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommitData {
    create_commit_on_branch: CreatedCommit,
}

#[derive(Debug, Deserialize)]
struct CreatedCommit {
    commit: CommitOid,
}

#[derive(Debug, Deserialize)]
struct CommitOid {
    oid: String,
}

/// Build the snapshot query: the branch ref plus one aliased blob lookup per path.
fn snapshot_query(paths: usize) -> String {
    let mut params = String::from("$owner: String!, $name: String!, $qualified: String!");
    let mut fields = String::new();
    for i in 0..paths {
        params.push_str(&format!(", $f{i}: String!"));
        fields.push_str(&format!(
            "    f{i}: object(expression: $f{i}) {{ ... on Blob {{ text }} }}\n"
        ));
    }
    format!(
        "query({params}) {{\n  repository(owner: $owner, name: $name) {{\n    ref(qualifiedName: $qualified) {{ target {{ oid }} }}\n{fields}  }}\n}}"
    )
}

fn cursor_variables(query: &PageQuery<Cursor>) -> Value {
    json!({
        "first": query.per_page,
        "after": query.token.as_ref().map(|c| c.0.as_str()),
    })
}

impl GitHubClient {
    async fn graphql<T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        query: &str,
        variables: Value,
    ) -> std::result::Result<T, GitHubError> {
        let body = json!({ "query": query, "variables": variables });
        let response = self.post_graphql(token, &body).await?;
        let reply: GraphQlReply<T> = response.json()?;

        if let Some(first) = reply.errors.into_iter().next() {
            return Err(GitHubError::GraphQl {
                kind: first.kind,
                message: first.message,
            });
        }

        reply.data.ok_or_else(|| GitHubError::GraphQl {
            kind: None,
            message: "reply carried no data".to_string(),
        })
    }
}

#[async_trait]
impl GitHubGraphQl for GitHubClient {
    async fn viewer_repositories(
        &self,
        token: &AccessToken,
        query: PageQuery<Cursor>,
    ) -> Result<ViewerRepositories> {
        let data: ViewerData<ViewerRepos> = self
            .graphql(token, VIEWER_REPOSITORIES, cursor_variables(&query))
            .await?;
        Ok(ViewerRepositories {
            login: data.viewer.login,
            page: data.viewer.repositories.into_page(),
        })
    }

    async fn viewer_organizations(
        &self,
        token: &AccessToken,
        query: PageQuery<Cursor>,
    ) -> Result<Page<String, Cursor>> {
        let data: ViewerData<ViewerOrgs> = self
            .graphql(token, VIEWER_ORGANIZATIONS, cursor_variables(&query))
            .await?;
        Ok(data.viewer.organizations.into_page().map(|org| org.login))
    }

    async fn search_repositories(
        &self,
        token: &AccessToken,
        search: &str,
        query: PageQuery<Cursor>,
    ) -> Result<Page<RepoNode, Cursor>> {
        let mut variables = cursor_variables(&query);
        variables["q"] = Value::from(search);
        let data: SearchData = self.graphql(token, SEARCH_REPOSITORIES, variables).await?;
        Ok(data.search.into_page())
    }

    async fn branch_snapshot(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        branch: &str,
        paths: &[&str],
    ) -> Result<BranchSnapshot> {
        let mut variables = json!({
            "owner": owner,
            "name": repo,
            "qualified": format!("refs/heads/{branch}"),
        });
        for (i, path) in paths.iter().enumerate() {
            variables[format!("f{i}")] = Value::from(format!("{branch}:{path}"));
        }

        let data: Value = self
            .graphql(token, &snapshot_query(paths.len()), variables)
            .await?;
        let repository = &data["repository"];
        if repository.is_null() {
            return Err(GitHubError::NotFound(format!("{owner}/{repo}")).into());
        }

        let head_oid = repository["ref"]["target"]["oid"]
            .as_str()
            .map(str::to_string);
        let files = paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let text = repository[format!("f{i}").as_str()]["text"]
                    .as_str()
                    .map(str::to_string);
                (path.to_string(), text)
            })
            .collect();

        Ok(BranchSnapshot { head_oid, files })
    }

    async fn create_commit_on_branch(
        &self,
        token: &AccessToken,
        input: &CommitOnBranchInput,
    ) -> Result<String> {
        let data: CreateCommitData = self
            .graphql(token, CREATE_COMMIT_ON_BRANCH, json!({ "input": input }))
            .await?;
        Ok(data.create_commit_on_branch.commit.oid)
    }

    async fn create_ref(
        &self,
        token: &AccessToken,
        repository_id: &str,
        name: &str,
        oid: &str,
    ) -> Result<()> {
        let input = json!({ "repositoryId": repository_id, "name": name, "oid": oid });
        let _: Value = self
            .graphql(token, CREATE_REF, json!({ "input": input }))
            .await?;
        Ok(())
    }
}
