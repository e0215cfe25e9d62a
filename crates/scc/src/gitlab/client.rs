//! GitLab REST client over the shared HTTP transport.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::api::GitLabApi;
use super::error::{GitLabError, classify_response};
use super::types::{
    CommitAction, GitLabBranch, GitLabCommit, GitLabFile, GitLabGroup, GitLabNamespace,
    GitLabProject, GitLabTag, GitLabUser, GitLabVariable, UserReply,
};
use crate::http::{
    HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
    encode_segment,
};
use crate::source::pagination::{Page, PageQuery};
use crate::source::{AccessToken, Result};

/// Minimum access level for listed groups (developer).
const DEVELOPER_ACCESS: u32 = 30;

/// Access level allowed to create protected tags (maintainer).
const MAINTAINER_ACCESS: u32 = 40;

/// GitLab API client.
///
/// OAuth tokens are sent as `Authorization: Bearer`, personal access tokens
/// as `PRIVATE-TOKEN`.
#[derive(Clone)]
pub struct GitLabClient {
    transport: Arc<dyn HttpTransport>,
    host: String,
    api_base: String,
}

impl GitLabClient {
    /// Create a client for a GitLab host such as `https://gitlab.com`.
    pub fn new(host: &str, timeout: StdDuration) -> std::result::Result<Self, GitLabError> {
        let transport =
            ReqwestTransport::new(timeout).map_err(|e| GitLabError::Config(e.to_string()))?;
        Self::new_with_transport(host, Arc::new(transport))
    }

    pub fn new_with_transport(
        host: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> std::result::Result<Self, GitLabError> {
        Url::parse(host)
            .map_err(|e| GitLabError::Config(format!("invalid GitLab host '{host}': {e}")))?;

        let host = host.trim_end_matches('/').to_string();
        let api_base = format!("{host}/api/v4");
        Ok(Self {
            transport,
            host,
            api_base,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn headers(token: &AccessToken) -> HttpHeaders {
        let auth = if token.is_oauth() {
            ("Authorization".to_string(), format!("Bearer {}", token.token))
        } else {
            ("PRIVATE-TOKEN".to_string(), token.token.clone())
        };
        vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), "scc".to_string()),
            auth,
        ]
    }

    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, GitLabError> {
        tracing::trace!("{} {}", request.method.as_str(), request.url);
        self.transport
            .send(request)
            .await
            .map_err(|e| GitLabError::Http(e.to_string()))
    }

    async fn get_response(
        &self,
        token: &AccessToken,
        path: &str,
    ) -> std::result::Result<HttpResponse, GitLabError> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .send(HttpRequest::new(HttpMethod::Get, url, Self::headers(token)))
            .await?;
        if !response.is_success() {
            return Err(classify_response(&response, path));
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        path: &str,
    ) -> std::result::Result<T, GitLabError> {
        let response = self.get_response(token, path).await?;
        Ok(response.json()?)
    }

    /// Fetch one page of a listing, reading `X-Next-Page` / `X-Total`.
    async fn get_page<T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        path: &str,
        query: &PageQuery<u32>,
    ) -> std::result::Result<Page<T, u32>, GitLabError> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let path = format!(
            "{path}{separator}per_page={}&page={}",
            query.per_page,
            query.token.unwrap_or(1)
        );
        let response = self.get_response(token, &path).await?;

        let next = response
            .header_value::<u32>("x-next-page")
            .filter(|page| *page > 0);
        let total = response.header_value::<usize>("x-total");
        let items: Vec<T> = response.json()?;

        Ok(Page::new(items, next, total))
    }

    async fn send_json<B: Serialize + Sync>(
        &self,
        method: HttpMethod,
        token: &AccessToken,
        path: &str,
        body: &B,
    ) -> std::result::Result<HttpResponse, GitLabError> {
        let url = format!("{}{}", self.api_base, path);
        let request = HttpRequest::new(method, url, Self::headers(token)).with_json(body)?;
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(classify_response(&response, path));
        }
        Ok(response)
    }

    fn project_path(project: &str) -> String {
        format!("/projects/{}", encode_segment(project))
    }
}

#[async_trait]
impl GitLabApi for GitLabClient {
    async fn current_user(&self, token: &AccessToken) -> Result<UserReply> {
        let url = format!("{}/user", self.api_base);
        let response = self
            .send(HttpRequest::new(HttpMethod::Get, url, Self::headers(token)))
            .await?;

        Ok(UserReply {
            status: response.status,
            user: response.json::<GitLabUser>().ok(),
            body: response.text(),
        })
    }

    async fn list_user_projects(
        &self,
        token: &AccessToken,
        user: &str,
        query: PageQuery<u32>,
    ) -> Result<Page<GitLabProject, u32>> {
        let path = format!("/users/{}/projects", encode_segment(user));
        Ok(self.get_page(token, &path, &query).await?)
    }

    async fn list_group_projects(
        &self,
        token: &AccessToken,
        group: &str,
        query: PageQuery<u32>,
    ) -> Result<Page<GitLabProject, u32>> {
        let path = format!("/groups/{}/projects", encode_segment(group));
        Ok(self.get_page(token, &path, &query).await?)
    }

    async fn list_groups(
        &self,
        token: &AccessToken,
        query: PageQuery<u32>,
    ) -> Result<Page<GitLabGroup, u32>> {
        let path = format!("/groups?min_access_level={DEVELOPER_ACCESS}&top_level_only=false");
        Ok(self.get_page(token, &path, &query).await?)
    }

    async fn get_project(&self, token: &AccessToken, project: &str) -> Result<GitLabProject> {
        Ok(self.get(token, &Self::project_path(project)).await?)
    }

    async fn get_namespace(&self, token: &AccessToken, path: &str) -> Result<GitLabNamespace> {
        Ok(self
            .get(token, &format!("/namespaces/{}", encode_segment(path)))
            .await?)
    }

    async fn create_project(
        &self,
        token: &AccessToken,
        name: &str,
        namespace_id: u64,
    ) -> Result<GitLabProject> {
        let body = serde_json::json!({
            "name": name,
            "namespace_id": namespace_id,
            "visibility": "public",
        });
        let response = self
            .send_json(HttpMethod::Post, token, "/projects", &body)
            .await?;
        Ok(response.json().map_err(GitLabError::from)?)
    }

    async fn protect_tags(&self, token: &AccessToken, project: &str, pattern: &str) -> Result<()> {
        let body = serde_json::json!({
            "name": pattern,
            "create_access_level": MAINTAINER_ACCESS,
        });
        let path = format!("{}/protected_tags", Self::project_path(project));
        self.send_json(HttpMethod::Post, token, &path, &body).await?;
        Ok(())
    }

    async fn list_tags(
        &self,
        token: &AccessToken,
        project: &str,
        per_page: u32,
    ) -> Result<Vec<GitLabTag>> {
        Ok(self
            .get(
                token,
                &format!(
                    "{}/repository/tags?per_page={per_page}",
                    Self::project_path(project)
                ),
            )
            .await?)
    }

    async fn get_branch(
        &self,
        token: &AccessToken,
        project: &str,
        branch: &str,
    ) -> Result<GitLabBranch> {
        Ok(self
            .get(
                token,
                &format!(
                    "{}/repository/branches/{}",
                    Self::project_path(project),
                    encode_segment(branch)
                ),
            )
            .await?)
    }

    async fn create_tag(
        &self,
        token: &AccessToken,
        project: &str,
        tag: &str,
        git_ref: &str,
    ) -> Result<()> {
        let body = serde_json::json!({ "tag_name": tag, "ref": git_ref, "message": tag });
        let path = format!("{}/repository/tags", Self::project_path(project));
        self.send_json(HttpMethod::Post, token, &path, &body).await?;
        Ok(())
    }

    async fn get_variable(
        &self,
        token: &AccessToken,
        project: &str,
        key: &str,
    ) -> Result<GitLabVariable> {
        Ok(self
            .get(
                token,
                &format!(
                    "{}/variables/{}",
                    Self::project_path(project),
                    encode_segment(key)
                ),
            )
            .await?)
    }

    async fn create_variable(
        &self,
        token: &AccessToken,
        project: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let body = serde_json::json!({
            "key": key,
            "value": value,
            "masked": true,
            "protected": true,
        });
        let path = format!("{}/variables", Self::project_path(project));
        self.send_json(HttpMethod::Post, token, &path, &body).await?;
        Ok(())
    }

    async fn update_variable(
        &self,
        token: &AccessToken,
        project: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let body = serde_json::json!({ "value": value, "masked": true, "protected": true });
        let path = format!(
            "{}/variables/{}",
            Self::project_path(project),
            encode_segment(key)
        );
        self.send_json(HttpMethod::Put, token, &path, &body).await?;
        Ok(())
    }

    async fn get_file(
        &self,
        token: &AccessToken,
        project: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<GitLabFile> {
        Ok(self
            .get(
                token,
                &format!(
                    "{}/repository/files/{}?ref={}",
                    Self::project_path(project),
                    encode_segment(path),
                    encode_segment(git_ref)
                ),
            )
            .await?)
    }

    async fn create_commit(
        &self,
        token: &AccessToken,
        project: &str,
        branch: &str,
        message: &str,
        actions: &[CommitAction],
    ) -> Result<GitLabCommit> {
        let body = serde_json::json!({
            "branch": branch,
            "commit_message": message,
            "actions": actions,
        });
        let path = format!("{}/repository/commits", Self::project_path(project));
        let response = self.send_json(HttpMethod::Post, token, &path, &body).await?;
        Ok(response.json().map_err(GitLabError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitlab::types::FileAction;
    use crate::http::{MockTransport, header_get};
    use crate::source::ErrorKind;

    const API: &str = "https://gitlab.test/api/v4";

    fn response(status: u16, headers: Vec<(&str, &str)>, body: impl AsRef<[u8]>) -> HttpResponse {
        HttpResponse {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.as_ref().to_vec(),
        }
    }

    fn client(transport: &MockTransport) -> GitLabClient {
        GitLabClient::new_with_transport("https://gitlab.test/", Arc::new(transport.clone()))
            .expect("valid host")
    }

    fn project_json() -> &'static str {
        r#"{"id":7,"name":"svc","path_with_namespace":"acme/svc","web_url":"https://gitlab.test/acme/svc","default_branch":"main","namespace":{"id":3,"full_path":"acme","kind":"group"}}"#
    }

    #[test]
    fn test_token_header_depends_on_token_type() {
        let personal = GitLabClient::headers(&AccessToken::personal("glpat-x"));
        assert_eq!(header_get(&personal, "private-token"), Some("glpat-x"));
        assert_eq!(header_get(&personal, "authorization"), None);

        let oauth = GitLabClient::headers(&AccessToken::new("oauth-x", "bearer"));
        assert_eq!(header_get(&oauth, "authorization"), Some("Bearer oauth-x"));
        assert_eq!(header_get(&oauth, "private-token"), None);
    }

    #[tokio::test]
    async fn test_list_groups_reads_pagination_headers() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/groups?min_access_level=30&top_level_only=false&per_page=2&page=1"),
            response(
                200,
                vec![("X-Next-Page", "2"), ("X-Total", "3")],
                r#"[{"id":1,"name":"Acme","full_path":"acme"},{"id":2,"name":"Infra","full_path":"acme/infra"}]"#,
            ),
        );
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/groups?min_access_level=30&top_level_only=false&per_page=2&page=2"),
            response(
                200,
                vec![("X-Next-Page", ""), ("X-Total", "3")],
                r#"[{"id":3,"name":"Tools","full_path":"tools"}]"#,
            ),
        );

        let gl = client(&transport);
        let token = AccessToken::personal("glpat-x");
        let query = PageQuery {
            per_page: 2,
            token: None,
        };
        let first = gl.list_groups(&token, query).await.expect("first page");
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next, Some(2));
        assert_eq!(first.total, Some(3));

        let query = PageQuery {
            per_page: 2,
            token: Some(2),
        };
        let last = gl.list_groups(&token, query).await.expect("last page");
        assert_eq!(last.items[0].full_path, "tools");
        assert_eq!(last.next, None);
    }

    #[tokio::test]
    async fn test_project_path_is_url_encoded() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/projects/acme%2Fsvc"),
            response(200, Vec::new(), project_json()),
        );

        let project = client(&transport)
            .get_project(&AccessToken::personal("glpat-x"), "acme/svc")
            .await
            .expect("project");
        assert_eq!(project.id, 7);
        assert_eq!(project.namespace.full_path, "acme");
    }

    #[tokio::test]
    async fn test_missing_variable_is_not_found() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/projects/acme%2Fsvc/variables/PUSH_KEY"),
            response(404, Vec::new(), r#"{"message":"404 Variable Not Found"}"#),
        );

        let err = client(&transport)
            .get_variable(&AccessToken::personal("glpat-x"), "acme/svc", "PUSH_KEY")
            .await
            .expect_err("absent");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_create_project_and_protect_tags_bodies() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/projects"),
            response(201, Vec::new(), project_json()),
        );
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/projects/acme%2Fsvc/protected_tags"),
            response(201, Vec::new(), r#"{"name":"v*"}"#),
        );

        let gl = client(&transport);
        let token = AccessToken::personal("glpat-x");
        gl.create_project(&token, "svc", 3).await.expect("created");
        gl.protect_tags(&token, "acme/svc", "v*")
            .await
            .expect("protected");

        let requests = transport.requests();
        let create: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json");
        assert_eq!(create["namespace_id"], 3);
        assert_eq!(create["visibility"], "public");
        let protect: serde_json::Value = serde_json::from_slice(&requests[1].body).expect("json");
        assert_eq!(protect["name"], "v*");
        assert_eq!(protect["create_access_level"], 40);
    }

    #[tokio::test]
    async fn test_create_commit_serializes_actions() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/projects/acme%2Fsvc/repository/commits"),
            response(201, Vec::new(), r#"{"id":"f00d"}"#),
        );

        let commit = client(&transport)
            .create_commit(
                &AccessToken::personal("glpat-x"),
                "acme/svc",
                "main",
                "add CI",
                &[CommitAction {
                    action: FileAction::Create,
                    file_path: ".gitlab-ci.yml".to_string(),
                    content: "stages: []".to_string(),
                }],
            )
            .await
            .expect("commit");
        assert_eq!(commit.id, "f00d");

        let body: serde_json::Value =
            serde_json::from_slice(&transport.requests()[0].body).expect("json");
        assert_eq!(body["commit_message"], "add CI");
        assert_eq!(body["actions"][0]["action"], "create");
        assert_eq!(body["actions"][0]["file_path"], ".gitlab-ci.yml");
    }

    #[tokio::test]
    async fn test_current_user_keeps_failed_reply() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/user"),
            response(401, Vec::new(), r#"{"message":"401 Unauthorized"}"#),
        );

        let reply = client(&transport)
            .current_user(&AccessToken::personal("bad"))
            .await
            .expect("reply");
        assert_eq!(reply.status, 401);
        assert_eq!(reply.user, None);
        assert!(reply.body.contains("Unauthorized"));
    }
}
