//! GitHub REST client over the shared HTTP transport.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::api::GitHubApi;
use super::error::{GitHubError, classify_response};
use super::types::{
    GitHubCommit, GitHubPublicKey, GitHubRef, GitHubRepo, GitHubSecretList, GitHubTag,
    GitHubUser, IdentityReply, WorkflowRun, WorkflowRunList,
};
use crate::http::{
    HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
    encode_segment as segment,
};
use crate::source::scopes::parse_scopes;
use crate::source::{AccessToken, Result};

/// REST API version pinned on every request.
const API_VERSION: &str = "2022-11-28";

/// Page size for listings the client walks completely.
const PAGE_SIZE: usize = 100;

/// GitHub API client.
///
/// Implements [`GitHubApi`] here and
/// [`GitHubGraphQl`](super::GitHubGraphQl) in the `graphql` module. The
/// credential is passed on every call; the client itself holds none.
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    graphql_url: String,
}

impl GitHubClient {
    /// Create a client for `api_url` (`https://api.github.com`, or
    /// `https://<host>/api/v3` for GitHub Enterprise Server).
    pub fn new(api_url: &str, timeout: StdDuration) -> std::result::Result<Self, GitHubError> {
        let transport =
            ReqwestTransport::new(timeout).map_err(|e| GitHubError::Config(e.to_string()))?;
        Self::new_with_transport(api_url, Arc::new(transport))
    }

    pub fn new_with_transport(
        api_url: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> std::result::Result<Self, GitHubError> {
        Url::parse(api_url)
            .map_err(|e| GitHubError::Config(format!("invalid GitHub API URL '{api_url}': {e}")))?;

        let api_url = api_url.trim_end_matches('/').to_string();
        let graphql_url = match api_url.strip_suffix("/api/v3") {
            Some(host) => format!("{host}/api/graphql"),
            None => format!("{api_url}/graphql"),
        };

        Ok(Self {
            transport,
            api_url,
            graphql_url,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn graphql_url(&self) -> &str {
        &self.graphql_url
    }

    fn headers(token: &AccessToken) -> HttpHeaders {
        vec![
            (
                "Accept".to_string(),
                "application/vnd.github+json".to_string(),
            ),
            ("X-GitHub-Api-Version".to_string(), API_VERSION.to_string()),
            ("User-Agent".to_string(), "scc".to_string()),
            (
                "Authorization".to_string(),
                format!("Bearer {}", token.token),
            ),
        ]
    }

    pub(crate) async fn send(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<HttpResponse, GitHubError> {
        tracing::trace!("{} {}", request.method.as_str(), request.url);
        self.transport
            .send(request)
            .await
            .map_err(|e| GitHubError::Http(e.to_string()))
    }

    /// Send and fail on any non-2xx reply.
    async fn send_checked(
        &self,
        request: HttpRequest,
        resource: &str,
    ) -> std::result::Result<HttpResponse, GitHubError> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(classify_response(&response, resource));
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        path: &str,
    ) -> std::result::Result<T, GitHubError> {
        let url = format!("{}{}", self.api_url, path);
        let request = HttpRequest::new(HttpMethod::Get, url, Self::headers(token));
        let response = self.send_checked(request, path).await?;
        Ok(response.json()?)
    }

    async fn send_json<B: Serialize + Sync>(
        &self,
        method: HttpMethod,
        token: &AccessToken,
        path: &str,
        body: &B,
    ) -> std::result::Result<HttpResponse, GitHubError> {
        let url = format!("{}{}", self.api_url, path);
        let request = HttpRequest::new(method, url, Self::headers(token)).with_json(body)?;
        self.send_checked(request, path).await
    }

    pub(crate) async fn post_graphql(
        &self,
        token: &AccessToken,
        body: &serde_json::Value,
    ) -> std::result::Result<HttpResponse, GitHubError> {
        let request = HttpRequest::new(
            HttpMethod::Post,
            self.graphql_url.clone(),
            Self::headers(token),
        )
        .with_json(body)?;
        self.send_checked(request, "graphql").await
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn authenticated_user(&self, token: &AccessToken) -> Result<IdentityReply> {
        let url = format!("{}/user", self.api_url);
        let response = self
            .send(HttpRequest::new(HttpMethod::Get, url, Self::headers(token)))
            .await?;

        let login = response.json::<GitHubUser>().ok().map(|user| user.login);
        let scopes = response
            .header("x-oauth-scopes")
            .map(parse_scopes)
            .unwrap_or_default();

        Ok(IdentityReply {
            status: response.status,
            login,
            scopes,
            body: response.text(),
        })
    }

    async fn get_repo(&self, token: &AccessToken, owner: &str, repo: &str) -> Result<GitHubRepo> {
        Ok(self
            .get(
                token,
                &format!("/repos/{}/{}", segment(owner), segment(repo)),
            )
            .await?)
    }

    async fn create_repo(
        &self,
        token: &AccessToken,
        org: Option<&str>,
        name: &str,
    ) -> Result<GitHubRepo> {
        let path = match org {
            Some(org) => format!("/orgs/{}/repos", segment(org)),
            None => "/user/repos".to_string(),
        };
        let body = serde_json::json!({ "name": name, "auto_init": true });
        let response = self.send_json(HttpMethod::Post, token, &path, &body).await?;
        Ok(response.json().map_err(GitHubError::from)?)
    }

    async fn list_tags(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        per_page: u32,
    ) -> Result<Vec<GitHubTag>> {
        Ok(self
            .get(
                token,
                &format!(
                    "/repos/{}/{}/tags?per_page={}",
                    segment(owner),
                    segment(repo),
                    per_page
                ),
            )
            .await?)
    }

    async fn get_ref(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<GitHubRef> {
        Ok(self
            .get(
                token,
                &format!(
                    "/repos/{}/{}/git/ref/{}",
                    segment(owner),
                    segment(repo),
                    git_ref
                ),
            )
            .await?)
    }

    async fn list_secret_names(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut page = 1u32;

        loop {
            let list: GitHubSecretList = self
                .get(
                    token,
                    &format!(
                        "/repos/{}/{}/actions/secrets?per_page={}&page={}",
                        segment(owner),
                        segment(repo),
                        PAGE_SIZE,
                        page
                    ),
                )
                .await?;

            let count = list.secrets.len();
            names.extend(list.secrets.into_iter().map(|s| s.name));

            if count < PAGE_SIZE || names.len() >= list.total_count {
                break;
            }
            page += 1;
        }

        Ok(names)
    }

    async fn get_public_key(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
    ) -> Result<GitHubPublicKey> {
        Ok(self
            .get(
                token,
                &format!(
                    "/repos/{}/{}/actions/secrets/public-key",
                    segment(owner),
                    segment(repo)
                ),
            )
            .await?)
    }

    async fn put_secret(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        name: &str,
        encrypted_value: &str,
        key_id: &str,
    ) -> Result<()> {
        let path = format!(
            "/repos/{}/{}/actions/secrets/{}",
            segment(owner),
            segment(repo),
            segment(name)
        );
        let body = serde_json::json!({ "encrypted_value": encrypted_value, "key_id": key_id });
        self.send_json(HttpMethod::Put, token, &path, &body).await?;
        Ok(())
    }

    async fn list_workflow_runs(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        workflow_file: &str,
    ) -> Result<Vec<WorkflowRun>> {
        let list: WorkflowRunList = self
            .get(
                token,
                &format!(
                    "/repos/{}/{}/actions/workflows/{}/runs?per_page={}",
                    segment(owner),
                    segment(repo),
                    segment(workflow_file),
                    PAGE_SIZE
                ),
            )
            .await?;
        Ok(list.workflow_runs)
    }

    async fn dispatch_workflow(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        workflow_file: &str,
        git_ref: &str,
    ) -> Result<()> {
        let path = format!(
            "/repos/{}/{}/actions/workflows/{}/dispatches",
            segment(owner),
            segment(repo),
            segment(workflow_file)
        );
        let body = serde_json::json!({ "ref": git_ref });
        self.send_json(HttpMethod::Post, token, &path, &body).await?;
        Ok(())
    }

    async fn get_commit(
        &self,
        token: &AccessToken,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<GitHubCommit> {
        Ok(self
            .get(
                token,
                &format!(
                    "/repos/{}/{}/commits/{}",
                    segment(owner),
                    segment(repo),
                    sha
                ),
            )
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockTransport;
    use crate::source::ErrorKind;

    const API: &str = "https://api.github.test";

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

    fn client(transport: &MockTransport) -> GitHubClient {
        GitHubClient::new_with_transport(API, Arc::new(transport.clone())).expect("valid url")
    }

    fn token() -> AccessToken {
        AccessToken::personal("ghp_test")
    }

    #[test]
    fn graphql_url_follows_api_url() {
        let transport = MockTransport::new();
        assert_eq!(
            client(&transport).graphql_url(),
            "https://api.github.test/graphql"
        );

        let ghes = GitHubClient::new_with_transport(
            "https://ghe.example.com/api/v3/",
            Arc::new(transport.clone()),
        )
        .expect("valid url");
        assert_eq!(ghes.api_url(), "https://ghe.example.com/api/v3");
        assert_eq!(ghes.graphql_url(), "https://ghe.example.com/api/graphql");

        assert!(GitHubClient::new_with_transport("not a url", Arc::new(transport)).is_err());
    }

    #[tokio::test]
    async fn authenticated_user_reports_status_and_scopes() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/user"),
            response(
                200,
                vec![("X-OAuth-Scopes", "repo, read:org")],
                r#"{"login":"octocat"}"#,
            ),
        );

        let reply = client(&transport)
            .authenticated_user(&token())
            .await
            .expect("identity");
        assert_eq!(reply.status, 200);
        assert_eq!(reply.login.as_deref(), Some("octocat"));
        assert_eq!(reply.scopes, vec!["repo", "read:org"]);

        let requests = transport.requests();
        assert!(
            requests[0]
                .headers
                .contains(&("Authorization".to_string(), "Bearer ghp_test".to_string()))
        );
    }

    #[tokio::test]
    async fn authenticated_user_returns_unauthorized_reply() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/user"),
            response(401, Vec::new(), r#"{"message":"Bad credentials"}"#),
        );

        let reply = client(&transport)
            .authenticated_user(&token())
            .await
            .expect("reply, not error");
        assert_eq!(reply.status, 401);
        assert_eq!(reply.login, None);
        assert!(reply.body.contains("Bad credentials"));
    }

    #[tokio::test]
    async fn create_repo_targets_org_or_user_namespace() {
        let transport = MockTransport::new();
        let repo = r#"{"name":"demo","full_name":"acme/demo","html_url":"https://github.com/acme/demo","node_id":"R_1","owner":{"login":"acme"},"default_branch":"main"}"#;
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/orgs/acme/repos"),
            response(201, Vec::new(), repo),
        );
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/user/repos"),
            response(201, Vec::new(), repo),
        );

        let gh = client(&transport);
        gh.create_repo(&token(), Some("acme"), "demo")
            .await
            .expect("org repo");
        gh.create_repo(&token(), None, "demo")
            .await
            .expect("user repo");

        let requests = transport.requests();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json body");
        assert_eq!(body["name"], "demo");
        assert_eq!(body["auto_init"], true);
        assert_eq!(requests[1].url, format!("{API}/user/repos"));
    }

    #[tokio::test]
    async fn list_secret_names_walks_pages() {
        let transport = MockTransport::new();
        let first: Vec<serde_json::Value> = (0..100)
            .map(|i| serde_json::json!({ "name": format!("S{i}") }))
            .collect();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/repos/acme/demo/actions/secrets?per_page=100&page=1"),
            response(
                200,
                Vec::new(),
                serde_json::json!({ "total_count": 101, "secrets": first }).to_string(),
            ),
        );
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/repos/acme/demo/actions/secrets?per_page=100&page=2"),
            response(
                200,
                Vec::new(),
                r#"{"total_count":101,"secrets":[{"name":"ASERTO_PUSH_KEY"}]}"#,
            ),
        );

        let names = client(&transport)
            .list_secret_names(&token(), "acme", "demo")
            .await
            .expect("secrets");
        assert_eq!(names.len(), 101);
        assert_eq!(names.last().map(String::as_str), Some("ASERTO_PUSH_KEY"));
    }

    #[tokio::test]
    async fn secondary_rate_limit_reply_is_classified() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/repos/acme/demo/tags?per_page=1"),
            response(
                403,
                vec![("Retry-After", "12")],
                r#"{"message":"secondary rate limit"}"#,
            ),
        );

        let err = client(&transport)
            .list_tags(&token(), "acme", "demo", 1)
            .await
            .expect_err("rate limited");
        assert_eq!(err.kind(), ErrorKind::SecondaryRateLimit);
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(12)));
    }

    #[tokio::test]
    async fn missing_ref_is_not_found() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{API}/repos/acme/demo/git/ref/heads/main"),
            response(404, Vec::new(), r#"{"message":"Not Found"}"#),
        );

        let err = client(&transport)
            .get_ref(&token(), "acme", "demo", "heads/main")
            .await
            .expect_err("no ref");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn dispatch_and_put_secret_send_expected_bodies() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Post,
            format!("{API}/repos/acme/demo/actions/workflows/release.yml/dispatches"),
            response(204, Vec::new(), ""),
        );
        transport.push_response(
            HttpMethod::Put,
            format!("{API}/repos/acme/demo/actions/secrets/PUSH_KEY"),
            response(201, Vec::new(), ""),
        );

        let gh = client(&transport);
        gh.dispatch_workflow(&token(), "acme", "demo", "release.yml", "v0.0.0")
            .await
            .expect("dispatch");
        gh.put_secret(&token(), "acme", "demo", "PUSH_KEY", "c2VhbGVk", "key-1")
            .await
            .expect("secret");

        let requests = transport.requests();
        let dispatch: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json");
        assert_eq!(dispatch["ref"], "v0.0.0");
        let secret: serde_json::Value = serde_json::from_slice(&requests[1].body).expect("json");
        assert_eq!(secret["encrypted_value"], "c2VhbGVk");
        assert_eq!(secret["key_id"], "key-1");
    }

    #[tokio::test]
    async fn transport_failure_is_a_connection_error() {
        let transport = MockTransport::new();
        let err = client(&transport)
            .get_commit(&token(), "acme", "demo", "abc")
            .await
            .expect_err("no mock registered");
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
