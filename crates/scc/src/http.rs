//! Transport seam shared by the GitHub and GitLab clients.
//!
//! Clients build an [`HttpRequest`], hand it to an [`HttpTransport`] and
//! classify the [`HttpResponse`] themselves. Non-2xx replies are ordinary
//! responses here; only failures to get a reply at all are [`HttpError`]s.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Verbs the provider APIs are called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

/// Header name/value pairs in wire order. Lookups ignore ASCII case.
pub type HttpHeaders = Vec<(String, String)>;

/// First value of header `name`.
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers.iter().find_map(|(key, value)| {
        key.eq_ignore_ascii_case(name).then_some(value.as_str())
    })
}

/// Percent-encode one URL path segment, `/` included, so that
/// `group/project` can be used as a single GitLab project id.
#[must_use]
pub fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpRequest {
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>, headers: HttpHeaders) -> Self {
        Self {
            method,
            url: url.into(),
            headers,
            body: Vec::new(),
        }
    }

    /// Serialize `body` as the JSON payload.
    pub fn with_json(self, body: &impl Serialize) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_vec(body)?;
        let mut headers = self.headers;
        headers.push(("Content-Type".into(), "application/json".into()));
        Ok(Self {
            headers,
            body: payload,
            ..self
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    /// Header `name` parsed as `T`; `None` when absent or malformed.
    #[must_use]
    pub fn header_value<T: FromStr>(&self, name: &str) -> Option<T> {
        self.header(name).and_then(|v| v.trim().parse().ok())
    }

    /// Cooldown from a `Retry-After` header given in seconds.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.header_value::<u64>("retry-after")
            .map(Duration::from_secs)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200..=299)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text, with invalid UTF-8 replaced.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The request never produced a reply.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("could not build HTTP client: {0}")]
    Client(String),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[cfg(test)]
    #[error("no canned reply for {method} {url}")]
    Unrouted { method: &'static str, url: String },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// [`HttpTransport`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Client with a per-request `timeout` and an `scc/<version>` user agent.
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("scc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map(Self::from_client)
            .map_err(|e| HttpError::Client(e.to_string()))
    }

    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout {
            url: url.to_string(),
        }
    } else {
        HttpError::Connect {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method.into(), &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let reply = builder.send().await.map_err(|e| transport_error(&url, &e))?;

        let status = reply.status().as_u16();
        let headers = reply
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = reply.bytes().await.map_err(|e| transport_error(&url, &e))?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
pub(crate) use mock::MockTransport;

#[cfg(test)]
mod mock {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    use super::*;

    #[derive(Default)]
    struct Routes {
        replies: BTreeMap<(HttpMethod, String), VecDeque<HttpResponse>>,
        seen: Vec<HttpRequest>,
    }

    /// Canned replies keyed by method and exact URL, served first in first
    /// out. Clones share state, so a test keeps one handle to inspect the
    /// requests the client sent.
    #[derive(Clone, Default)]
    pub(crate) struct MockTransport {
        routes: Arc<Mutex<Routes>>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        fn routes(&self) -> MutexGuard<'_, Routes> {
            self.routes.lock().unwrap_or_else(|e| e.into_inner())
        }

        pub(crate) fn push_response(
            &self,
            method: HttpMethod,
            url: impl Into<String>,
            response: HttpResponse,
        ) {
            self.routes()
                .replies
                .entry((method, url.into()))
                .or_default()
                .push_back(response);
        }

        /// Every request sent so far, in order.
        pub(crate) fn requests(&self) -> Vec<HttpRequest> {
            self.routes().seen.clone()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let mut routes = self.routes();
            let key = (request.method, request.url.clone());
            routes.seen.push(request);
            routes
                .replies
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .ok_or(HttpError::Unrouted {
                    method: key.0.as_str(),
                    url: key.1,
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: u16, headers: &[(&str, &str)]) -> HttpResponse {
        HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: Vec::new(),
        }
    }

    #[test]
    fn header_lookup_ignores_case_and_takes_first() {
        let resp = reply(200, &[("X-Next-Page", "2"), ("x-next-page", "3")]);
        assert_eq!(resp.header("x-next-page"), Some("2"));
        assert_eq!(resp.header_value::<u32>("X-NEXT-PAGE"), Some(2));
        assert_eq!(resp.header("x-total"), None);
    }

    #[test]
    fn retry_after_reads_whole_seconds() {
        assert_eq!(
            reply(403, &[("Retry-After", " 7 ")]).retry_after(),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            reply(403, &[("Retry-After", "Wed, 21 Oct 2015 07:28:00 GMT")]).retry_after(),
            None
        );
        assert_eq!(reply(429, &[]).retry_after(), None);
    }

    #[test]
    fn encode_segment_escapes_slashes() {
        assert_eq!(encode_segment("acme/svc"), "acme%2Fsvc");
        assert_eq!(encode_segment("release.yml"), "release.yml");
    }

    #[test]
    fn with_json_sets_body_and_content_type() {
        let req = HttpRequest::new(HttpMethod::Put, "https://example.com", Vec::new())
            .with_json(&serde_json::json!({"key_id": "k1"}))
            .expect("serializable body");
        assert_eq!(req.body, br#"{"key_id":"k1"}"#.to_vec());
        assert_eq!(
            header_get(&req.headers, "content-type"),
            Some("application/json")
        );
    }

    #[test]
    fn success_range_and_json_decoding() {
        let mut resp = reply(204, &[]);
        assert!(resp.is_success());
        resp.status = 409;
        assert!(!resp.is_success());

        resp.body = br#"{"message":"Git Repository is empty."}"#.to_vec();
        let value: serde_json::Value = resp.json().expect("json");
        assert_eq!(value["message"], "Git Repository is empty.");
    }

    #[tokio::test]
    async fn mock_serves_replies_in_order_and_records_requests() {
        let transport = MockTransport::new();
        let url = "https://gitlab.example.com/api/v4/groups";
        transport.push_response(HttpMethod::Get, url, reply(500, &[]));
        transport.push_response(HttpMethod::Get, url, reply(200, &[]));

        let req = HttpRequest::new(HttpMethod::Get, url, Vec::new());
        let first = transport.send(req.clone()).await.expect("first reply");
        let second = transport.send(req.clone()).await.expect("second reply");
        assert_eq!((first.status, second.status), (500, 200));
        assert_eq!(transport.requests().len(), 2);

        let err = transport.send(req).await.expect_err("queue drained");
        assert!(matches!(err, HttpError::Unrouted { method: "GET", .. }));
    }

    #[tokio::test]
    async fn reqwest_transport_reports_bad_urls_as_connect_errors() {
        let transport = ReqwestTransport::from_client(reqwest::Client::new());
        let err = transport
            .send(HttpRequest::new(HttpMethod::Get, "not a url", Vec::new()))
            .await
            .expect_err("invalid url");
        assert!(matches!(err, HttpError::Connect { ref url, .. } if url == "not a url"));
    }
}
