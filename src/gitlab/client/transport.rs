use log::{debug, warn};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::auth::Token;
use crate::error::{BridgeError, Result};

const USER_AGENT: &str = concat!("gitlab-ci-bridge/", env!("CARGO_PKG_VERSION"));
const NEXT_PAGE_HEADER: &str = "x-next-page";

/// Tuning knobs for talking to a GitLab instance.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// `per_page` sent on every list request (GitLab caps this at 100)
    pub page_size: usize,
    /// Retries for rate limiting, server errors and connection failures
    pub max_retries: u32,
    /// Delay between retries when GitLab sends no `Retry-After`
    pub retry_delay: Duration,
    /// Transport timeout for a single request
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_retries: 5,
            retry_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }
}

/// When a failed request may be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    /// GET and DELETE: any transient failure is retried
    Idempotent,
    /// POST: retried only when GitLab cannot have applied it (429, or no connection)
    Unapplied,
}

/// Authenticated client for the GitLab REST v4 API.
pub struct GitLabClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
    options: ClientOptions,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Option<Token>, options: ClientOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to create HTTP client: {e}")))?;

        let api_url = Url::parse(base_url)
            .map_err(|e| BridgeError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v4/")
            .map_err(|e| BridgeError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            options,
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub(super) fn http(&self) -> &Client {
        &self.client
    }

    pub fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    pub(super) fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|e| BridgeError::Config(format!("Invalid API URL '{path}': {e}")))
    }

    /// URL under `projects/:id/`, where `:id` is a numeric id or a full path.
    pub(super) fn project_url(&self, project: &str, suffix: &str) -> Result<Url> {
        self.endpoint(&format!(
            "projects/{}/{suffix}",
            urlencoding::encode(project)
        ))
    }

    /// Sends an idempotent request, retrying on network errors, rate limits and server errors.
    ///
    /// `build` is called once per attempt because a `RequestBuilder` is consumed by `send`.
    /// 404 maps to [`BridgeError::NotFound`], any other non-2xx to [`BridgeError::ApiError`].
    pub(super) async fn execute<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        self.execute_with(Replay::Idempotent, build).await
    }

    /// Like [`execute`](Self::execute), but a timeout or a 5xx is returned at once:
    /// GitLab may already have applied the request.
    pub(super) async fn execute_once<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        self.execute_with(Replay::Unapplied, build).await
    }

    async fn execute_with<F>(&self, replay: Replay, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retry_count = 0;
        loop {
            let response = match self.auth_request(build()).send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || (e.is_timeout() && replay == Replay::Idempotent) => {
                    if retry_count >= self.options.max_retries {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({}), retrying in {}s ({}/{})...",
                        e,
                        self.options.retry_delay.as_secs(),
                        retry_count + 1,
                        self.options.max_retries
                    );
                    tokio::time::sleep(self.options.retry_delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            let retryable = status == StatusCode::TOO_MANY_REQUESTS
                || (status.is_server_error() && replay == Replay::Idempotent);

            if retryable {
                if retry_count >= self.options.max_retries {
                    return Err(BridgeError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: retry_count,
                    });
                }

                let delay = retry_after(&response).unwrap_or(self.options.retry_delay);
                warn!(
                    "GitLab API error (status {status}). Waiting {} seconds before retry {}/{}...",
                    delay.as_secs(),
                    retry_count + 1,
                    self.options.max_retries
                );

                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                return Err(BridgeError::NotFound(response.url().path().to_string()));
            }

            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(BridgeError::ApiError {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }
    }

    pub(super) async fn get_json<T>(&self, url: Url) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.execute(|| self.client.get(url.clone())).await?;
        Ok(response.json().await?)
    }

    /// Fetches every page of a list endpoint by following `X-Next-Page`.
    pub(super) async fn get_paginated<T>(&self, url: Url, params: &[(&str, &str)]) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let page_param = page.to_string();
            let per_page = self.options.page_size.to_string();
            let mut query: Vec<(&str, &str)> = params.to_vec();
            query.push(("per_page", &per_page));
            query.push(("page", &page_param));

            let response = self
                .execute(|| self.client.get(url.clone()).query(&query))
                .await?;

            let next_page = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u32>().ok());

            let batch: Vec<T> = response.json().await?;
            debug!("Fetched page {page} of {} ({} items)", url.path(), batch.len());
            items.extend(batch);

            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(items)
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitlab::test_support::{client_with_retries, server_client, test_client};
    use crate::gitlab::types::Project;
    use mockito::Matcher;

    #[test]
    fn test_api_url_is_under_v4() {
        let client = GitLabClient::new(
            "https://gitlab.example.com",
            None,
            ClientOptions::default(),
        )
        .unwrap();
        assert_eq!(client.api_url().as_str(), "https://gitlab.example.com/api/v4/");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let result = GitLabClient::new("not a url", None, ClientOptions::default());
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_project_url_encodes_path() {
        let client = test_client("https://gitlab.example.com");
        let url = client.project_url("teamA/app", "repository/branches").unwrap();
        assert_eq!(
            url.as_str(),
            "https://gitlab.example.com/api/v4/projects/teamA%2Fapp/repository/branches"
        );
    }

    #[tokio::test]
    async fn test_paginated_follows_next_page_header() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/api/v4/projects")
            .match_query(Matcher::Exact("per_page=100&page=1".into()))
            .with_header("content-type", "application/json")
            .with_header("x-next-page", "2")
            .with_body(r#"[{"id":1,"path_with_namespace":"a/one"}]"#)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/api/v4/projects")
            .match_query(Matcher::Exact("per_page=100&page=2".into()))
            .with_header("content-type", "application/json")
            .with_header("x-next-page", "")
            .with_body(r#"[{"id":2,"path_with_namespace":"a/two"}]"#)
            .create_async()
            .await;

        let client = server_client(&server);
        let url = client.endpoint("projects").unwrap();
        let projects: Vec<Project> = client.get_paginated(url, &[]).await.unwrap();

        assert_eq!(projects.len(), 2);
        assert_eq!(projects[1].path_with_namespace, "a/two");
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_maps_to_not_found_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/user")
            .with_status(404)
            .with_body(r#"{"message":"404 Not Found"}"#)
            .create_async()
            .await;

        let client = server_client(&server);
        let url = client.endpoint("user").unwrap();
        let result: Result<serde_json::Value> = client.get_json(url).await;
        assert!(matches!(result, Err(BridgeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_forbidden_maps_to_api_error_with_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/user")
            .with_status(403)
            .with_body("403 Forbidden")
            .create_async()
            .await;

        let client = server_client(&server);
        let url = client.endpoint("user").unwrap();
        match client.get_json::<serde_json::Value>(url).await {
            Err(BridgeError::ApiError { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "403 Forbidden");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_without_retries_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/user")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let client = server_client(&server);
        let url = client.endpoint("user").unwrap();
        let result = client.get_json::<serde_json::Value>(url).await;

        assert!(matches!(
            result,
            Err(BridgeError::ApiErrorAfterRetries {
                status: 503,
                retries: 0
            })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_is_retried_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/user")
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let client = client_with_retries(&server.url(), 2);
        let url = client.endpoint("user").unwrap();
        let result = client.get_json::<serde_json::Value>(url).await;

        assert!(matches!(
            result,
            Err(BridgeError::ApiErrorAfterRetries {
                status: 502,
                retries: 2
            })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_is_not_replayed_after_server_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v4/projects/1/hooks")
            .with_status(502)
            .with_body("502 Bad Gateway")
            .expect(1)
            .create_async()
            .await;

        let client = client_with_retries(&server.url(), 2);
        let url = client.project_url("1", "hooks").unwrap();
        let result = client.execute_once(|| client.http().post(url.clone())).await;

        assert!(matches!(
            result,
            Err(BridgeError::ApiError { status: 502, .. })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_is_retried_when_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v4/projects/1/hooks")
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(3)
            .create_async()
            .await;

        let client = client_with_retries(&server.url(), 2);
        let url = client.project_url("1", "hooks").unwrap();
        let result = client.execute_once(|| client.http().post(url.clone())).await;

        assert!(matches!(
            result,
            Err(BridgeError::ApiErrorAfterRetries {
                status: 429,
                retries: 2
            })
        ));
        mock.assert_async().await;
    }
}
