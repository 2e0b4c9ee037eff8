//! Shared JSON-over-HTTP plumbing for sibling service clients.
//!
//! Every sibling RPC is a `POST` of a JSON body to `<base_url><path>`.
//! 404 is surfaced as `None` so callers can map it to their own domain
//! error; any other failure becomes `LiveError::Upstream`.

use crate::errors::LiveError;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};

/// Default timeout for sibling service requests in seconds.
const UPSTREAM_REQUEST_TIMEOUT_SECS: u64 = 5;

/// HTTP transport for one sibling service.
#[derive(Clone)]
pub struct UpstreamHttp {
    client: Client,
    base_url: String,
    service: &'static str,
}

impl UpstreamHttp {
    /// Create a transport for `service` rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `LiveError::Internal` if the HTTP client cannot be built.
    pub fn new(service: &'static str, base_url: &str) -> Result<Self, LiveError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(UPSTREAM_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| {
                error!(target: "live.upstream", service, error = %e, "Failed to build HTTP client");
                LiveError::Internal(format!("Failed to build {service} HTTP client"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
        })
    }

    /// POST `body` to `path` and decode the JSON reply. `None` on 404.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<Option<T>, LiveError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let service = self.service;
        let url = format!("{}{path}", self.base_url);

        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            warn!(target: "live.upstream", service, path, error = %e, "Upstream request failed");
            LiveError::Upstream(format!("{service} unavailable: {e}"))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!(target: "live.upstream", service, path, status = %status, "Upstream returned error");
            return Err(LiveError::Upstream(format!("{service} returned {status}")));
        }

        response.json::<T>().await.map(Some).map_err(|e| {
            error!(target: "live.upstream", service, path, error = %e, "Failed to parse upstream response");
            LiveError::Upstream(format!("{service} returned malformed body"))
        })
    }

    /// POST `body` to `path`, ignoring any reply body.
    pub async fn send<B>(&self, path: &str, body: &B) -> Result<(), LiveError>
    where
        B: Serialize + Sync,
    {
        let service = self.service;
        let url = format!("{}{path}", self.base_url);

        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            warn!(target: "live.upstream", service, path, error = %e, "Upstream request failed");
            LiveError::Upstream(format!("{service} unavailable: {e}"))
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            warn!(target: "live.upstream", service, path, status = %status, "Upstream returned error");
            Err(LiveError::Upstream(format!("{service} returned {status}")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Echo {
        value: u32,
    }

    #[tokio::test]
    async fn test_post_decodes_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/echo"))
            .and(body_json(json!({"value": 7})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 7})))
            .mount(&server)
            .await;

        let http = UpstreamHttp::new("echo", &format!("{}/", server.uri())).unwrap();
        let reply: Option<Echo> = http.post("/v1/echo", &json!({"value": 7})).await.unwrap();
        assert_eq!(reply, Some(Echo { value: 7 }));
    }

    #[tokio::test]
    async fn test_post_maps_not_found_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let http = UpstreamHttp::new("echo", &server.uri()).unwrap();
        let reply: Option<Echo> = http.post("/v1/echo", &json!({})).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let http = UpstreamHttp::new("echo", &server.uri()).unwrap();
        let result: Result<Option<Echo>, _> = http.post("/v1/echo", &json!({})).await;
        assert!(matches!(result, Err(LiveError::Upstream(_))));

        let result = http.send("/v1/echo", &json!({})).await;
        assert!(matches!(result, Err(LiveError::Upstream(_))));
    }
}
