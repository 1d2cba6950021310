use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::endpoints::{ApiRequest, ReleaseSource};
use crate::auth::Token;
use crate::error::{DeployLensError, Result};
use crate::normalize::normalize;

/// HTTP client for the dashboard backend.
///
/// Requests are issued once: no retries and no client-side timeouts.
/// Cancellation is handled by the fetch registry dropping the future.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
    release_source: ReleaseSource,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("deploylens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeployLensError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Without a trailing slash `join` would replace the last path segment.
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        let api_url = Url::parse(&base)
            .map_err(|e| DeployLensError::Config(format!("Invalid base URL: {e}")))?
            .join("api/")
            .map_err(|e| DeployLensError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            release_source: ReleaseSource::default(),
        })
    }

    pub fn with_release_source(mut self, release_source: ReleaseSource) -> Self {
        self.release_source = release_source;
        self
    }

    pub fn release_source(&self) -> ReleaseSource {
        self.release_source
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// Full URL for `request`, query string included.
    pub fn request_url(&self, request: &ApiRequest) -> Result<Url> {
        let mut url = self
            .api_url
            .join(request.endpoint().path())
            .map_err(|e| DeployLensError::Config(format!("Invalid endpoint URL: {e}")))?;

        if !request.params().is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in request.params() {
                pairs.append_pair(name, value);
            }
        }

        Ok(url)
    }

    /// Sends `request` and decodes the body as JSON. An empty body decodes to `null`.
    pub async fn get_json(&self, request: &ApiRequest) -> Result<Value> {
        request.validate()?;
        let url = self.request_url(request)?;
        debug!("GET {url}");

        let response = self.auth_request(self.client.get(url)).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(DeployLensError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Sends `request` and normalizes the body into a record sequence.
    pub async fn fetch_records<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Vec<T>> {
        let body = self.get_json(&request).await?;
        let endpoint = request.endpoint();
        normalize(endpoint.path(), body, endpoint.wrapper_fields())
    }
}
