//! HTTP control plane client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use tracing::debug;

use super::ControlPlane;
use super::wire::{ApiError, CreateResourceRequest, ResourceDocument};
use crate::error::ControlPlaneError;
use crate::model::{Config, ResourceId};

/// Client for a control plane speaking the rigger HTTP protocol.
pub struct HttpControlPlane {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpControlPlane {
    /// `endpoint` is the server root, e.g. `https://cp.example.com`.
    pub fn new(
        endpoint: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ControlPlaneError> {
        let mut base = Url::parse(endpoint).map_err(|e| {
            ControlPlaneError::Provider(format!("invalid endpoint '{}': {}", endpoint, e))
        })?;
        base.path_segments_mut()
            .map_err(|_| {
                ControlPlaneError::Provider(format!("endpoint '{}' cannot be a base URL", endpoint))
            })?
            .pop_if_empty()
            .extend(["api", "v1"]);

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rigger/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ControlPlaneError::Provider(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base,
            token,
        })
    }

    fn resource_url(&self, id: &ResourceId) -> Url {
        let mut url = self.base.clone();
        // base was validated as a base URL in new()
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(["resources", id.kind.as_str(), id.name.as_str()]);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn describe(&self, id: &ResourceId) -> Result<Option<Config>, ControlPlaneError> {
        let url = self.resource_url(id);
        debug!(resource = %id, url = %url, "GET");

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let document: ResourceDocument = response.json().await.map_err(transport_error)?;
                Ok(Some(document.config))
            }
            _ => Err(status_error(response).await),
        }
    }

    async fn create(&self, id: &ResourceId, config: &Config) -> Result<Config, ControlPlaneError> {
        let url = self.resource_url(id);
        debug!(resource = %id, url = %url, "POST");

        let body = CreateResourceRequest {
            config: config.clone(),
        };
        let response = self
            .authorize(self.client.post(url).json(&body))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            let document: ResourceDocument = response.json().await.map_err(transport_error)?;
            Ok(document.config)
        } else {
            Err(status_error(response).await)
        }
    }
}

/// Any failure that left us without a complete response is transient; the
/// request may be retried.
fn transport_error(e: reqwest::Error) -> ControlPlaneError {
    if e.is_decode() {
        ControlPlaneError::Provider(format!("malformed response: {}", e))
    } else if e.is_builder() {
        ControlPlaneError::Provider(e.to_string())
    } else if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        ControlPlaneError::Transient(e.to_string())
    } else {
        ControlPlaneError::Provider(e.to_string())
    }
}

/// Map a non-success response to the error taxonomy, keeping the provider's
/// message verbatim.
async fn status_error(response: Response) -> ControlPlaneError {
    let status = response.status();
    let message = match response.json::<ApiError>().await {
        Ok(body) => format!("HTTP {}: {}", status.as_u16(), body.error),
        Err(_) => format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("unknown status")
        ),
    };
    classify_status(status, message)
}

fn classify_status(status: StatusCode, message: String) -> ControlPlaneError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ControlPlaneError::Permission(message),
        StatusCode::CONFLICT => ControlPlaneError::Conflict(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            ControlPlaneError::Transient(message)
        }
        s if s.is_server_error() => ControlPlaneError::Transient(message),
        _ => ControlPlaneError::Provider(message),
    }
}
