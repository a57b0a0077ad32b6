//! Authenticated HTTP client for OAuth-protected APIs
//!
//! Wraps reqwest::Client with token injection and a single
//! refresh-and-retry when the server rejects the credential.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::ApiError;
use crate::auth::{AccessToken, ServiceCredentialConfig, TokenManager};

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends GETs signed with the current token of a service.
pub struct AuthenticatedClient {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
}

impl AuthenticatedClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenManager>) -> Self {
        Self { http, tokens }
    }

    /// One logical GET of `url` for the service described by `config`.
    ///
    /// A rejected credential (HTTP 401 or the service's invalid-token body)
    /// triggers one forced refresh and one retry; the retry's response is
    /// returned whatever it is. `None` means no token could be obtained or
    /// the transport failed.
    pub async fn execute(&self, url: &str, config: &ServiceCredentialConfig) -> Option<ApiResponse> {
        tracing::debug!("Requesting OAuth URL: {}", url);

        let token = match self.tokens.get_valid_token(config).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("No usable token for {}: {}", config.service_id, e);
                return None;
            }
        };

        let response = self.send(url, config, &token).await?;
        if !config.is_rejection(response.status, &response.body) {
            return Some(response);
        }

        tracing::warn!(
            "{} rejected the access token (HTTP {}), retrying once",
            config.service_id,
            response.status
        );
        let token = match self.tokens.force_refresh(config, &token).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Refresh after rejection failed for {}: {}", config.service_id, e);
                return None;
            }
        };

        let retry = self.send(url, config, &token).await?;
        if config.is_rejection(retry.status, &retry.body) {
            tracing::error!(
                "{}",
                ApiError::CredentialRejected {
                    service_id: config.service_id.clone()
                }
            );
        }
        Some(retry)
    }

    /// Body of a successful authenticated GET.
    pub async fn get(&self, url: &str, config: &ServiceCredentialConfig) -> Option<String> {
        let response = self.execute(url, config).await?;
        if !response.is_success() {
            tracing::warn!(
                "{}",
                ApiError::Status {
                    status: response.status,
                    url: url.to_string()
                }
            );
            return None;
        }
        Some(response.body)
    }

    /// Like [`get`](Self::get), decoding the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        config: &ServiceCredentialConfig,
    ) -> Option<T> {
        let body = self.get(url, config).await?;
        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("{}", ApiError::Parse(e));
                None
            }
        }
    }

    async fn send(
        &self,
        url: &str,
        config: &ServiceCredentialConfig,
        token: &AccessToken,
    ) -> Option<ApiResponse> {
        match self.try_send(url, config, token).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!("OAuth request to {} failed: {}", url, e);
                None
            }
        }
    }

    async fn try_send(
        &self,
        url: &str,
        config: &ServiceCredentialConfig,
        token: &AccessToken,
    ) -> Result<ApiResponse, ApiError> {
        let signed = config
            .scheme
            .sign(url, config, token, self.tokens.clock().now())?;
        let resp = self.http.get(signed).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(ApiResponse { status, body })
    }
}
