//! Unauthenticated GET transport

use serde::de::DeserializeOwned;

use super::ApiError;

/// Plain HTTP(S) GET; every failure collapses to `None`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Body of a successful GET, or `None` on any I/O error or non-2xx status.
    pub async fn get(&self, url: &str) -> Option<String> {
        tracing::debug!("Requesting URL: {}", url);
        match self.try_get(url).await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!("Request failed: {}", e);
                None
            }
        }
    }

    /// Like [`get`](Self::get), decoding the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Option<T> {
        let body = self.get(url).await?;
        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("{}", ApiError::Parse(e));
                None
            }
        }
    }

    async fn try_get(&self, url: &str) -> Result<String, ApiError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }
}
