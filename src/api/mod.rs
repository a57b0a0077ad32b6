//! HTTP access for feeds: a plain transport and an OAuth-authenticated client

pub mod client;
pub mod transport;

use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::auth::AuthError;
use crate::config::HttpConfig;

pub use client::{ApiResponse, AuthenticatedClient};
pub use transport::HttpTransport;

/// Why a request produced no data. Logged, never propagated past a feed.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("credential for {service_id} rejected again after refresh")]
    CredentialRejected { service_id: String },
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Shared HTTP client with finite timeouts, so a stuck server cannot block
/// an updater forever.
pub fn build_http(config: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("mirror-feeds/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}
