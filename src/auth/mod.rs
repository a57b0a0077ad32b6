//! Credential lifecycle for OAuth-protected feeds
//!
//! Keeps one long-lived credential per service usable without user
//! interaction: tokens are persisted in a [`CredentialStore`], refreshed
//! before their declared expiry, and refreshed again when a resource server
//! rejects them.

pub mod error;
pub mod manager;
pub mod oauth;
pub mod signature;
pub mod store;
pub mod tokens;

use anyhow::{ensure, Context, Result};
use url::Url;

pub use error::{AuthError, StoreError};
pub use manager::TokenManager;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use tokens::{AccessToken, Clock, PersistedTokenRecord, SystemClock};

use signature::OAuth1Signer;

/// How a token endpoint wraps its refresh response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenResponseFormat {
    /// RFC 6749 section 5.1 JSON
    Standard,
    /// `{"status": 0, "body": { ...standard fields... }}` (Withings)
    Enveloped,
}

/// OAuth 2.0 endpoints and bearer placement for one vendor.
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub authorize_url: String,
    pub token_url: String,
    pub response_format: TokenResponseFormat,
    /// Query parameter that carries the bearer token on resource requests
    pub access_token_param: String,
}

/// OAuth 1.0a endpoint for one vendor.
#[derive(Debug, Clone)]
pub struct OAuth1aConfig {
    /// Endpoint that renews an access token from its session handle
    pub access_token_url: String,
}

/// Signature scheme and endpoints of a service.
#[derive(Debug, Clone)]
pub enum AuthScheme {
    OAuth1a(OAuth1aConfig),
    OAuth2(OAuth2Config),
}

pub const WITHINGS_AUTHORIZE_URL: &str = "https://account.withings.com/oauth2_user/authorize2";
pub const WITHINGS_TOKEN_URL: &str = "https://wbsapi.withings.net/v2/oauth2?action=requesttoken";
pub const NOKIA_HEALTH_AUTHORIZE_URL: &str = "https://account.health.nokia.com/oauth2_user/authorize2";
pub const NOKIA_HEALTH_TOKEN_URL: &str = "https://account.health.nokia.com/oauth2/token";

impl AuthScheme {
    /// Withings OAuth 2.0 (enveloped token responses, bearer in the query).
    pub fn withings_at(authorize_url: &str, token_url: &str) -> Self {
        Self::oauth2(authorize_url, token_url, TokenResponseFormat::Enveloped)
    }

    /// Nokia Health OAuth 2.0 (standard token responses, bearer in the query).
    pub fn nokia_health_at(authorize_url: &str, token_url: &str) -> Self {
        Self::oauth2(authorize_url, token_url, TokenResponseFormat::Standard)
    }

    fn oauth2(authorize_url: &str, token_url: &str, response_format: TokenResponseFormat) -> Self {
        AuthScheme::OAuth2(OAuth2Config {
            authorize_url: authorize_url.to_string(),
            token_url: token_url.to_string(),
            response_format,
            access_token_param: "access_token".to_string(),
        })
    }

    fn endpoint_urls(&self) -> Vec<&str> {
        match self {
            AuthScheme::OAuth1a(c) => vec![c.access_token_url.as_str()],
            AuthScheme::OAuth2(c) => vec![c.authorize_url.as_str(), c.token_url.as_str()],
        }
    }

    /// Attach `token` to a resource GET of `url`.
    pub fn sign(
        &self,
        url: &str,
        config: &ServiceCredentialConfig,
        token: &AccessToken,
        now: u64,
    ) -> Result<Url, AuthError> {
        match self {
            AuthScheme::OAuth2(c) => {
                let mut url = Url::parse(url)?;
                url.query_pairs_mut()
                    .append_pair(&c.access_token_param, &token.value);
                Ok(url)
            }
            AuthScheme::OAuth1a(_) => {
                let signer = OAuth1Signer {
                    consumer_key: &config.client_id,
                    consumer_secret: &config.client_secret,
                    token: Some(&token.value),
                    token_secret: &token.secret,
                };
                signer.sign_url("GET", url, &[], now, &signature::nonce())
            }
        }
    }
}

/// Everything the token manager needs to keep one service authenticated.
#[derive(Debug, Clone)]
pub struct ServiceCredentialConfig {
    /// Scopes persisted storage; must stay stable across releases
    pub service_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// Bootstrap credential, used only while nothing is persisted
    pub initial_refresh_token: String,
    pub scheme: AuthScheme,
    /// Response body the API returns for an invalid access token
    pub invalid_token_response: Option<String>,
}

impl ServiceCredentialConfig {
    /// Validate and build a service config. Fails on anything that would
    /// only surface later as a refresh error on every tick.
    pub fn new(
        service_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        initial_refresh_token: impl Into<String>,
        scheme: AuthScheme,
    ) -> Result<Self> {
        let config = Self {
            service_id: service_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            initial_refresh_token: initial_refresh_token.into(),
            scheme,
            invalid_token_response: None,
        };

        ensure!(!config.service_id.trim().is_empty(), "service id is required");
        ensure!(
            !config.client_id.is_empty(),
            "{}: client id is required",
            config.service_id
        );
        ensure!(
            !config.client_secret.is_empty(),
            "{}: client secret is required",
            config.service_id
        );
        ensure!(
            !config.initial_refresh_token.is_empty(),
            "{}: initial refresh token is required",
            config.service_id
        );
        for endpoint in config.scheme.endpoint_urls() {
            Url::parse(endpoint).with_context(|| {
                format!("{}: invalid endpoint URL {}", config.service_id, endpoint)
            })?;
        }

        Ok(config)
    }

    pub fn with_invalid_token_response(mut self, body: impl Into<String>) -> Self {
        self.invalid_token_response = Some(body.into());
        self
    }

    /// Whether a response is the service telling us the token is no good.
    pub fn is_rejection(&self, status: u16, body: &str) -> bool {
        status == 401
            || self
                .invalid_token_response
                .as_deref()
                .is_some_and(|sentinel| sentinel == body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn withings() -> AuthScheme {
        AuthScheme::withings_at(WITHINGS_AUTHORIZE_URL, WITHINGS_TOKEN_URL)
    }

    fn token() -> AccessToken {
        AccessToken {
            value: "tok en".to_string(),
            refresh_token: "r".to_string(),
            secret: "s".to_string(),
            expires_in: 0,
            issued_at: 0,
        }
    }

    #[test]
    fn test_config_rejects_missing_fields() {
        assert!(ServiceCredentialConfig::new("", "id", "secret", "rt", withings())
            .is_err());
        assert!(
            ServiceCredentialConfig::new("svc", "id", "secret", "", withings())
                .is_err()
        );
        let bad_url = AuthScheme::OAuth1a(OAuth1aConfig {
            access_token_url: "not a url".to_string(),
        });
        assert!(ServiceCredentialConfig::new("svc", "id", "secret", "rt", bad_url).is_err());
        assert!(
            ServiceCredentialConfig::new("svc", "id", "secret", "rt", withings())
                .is_ok()
        );
    }

    #[test]
    fn test_rejection_detection() {
        let config =
            ServiceCredentialConfig::new("svc", "id", "secret", "rt", withings())
                .unwrap();
        assert!(config.is_rejection(401, ""));
        assert!(!config.is_rejection(200, r#"{"status":401}"#));

        let config = config.with_invalid_token_response(r#"{"status":401}"#);
        assert!(config.is_rejection(200, r#"{"status":401}"#));
        assert!(!config.is_rejection(200, r#"{"status":0}"#));
    }

    #[test]
    fn test_oauth2_sign_appends_bearer_query() {
        let scheme = withings();
        let config =
            ServiceCredentialConfig::new("svc", "id", "secret", "rt", scheme.clone()).unwrap();
        let url = scheme
            .sign("https://example.com/measure?action=getmeas", &config, &token(), 0)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/measure?action=getmeas&access_token=tok+en"
        );
    }

    #[test]
    fn test_nokia_health_uses_standard_responses() {
        let scheme = AuthScheme::nokia_health_at(NOKIA_HEALTH_AUTHORIZE_URL, NOKIA_HEALTH_TOKEN_URL);
        match scheme {
            AuthScheme::OAuth2(c) => {
                assert_eq!(c.response_format, TokenResponseFormat::Standard);
                assert_eq!(c.token_url, NOKIA_HEALTH_TOKEN_URL);
                assert_eq!(c.access_token_param, "access_token");
            }
            AuthScheme::OAuth1a(_) => panic!("expected OAuth 2.0"),
        }
    }

    #[test]
    fn test_oauth1a_sign_adds_signature() {
        let scheme = AuthScheme::OAuth1a(OAuth1aConfig {
            access_token_url: "https://example.com/oauth/access_token".to_string(),
        });
        let config =
            ServiceCredentialConfig::new("svc", "id", "secret", "rt", scheme.clone()).unwrap();
        let url = scheme
            .sign("https://example.com/measure?action=getmeas", &config, &token(), 99)
            .unwrap();
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert!(keys.contains(&"oauth_signature".to_string()));
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "oauth_token" && v == "tok en"));
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "oauth_timestamp" && v == "99"));
    }
}
