//! Refresh grants: exchange a refresh credential for a new access token

use oauth2::{
    basic::BasicClient, AuthType, AuthUrl, ClientId, ClientSecret, RefreshToken,
    RequestTokenError, TokenResponse, TokenUrl,
};
use serde::Deserialize;

use super::signature::{self, OAuth1Signer};
use super::{
    AccessToken, AuthError, AuthScheme, OAuth1aConfig, OAuth2Config, ServiceCredentialConfig,
    TokenResponseFormat,
};

/// What a token endpoint handed back. Missing fields keep their previous
/// values in the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_secret: Option<String>,
    pub expires_in: Option<u64>,
}

/// Run the refresh grant of `config.scheme` with `refresh_token`.
///
/// `current` is the token being replaced, if there is one; OAuth 1.0a signs
/// the renewal with it.
pub async fn refresh_grant(
    http: &reqwest::Client,
    config: &ServiceCredentialConfig,
    refresh_token: &str,
    current: Option<&AccessToken>,
    now: u64,
) -> Result<TokenGrant, AuthError> {
    tracing::debug!("Refreshing access token for {}", config.service_id);
    match &config.scheme {
        AuthScheme::OAuth2(oauth2) => match oauth2.response_format {
            TokenResponseFormat::Standard => refresh_standard(config, oauth2, refresh_token).await,
            TokenResponseFormat::Enveloped => {
                refresh_enveloped(http, config, oauth2, refresh_token).await
            }
        },
        AuthScheme::OAuth1a(oauth1) => {
            refresh_oauth1a(http, config, oauth1, refresh_token, current, now).await
        }
    }
}

/// Build the OAuth2 client for a service (client credentials in the body).
fn build_client(
    config: &ServiceCredentialConfig,
    oauth2: &OAuth2Config,
) -> Result<BasicClient, AuthError> {
    let auth_url = AuthUrl::new(oauth2.authorize_url.clone())
        .map_err(|e| AuthError::Endpoint(e.to_string()))?;
    let token_url =
        TokenUrl::new(oauth2.token_url.clone()).map_err(|e| AuthError::Endpoint(e.to_string()))?;

    Ok(BasicClient::new(
        ClientId::new(config.client_id.clone()),
        Some(ClientSecret::new(config.client_secret.clone())),
        auth_url,
        Some(token_url),
    )
    .set_auth_type(AuthType::RequestBody))
}

/// RFC 6749 refresh grant.
async fn refresh_standard(
    config: &ServiceCredentialConfig,
    oauth2: &OAuth2Config,
    refresh_token: &str,
) -> Result<TokenGrant, AuthError> {
    let client = build_client(config, oauth2)?;

    let token_response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .request_async(oauth2::reqwest::async_http_client)
        .await
        .map_err(|e| match e {
            RequestTokenError::ServerResponse(resp) => AuthError::Rejected(resp.to_string()),
            RequestTokenError::Request(e) => AuthError::Transport(e.to_string()),
            RequestTokenError::Parse(e, _) => AuthError::Malformed(e.to_string()),
            RequestTokenError::Other(msg) => AuthError::Malformed(msg),
        })?;

    Ok(TokenGrant {
        access_token: token_response.access_token().secret().to_string(),
        refresh_token: token_response
            .refresh_token()
            .map(|rt| rt.secret().to_string()),
        token_secret: None,
        expires_in: token_response.expires_in().map(|d| d.as_secs()),
    })
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: i64,
    body: Option<EnvelopedToken>,
}

#[derive(Debug, Deserialize)]
struct EnvelopedToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// Refresh grant against an endpoint that wraps the token in a status envelope.
async fn refresh_enveloped(
    http: &reqwest::Client,
    config: &ServiceCredentialConfig,
    oauth2: &OAuth2Config,
    refresh_token: &str,
) -> Result<TokenGrant, AuthError> {
    let resp = http
        .post(&oauth2.token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(AuthError::Rejected(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body
        )));
    }

    let envelope: Envelope =
        serde_json::from_str(&body).map_err(|e| AuthError::Malformed(e.to_string()))?;
    if envelope.status != 0 {
        return Err(AuthError::Rejected(format!(
            "status {} in token response",
            envelope.status
        )));
    }
    let token = envelope
        .body
        .ok_or_else(|| AuthError::Malformed("token response missing 'body'".to_string()))?;

    Ok(TokenGrant {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        token_secret: None,
        expires_in: token.expires_in,
    })
}

/// OAuth 1.0a renewal: a signed request carrying the session handle.
async fn refresh_oauth1a(
    http: &reqwest::Client,
    config: &ServiceCredentialConfig,
    oauth1: &OAuth1aConfig,
    refresh_token: &str,
    current: Option<&AccessToken>,
    now: u64,
) -> Result<TokenGrant, AuthError> {
    let signer = OAuth1Signer {
        consumer_key: &config.client_id,
        consumer_secret: &config.client_secret,
        token: current.map(|t| t.value.as_str()),
        token_secret: current.map(|t| t.secret.as_str()).unwrap_or_default(),
    };
    let url = signer.sign_url(
        "GET",
        &oauth1.access_token_url,
        &[("oauth_session_handle", refresh_token)],
        now,
        &signature::nonce(),
    )?;

    let resp = http.get(url).send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(AuthError::Rejected(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body
        )));
    }

    let mut grant = TokenGrant {
        access_token: String::new(),
        refresh_token: None,
        token_secret: None,
        expires_in: None,
    };
    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        match key.as_ref() {
            "oauth_token" => grant.access_token = value.into_owned(),
            "oauth_token_secret" => grant.token_secret = Some(value.into_owned()),
            "oauth_session_handle" => grant.refresh_token = Some(value.into_owned()),
            "oauth_expires_in" => {
                grant.expires_in = Some(value.parse().map_err(|_| {
                    AuthError::Malformed(format!("bad oauth_expires_in: {}", value))
                })?)
            }
            _ => {}
        }
    }

    if grant.access_token.is_empty() || grant.token_secret.is_none() {
        return Err(AuthError::Malformed(
            "response missing oauth_token or oauth_token_secret".to_string(),
        ));
    }
    Ok(grant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::OAuth1aConfig;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oauth2_config(server: &MockServer, format: TokenResponseFormat) -> ServiceCredentialConfig {
        ServiceCredentialConfig::new(
            "svc",
            "client",
            "secret",
            "initial-rt",
            AuthScheme::OAuth2(OAuth2Config {
                authorize_url: format!("{}/authorize", server.uri()),
                token_url: format!("{}/token", server.uri()),
                response_format: format,
                access_token_param: "access_token".to_string(),
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_standard_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-rt"))
            .and(body_string_contains("client_id=client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-at",
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "new-rt"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = oauth2_config(&server, TokenResponseFormat::Standard);
        let grant = refresh_grant(&reqwest::Client::new(), &config, "old-rt", None, 0)
            .await
            .unwrap();

        assert_eq!(
            grant,
            TokenGrant {
                access_token: "new-at".to_string(),
                refresh_token: Some("new-rt".to_string()),
                token_secret: None,
                expires_in: Some(3600),
            }
        );
    }

    #[tokio::test]
    async fn test_standard_refresh_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
            )
            .mount(&server)
            .await;

        let config = oauth2_config(&server, TokenResponseFormat::Standard);
        let err = refresh_grant(&reqwest::Client::new(), &config, "old-rt", None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_enveloped_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_secret=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 0,
                "body": {
                    "userid": "363",
                    "access_token": "w-at",
                    "refresh_token": "w-rt",
                    "expires_in": 10800,
                    "scope": "user.metrics",
                    "token_type": "Bearer"
                }
            })))
            .mount(&server)
            .await;

        let config = oauth2_config(&server, TokenResponseFormat::Enveloped);
        let grant = refresh_grant(&reqwest::Client::new(), &config, "rt", None, 0)
            .await
            .unwrap();
        assert_eq!(grant.access_token, "w-at");
        assert_eq!(grant.refresh_token.as_deref(), Some("w-rt"));
        assert_eq!(grant.expires_in, Some(10800));
    }

    #[tokio::test]
    async fn test_enveloped_nonzero_status_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": 503, "error": "Invalid Params" })),
            )
            .mount(&server)
            .await;

        let config = oauth2_config(&server, TokenResponseFormat::Enveloped);
        let err = refresh_grant(&reqwest::Client::new(), &config, "rt", None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_enveloped_garbage_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let config = oauth2_config(&server, TokenResponseFormat::Enveloped);
        let err = refresh_grant(&reqwest::Client::new(), &config, "rt", None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_oauth1a_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/access_token"))
            .and(query_param("oauth_session_handle", "handle-1"))
            .and(query_param("oauth_token", "old-token"))
            .and(query_param("oauth_consumer_key", "client"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "oauth_token=new-token&oauth_token_secret=new-secret\
                 &oauth_session_handle=handle-2&oauth_expires_in=3600",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let config = ServiceCredentialConfig::new(
            "svc1",
            "client",
            "secret",
            "handle-0",
            AuthScheme::OAuth1a(OAuth1aConfig {
                access_token_url: format!("{}/oauth/access_token", server.uri()),
            }),
        )
        .unwrap();
        let current = AccessToken {
            value: "old-token".to_string(),
            refresh_token: "handle-1".to_string(),
            secret: "old-secret".to_string(),
            expires_in: 0,
            issued_at: 0,
        };

        let grant = refresh_grant(
            &reqwest::Client::new(),
            &config,
            "handle-1",
            Some(&current),
            1_700_000_000,
        )
        .await
        .unwrap();
        assert_eq!(grant.access_token, "new-token");
        assert_eq!(grant.token_secret.as_deref(), Some("new-secret"));
        assert_eq!(grant.refresh_token.as_deref(), Some("handle-2"));
        assert_eq!(grant.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn test_oauth1a_missing_secret_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("oauth_token=t"))
            .mount(&server)
            .await;

        let config = ServiceCredentialConfig::new(
            "svc1",
            "client",
            "secret",
            "handle-0",
            AuthScheme::OAuth1a(OAuth1aConfig {
                access_token_url: format!("{}/oauth/access_token", server.uri()),
            }),
        )
        .unwrap();

        let err = refresh_grant(&reqwest::Client::new(), &config, "handle-0", None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)), "got {:?}", err);
    }
}
