//! OAuth 1.0a HMAC-SHA1 request signing (signature carried in the query string)

use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use url::Url;

use super::error::AuthError;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 percent-encoding as required by OAuth 1.0a.
pub fn percent_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace('*', "%2A")
        .replace("%7E", "~")
}

/// Credentials used to sign one request.
pub struct OAuth1Signer<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    /// `oauth_token`, omitted when signing with consumer credentials only
    pub token: Option<&'a str>,
    pub token_secret: &'a str,
}

impl OAuth1Signer<'_> {
    /// The `oauth_*` protocol parameters for one request, unsigned.
    fn protocol_params(&self, timestamp: u64, nonce: &str) -> Vec<(String, String)> {
        let mut params = vec![
            ("oauth_consumer_key".to_string(), self.consumer_key.to_string()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
        ];
        if let Some(token) = self.token {
            params.push(("oauth_token".to_string(), token.to_string()));
        }
        params.push(("oauth_version".to_string(), "1.0".to_string()));
        params
    }

    /// Build the signature base string for `method` on `url` with the given
    /// protocol parameters.
    pub fn base_string(method: &str, url: &Url, oauth_params: &[(String, String)]) -> String {
        let base_url = match url.port() {
            Some(port) => format!(
                "{}://{}:{}{}",
                url.scheme(),
                url.host_str().unwrap_or_default(),
                port,
                url.path()
            ),
            None => format!(
                "{}://{}{}",
                url.scheme(),
                url.host_str().unwrap_or_default(),
                url.path()
            ),
        };

        let mut encoded: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (percent_encode(&k), percent_encode(&v)))
            .chain(
                oauth_params
                    .iter()
                    .map(|(k, v)| (percent_encode(k), percent_encode(v))),
            )
            .collect();
        encoded.sort();

        let normalized = encoded
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "{}&{}&{}",
            method.to_ascii_uppercase(),
            percent_encode(&base_url),
            percent_encode(&normalized)
        )
    }

    /// HMAC-SHA1 of `base_string`, base64-encoded.
    pub fn signature(&self, base_string: &str) -> Result<String, AuthError> {
        let key = format!(
            "{}&{}",
            percent_encode(self.consumer_secret),
            percent_encode(self.token_secret)
        );
        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        mac.update(base_string.as_bytes());
        Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Return `url` with the protocol parameters, any `extra` parameters and
    /// `oauth_signature` appended to its query string.
    pub fn sign_url(
        &self,
        method: &str,
        url: &str,
        extra: &[(&str, &str)],
        timestamp: u64,
        nonce: &str,
    ) -> Result<Url, AuthError> {
        let mut url = Url::parse(url)?;
        let mut params = self.protocol_params(timestamp, nonce);
        params.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let base = Self::base_string(method, &url, &params);
        let signature = self.signature(&base)?;

        {
            let mut query = url.query_pairs_mut();
            for (k, v) in &params {
                query.append_pair(k, v);
            }
            query.append_pair("oauth_signature", &signature);
        }
        Ok(url)
    }
}

/// Fresh nonce for one signed request.
pub fn nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
