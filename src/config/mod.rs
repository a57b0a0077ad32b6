//! Configuration: API credentials, endpoints, intervals and HTTP timeouts

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{
    AuthScheme, OAuth1aConfig, ServiceCredentialConfig, NOKIA_HEALTH_AUTHORIZE_URL,
    NOKIA_HEALTH_TOKEN_URL, WITHINGS_AUTHORIZE_URL, WITHINGS_TOKEN_URL,
};
use crate::models::TravelMode;

const WITHINGS_API_BASE: &str = "https://wbsapi.withings.net";
const WITHINGS_OAUTH1_ACCESS_TOKEN_URL: &str = "https://oauth.withings.com/account/access_token";
const WITHINGS_INVALID_TOKEN: &str =
    r#"{"status":401,"body":{},"error":"XRequestID: Not provided invalid_token: The access token provided is invalid"}"#;
const NOKIA_HEALTH_API_BASE: &str = "https://api.health.nokia.com";
const AIR_NOW_BASE_URL: &str = "https://www.airnowapi.org";
const DARK_SKY_BASE_URL: &str = "https://api.darksky.net";
const DIRECTIONS_BASE_URL: &str = "https://maps.googleapis.com";
const NYT_RSS_URL: &str = "https://content.api.nytimes.com/svc/news/v3/all/recent.rss";
const GEO_IP_URL: &str = "http://ip-api.com/json";

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client timeouts
    #[serde(default)]
    pub http: HttpConfig,
    /// Refresh periods per feed
    #[serde(default)]
    pub intervals: IntervalConfig,
    /// Withings body measurements (OAuth 2.0, enveloped token responses)
    pub withings: Option<HealthApiConfig>,
    /// Nokia Health body measurements (OAuth 2.0, standard token responses)
    pub nokia_health: Option<HealthApiConfig>,
    /// Withings body measurements through the legacy OAuth 1.0a API
    pub withings_oauth1: Option<HealthApiConfig>,
    /// AirNow air quality forecast
    pub air_now: Option<AirNowConfig>,
    /// Dark Sky weather forecast
    pub weather: Option<WeatherConfig>,
    /// Google Maps directions between two addresses
    pub commute: Option<CommuteConfig>,
    /// RSS headlines
    pub news: Option<NewsConfig>,
    /// IP geolocation endpoint override
    pub geo_ip_url: Option<String>,
    /// Token store location; defaults to the platform data directory
    pub credentials_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub body_minutes: u64,
    pub air_minutes: u64,
    pub weather_minutes: u64,
    pub commute_minutes: u64,
    pub news_minutes: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            body_minutes: 5,
            air_minutes: 15,
            weather_minutes: 5,
            commute_minutes: 1,
            news_minutes: 15,
        }
    }
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

impl IntervalConfig {
    pub fn body(&self) -> Duration {
        minutes(self.body_minutes)
    }

    pub fn air(&self) -> Duration {
        minutes(self.air_minutes)
    }

    pub fn weather(&self) -> Duration {
        minutes(self.weather_minutes)
    }

    pub fn commute(&self) -> Duration {
        minutes(self.commute_minutes)
    }

    pub fn news(&self) -> Duration {
        minutes(self.news_minutes)
    }
}

/// Health API vendors that serve body measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVendor {
    Withings,
    NokiaHealth,
    WithingsOAuth1,
}

impl HealthVendor {
    fn section(self) -> &'static str {
        match self {
            HealthVendor::Withings => "withings",
            HealthVendor::NokiaHealth => "nokia_health",
            HealthVendor::WithingsOAuth1 => "withings_oauth1",
        }
    }

    fn default_service_id(self) -> &'static str {
        match self {
            HealthVendor::Withings => "withings_api",
            HealthVendor::NokiaHealth => "nokia_health_api",
            HealthVendor::WithingsOAuth1 => "withings_oauth1_api",
        }
    }

    fn default_api_base(self) -> &'static str {
        match self {
            HealthVendor::Withings | HealthVendor::WithingsOAuth1 => WITHINGS_API_BASE,
            HealthVendor::NokiaHealth => NOKIA_HEALTH_API_BASE,
        }
    }
}

/// Credentials and endpoint overrides of one health API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthApiConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Refresh token (OAuth 2.0) or session handle (OAuth 1.0a) obtained once
    /// out of band; used until a token is stored
    pub refresh_token: String,
    /// Storage scope for persisted tokens
    pub service_id: Option<String>,
    pub api_base: Option<String>,
    /// OAuth 2.0 only
    pub authorize_url: Option<String>,
    /// Token endpoint (OAuth 2.0) or access token URL (OAuth 1.0a)
    pub token_url: Option<String>,
}

impl HealthApiConfig {
    pub fn api_base(&self, vendor: HealthVendor) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or_else(|| vendor.default_api_base())
    }

    /// Credential config consumed by the token manager.
    pub fn credentials(&self, vendor: HealthVendor) -> Result<ServiceCredentialConfig> {
        let authorize = self.authorize_url.as_deref();
        let token = self.token_url.as_deref();
        let scheme = match vendor {
            HealthVendor::Withings => AuthScheme::withings_at(
                authorize.unwrap_or(WITHINGS_AUTHORIZE_URL),
                token.unwrap_or(WITHINGS_TOKEN_URL),
            ),
            HealthVendor::NokiaHealth => AuthScheme::nokia_health_at(
                authorize.unwrap_or(NOKIA_HEALTH_AUTHORIZE_URL),
                token.unwrap_or(NOKIA_HEALTH_TOKEN_URL),
            ),
            HealthVendor::WithingsOAuth1 => AuthScheme::OAuth1a(OAuth1aConfig {
                access_token_url: token
                    .unwrap_or(WITHINGS_OAUTH1_ACCESS_TOKEN_URL)
                    .to_string(),
            }),
        };

        let config = ServiceCredentialConfig::new(
            self.service_id
                .as_deref()
                .unwrap_or_else(|| vendor.default_service_id()),
            &self.client_id,
            &self.client_secret,
            &self.refresh_token,
            scheme,
        )
        .with_context(|| format!("Invalid [{}] section", vendor.section()))?;

        Ok(match vendor {
            HealthVendor::Withings => config.with_invalid_token_response(WITHINGS_INVALID_TOKEN),
            _ => config,
        })
    }
}

/// Body measurement service selected by the configuration
pub struct BodySource<'a> {
    pub vendor: HealthVendor,
    pub api: &'a HealthApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirNowConfig {
    pub api_key: String,
    #[serde(default = "default_air_now_base_url")]
    pub base_url: String,
}

fn default_air_now_base_url() -> String {
    AIR_NOW_BASE_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    pub api_key: String,
    #[serde(default = "default_dark_sky_base_url")]
    pub base_url: String,
}

fn default_dark_sky_base_url() -> String {
    DARK_SKY_BASE_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommuteConfig {
    pub api_key: String,
    /// Home address
    pub origin: String,
    /// Work address
    pub destination: String,
    #[serde(default)]
    pub travel_mode: TravelMode,
    #[serde(default = "default_directions_base_url")]
    pub base_url: String,
}

fn default_directions_base_url() -> String {
    DIRECTIONS_BASE_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    #[serde(default = "default_news_url")]
    pub url: String,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            url: default_news_url(),
        }
    }
}

fn default_news_url() -> String {
    NYT_RSS_URL.to_string()
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("net", "mirror-feeds", "mirror-feeds")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`; a missing file is an empty config
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn geo_ip_url(&self) -> &str {
        self.geo_ip_url.as_deref().unwrap_or(GEO_IP_URL)
    }

    fn health_apis(&self) -> impl Iterator<Item = (HealthVendor, &HealthApiConfig)> {
        [
            (HealthVendor::Withings, self.withings.as_ref()),
            (HealthVendor::NokiaHealth, self.nokia_health.as_ref()),
            (HealthVendor::WithingsOAuth1, self.withings_oauth1.as_ref()),
        ]
        .into_iter()
        .filter_map(|(vendor, api)| api.map(|api| (vendor, api)))
    }

    /// The one configured body measurement service, if any
    pub fn body_source(&self) -> Result<Option<BodySource<'_>>> {
        let mut apis = self.health_apis();
        let first = apis.next();
        if let Some((other, _)) = apis.next() {
            bail!(
                "Only one body measurement service may be configured, found [{}] as well",
                other.section()
            );
        }
        Ok(first.map(|(vendor, api)| BodySource { vendor, api }))
    }

    /// Credential configs of every configured OAuth service
    pub fn oauth_services(&self) -> Result<Vec<ServiceCredentialConfig>> {
        self.health_apis()
            .map(|(vendor, api)| api.credentials(vendor))
            .collect()
    }
}
