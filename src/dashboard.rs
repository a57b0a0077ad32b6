//! Wires configuration, credentials and feeds together and drives the CLI
//! commands.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use tokio::task::JoinHandle;

use crate::api::{self, AuthenticatedClient};
use crate::auth::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, ServiceCredentialConfig,
    TokenManager,
};
use crate::config::Config;
use crate::feeds::Feeds;
use crate::models::{AirQuality, BodyMeasure, CommuteSummary, Location, TrafficTrend, Weather};
use crate::updater::Updater;

/// Feed selectable with `fetch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FeedKind {
    Body,
    Air,
    Weather,
    Commute,
    News,
    Location,
}

/// Long-lived services shared by every feed.
pub struct Dashboard {
    config: Config,
    tokens: Arc<TokenManager>,
    feeds: Feeds,
}

impl Dashboard {
    /// With `ephemeral`, tokens live only in memory and nothing is written.
    pub fn new(config: Config, ephemeral: bool) -> Result<Self> {
        let http = api::build_http(&config.http)?;

        let store: Arc<dyn CredentialStore> = if ephemeral {
            tracing::info!("Using in-memory credential store");
            Arc::new(MemoryCredentialStore::new())
        } else {
            let store = match &config.credentials_path {
                Some(path) => FileCredentialStore::new(path),
                None => FileCredentialStore::open_default()
                    .context("Could not determine credential store location")?,
            };
            tracing::debug!("Credential store: {}", store.path().display());
            Arc::new(store)
        };

        let tokens = Arc::new(TokenManager::new(store, http.clone()));
        let client = Arc::new(AuthenticatedClient::new(http.clone(), tokens.clone()));
        let feeds = Feeds::from_config(&config, http, client)?;

        Ok(Self {
            config,
            tokens,
            feeds,
        })
    }

    pub fn load(config_path: Option<&Path>, ephemeral: bool) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        Self::new(config, ephemeral)
    }

    fn service(&self, service_id: Option<&str>) -> Result<ServiceCredentialConfig> {
        let services = self.config.oauth_services()?;
        let found = match service_id {
            Some(id) => services.into_iter().find(|s| s.service_id == id),
            None => services.into_iter().next(),
        };
        match (found, service_id) {
            (Some(service), _) => Ok(service),
            (None, Some(id)) => bail!("No configured service with id {}", id),
            (None, None) => bail!("No OAuth service configured"),
        }
    }

    /// Run every configured feed until Ctrl-C, printing each update.
    pub async fn run(&self) -> Result<()> {
        let running = self.start_feeds()?;
        tracing::info!("Feeds started, press Ctrl-C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
        tracing::info!("Stopping feeds...");
        stop_feeds(running).await;
        Ok(())
    }

    /// Start one updater per configured feed.
    fn start_feeds(&self) -> Result<Vec<RunningFeed>> {
        if self.feeds.is_empty() {
            bail!(
                "No feeds configured; add a [withings], [nokia_health], [withings_oauth1], \
                 [air_now], [weather], [commute] or [news] section to the config"
            );
        }
        let intervals = &self.config.intervals;
        let mut running = Vec::new();

        if let Some(feed) = &self.feeds.body {
            let feed = feed.clone();
            let fetch = move || {
                let feed = feed.clone();
                async move { feed.fetch().await }
            };
            running.push(start_feed("body", intervals.body(), fetch, |m: &Vec<BodyMeasure>| {
                print_measures(m)
            })?);
        }
        if let Some(feed) = &self.feeds.air {
            let feed = feed.clone();
            let fetch = move || {
                let feed = feed.clone();
                async move { feed.fetch().await }
            };
            running.push(start_feed("air", intervals.air(), fetch, print_air_quality)?);
        }
        if let Some(feed) = &self.feeds.weather {
            let feed = feed.clone();
            let fetch = move || {
                let feed = feed.clone();
                async move { feed.fetch().await }
            };
            running.push(start_feed("weather", intervals.weather(), fetch, print_weather)?);
        }
        if let Some(feed) = &self.feeds.commute {
            let feed = feed.clone();
            let fetch = move || {
                let feed = feed.clone();
                async move { feed.fetch().await }
            };
            running.push(start_feed("commute", intervals.commute(), fetch, print_commute)?);
        }
        if let Some(feed) = &self.feeds.news {
            let feed = feed.clone();
            let fetch = move || {
                let feed = feed.clone();
                async move { feed.fetch().await }
            };
            running.push(start_feed("news", intervals.news(), fetch, |h: &Vec<String>| {
                print_headlines(h)
            })?);
        }
        Ok(running)
    }

    /// Print the persisted token state of every configured service.
    pub fn status(&self) -> Result<()> {
        let services = self.config.oauth_services()?;
        if services.is_empty() {
            println!("No OAuth services configured.");
            return Ok(());
        }

        let now = self.tokens.clock().now();
        for service in services {
            println!();
            println!("Service:      {}", service.service_id);
            match self.tokens.stored_token(&service.service_id) {
                Some(token) => {
                    let expiry = match token.expires_at() {
                        Some(at) => format_unix(at),
                        None => "(none declared)".to_string(),
                    };
                    println!("Issued:       {}", format_unix(token.issued_at));
                    println!("Expires:      {}", expiry);
                    println!(
                        "State:        {}",
                        if token.should_refresh(now) {
                            "refresh due"
                        } else {
                            "valid"
                        }
                    );
                }
                None => println!("State:        no saved token, initial refresh token will be used"),
            }
        }
        Ok(())
    }

    /// Force a token refresh for one service.
    pub async fn refresh(&self, service_id: Option<&str>) -> Result<()> {
        let service = self.service(service_id)?;
        let token = match self.tokens.stored_token(&service.service_id) {
            Some(current) => self.tokens.force_refresh(&service, &current).await,
            None => self.tokens.get_valid_token(&service).await,
        }
        .with_context(|| format!("Failed to refresh token for {}", service.service_id))?;

        println!("Refreshed token for {}", service.service_id);
        if let Some(at) = token.expires_at() {
            println!("Expires:      {}", format_unix(at));
        }
        Ok(())
    }

    /// Fetch one feed once and print the result.
    pub async fn fetch(&self, kind: FeedKind) -> Result<()> {
        match kind {
            FeedKind::Body => {
                let feed = self
                    .feeds
                    .body
                    .as_ref()
                    .context("Body feed needs a [withings], [nokia_health] or [withings_oauth1] config section")?;
                print_measures(&feed.fetch().await?);
            }
            FeedKind::Air => {
                let feed = self
                    .feeds
                    .air
                    .as_ref()
                    .context("Air feed needs an [air_now] config section")?;
                print_air_quality(&feed.fetch().await?);
            }
            FeedKind::Weather => {
                let feed = self
                    .feeds
                    .weather
                    .as_ref()
                    .context("Weather feed needs a [weather] config section")?;
                print_weather(&feed.fetch().await?);
            }
            FeedKind::Commute => {
                let feed = self
                    .feeds
                    .commute
                    .as_ref()
                    .context("Commute feed needs a [commute] config section")?;
                print_commute(&feed.fetch().await?);
            }
            FeedKind::News => {
                let feed = self
                    .feeds
                    .news
                    .as_ref()
                    .context("News feed needs a [news] config section")?;
                print_headlines(&feed.fetch().await?);
            }
            FeedKind::Location => {
                let location = self
                    .feeds
                    .geo
                    .location()
                    .await
                    .context("Geolocation lookup failed")?;
                print_location(&location);
            }
        }
        Ok(())
    }
}

/// A started updater and the task printing its results
struct RunningFeed {
    stop: Box<dyn FnOnce() + Send>,
    listener: JoinHandle<()>,
}

fn start_feed<T, F, Fut, P>(
    name: &str,
    interval: Duration,
    fetch: F,
    print: P,
) -> Result<RunningFeed>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    P: Fn(&T) + Send + 'static,
{
    let (mut updater, rx) = Updater::new(name, interval, fetch)?;
    updater.start();
    tracing::info!(
        "{}: updating every {}s",
        updater.name(),
        updater.interval().as_secs()
    );

    let listener = rx.spawn_listener(move |update| match &update.data {
        Some(data) => print(data),
        None => println!("[{} #{}] no data", update.source, update.seq),
    });
    Ok(RunningFeed {
        stop: Box::new(move || updater.stop()),
        listener,
    })
}

/// Stop every updater and wait until results of in-flight fetches are printed.
async fn stop_feeds(running: Vec<RunningFeed>) {
    let mut listeners = Vec::with_capacity(running.len());
    for feed in running {
        (feed.stop)();
        listeners.push(feed.listener);
    }
    for listener in listeners {
        if let Err(e) = listener.await {
            tracing::error!("Feed listener failed: {}", e);
        }
    }
}

fn format_unix(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn print_measures(measures: &[BodyMeasure]) {
    match measures.last() {
        Some(latest) => println!(
            "Weight: {:.1} kg ({}), {} measures",
            latest.weight_kg,
            format_unix(u64::try_from(latest.timestamp).unwrap_or_default()),
            measures.len()
        ),
        None => println!("Weight: no measures"),
    }
}

fn print_air_quality(air: &AirQuality) {
    println!(
        "Air quality: {} (AQI {}, category {})",
        air.category, air.aqi, air.category_number
    );
}

fn print_weather(weather: &Weather) {
    println!(
        "Weather: {:.0}°, {:.0}% precipitation{}",
        weather.current_temperature,
        weather.current_precip_probability * 100.0,
        weather
            .current_icon
            .as_deref()
            .map(|icon| format!(" ({})", icon))
            .unwrap_or_default()
    );
    if let Some(summary) = &weather.day_summary {
        match weather.day_precip_probability {
            Some(p) => println!("Today:   {} {:.0}% precipitation", summary, p * 100.0),
            None => println!("Today:   {}", summary),
        }
    }
}

fn print_commute(commute: &CommuteSummary) {
    let trend = match commute.trend {
        TrafficTrend::Up => " (getting worse)",
        TrafficTrend::Down => " (getting better)",
        TrafficTrend::Flat => "",
    };
    println!("Commute: {}, {}{}", commute.text, commute.travel_mode, trend);
}

fn print_headlines(headlines: &[String]) {
    if headlines.is_empty() {
        println!("News: no headlines");
    }
    for headline in headlines {
        println!("News: {}", headline);
    }
}

fn print_location(location: &Location) {
    println!("Location: {:.4}, {:.4}", location.latitude, location.longitude);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dashboard(toml: &str, dir: &tempfile::TempDir) -> Dashboard {
        let mut config = Config::parse(toml).unwrap();
        config.credentials_path = Some(dir.path().join("credentials.toml"));
        Dashboard::new(config, false).unwrap()
    }

    #[test]
    fn test_feeds_follow_config_sections() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dashboard("", &dir);
        assert!(empty.feeds.is_empty());

        let full = dashboard(
            r#"
            [withings]
            client_id = "cid"
            client_secret = "secret"
            refresh_token = "rt"

            [air_now]
            api_key = "key"

            [weather]
            api_key = "key"

            [commute]
            api_key = "key"
            origin = "here"
            destination = "there"

            [news]
            "#,
            &dir,
        );
        assert!(full.feeds.body.is_some());
        assert!(full.feeds.air.is_some());
        assert!(full.feeds.weather.is_some());
        assert!(full.feeds.commute.is_some());
        assert!(full.feeds.news.is_some());
        assert_eq!(full.service(None).unwrap().service_id, "withings_api");
        assert!(full.service(Some("other")).is_err());
    }

    #[test]
    fn test_ephemeral_store_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::parse("").unwrap();
        config.credentials_path = Some(dir.path().join("credentials.toml"));
        let dashboard = Dashboard::new(config, true).unwrap();
        assert!(dashboard.tokens.stored_token("withings_api").is_none());
        assert!(dashboard.status().is_ok());
        assert!(!dir.path().join("credentials.toml").exists());
    }

    #[tokio::test]
    async fn test_run_without_feeds_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(dashboard("", &dir).run().await.is_err());
    }

    #[tokio::test]
    async fn test_started_feeds_fetch_and_stop_after_in_flight_fetch() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recent.rss"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<rss><channel><item><title>Hi</title></item></channel></rss>")
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dashboard = dashboard(
            &format!("[news]\nurl = \"{}/recent.rss\"\n", server.uri()),
            &dir,
        );
        let running = dashboard.start_feeds().unwrap();
        assert_eq!(running.len(), 1);

        // Stop only once the first fetch is under way
        while server.received_requests().await.unwrap_or_default().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::timeout(Duration::from_secs(5), stop_feeds(running))
            .await
            .unwrap();
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[test]
    fn test_only_one_body_service() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::parse(
            r#"
            [withings]
            client_id = "a"
            client_secret = "b"
            refresh_token = "c"

            [nokia_health]
            client_id = "a"
            client_secret = "b"
            refresh_token = "c"
            "#,
        )
        .unwrap();
        config.credentials_path = Some(dir.path().join("credentials.toml"));
        assert!(Dashboard::new(config, false).is_err());
    }

    #[test]
    fn test_format_unix_falls_back_to_number() {
        assert_eq!(format_unix(u64::MAX), u64::MAX.to_string());
    }
}
