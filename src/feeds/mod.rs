//! Data feeds shown on the mirror

pub mod air;
pub mod body;
pub mod commute;
pub mod geo;
pub mod news;
pub mod weather;

use std::sync::Arc;

use anyhow::Result;

use crate::api::{AuthenticatedClient, HttpTransport};
use crate::config::Config;

pub use air::AirFeed;
pub use body::BodyFeed;
pub use commute::CommuteFeed;
pub use geo::GeoLocation;
pub use news::NewsFeed;
pub use weather::WeatherFeed;

/// Every feed enabled by the configuration.
pub struct Feeds {
    pub body: Option<Arc<BodyFeed>>,
    pub air: Option<Arc<AirFeed>>,
    pub weather: Option<Arc<WeatherFeed>>,
    pub commute: Option<Arc<CommuteFeed>>,
    pub news: Option<Arc<NewsFeed>>,
    pub geo: Arc<GeoLocation>,
}

impl Feeds {
    pub fn from_config(
        config: &Config,
        http: reqwest::Client,
        client: Arc<AuthenticatedClient>,
    ) -> Result<Self> {
        let transport = HttpTransport::new(http);
        let geo = Arc::new(GeoLocation::new(transport.clone(), config.geo_ip_url()));

        let body = match config.body_source()? {
            Some(source) => Some(Arc::new(BodyFeed::new(
                client,
                source.api.credentials(source.vendor)?,
                source.api.api_base(source.vendor),
            ))),
            None => None,
        };
        let air = config.air_now.as_ref().map(|air_now| {
            Arc::new(AirFeed::new(
                transport.clone(),
                geo.clone(),
                air_now.base_url.clone(),
                air_now.api_key.clone(),
            ))
        });
        let weather = config.weather.as_ref().map(|weather| {
            Arc::new(WeatherFeed::new(
                transport.clone(),
                geo.clone(),
                weather.base_url.clone(),
                weather.api_key.clone(),
            ))
        });
        let commute = config
            .commute
            .as_ref()
            .map(|commute| Arc::new(CommuteFeed::new(transport.clone(), commute.clone())));
        let news = config
            .news
            .as_ref()
            .map(|news| Arc::new(NewsFeed::new(transport, news.url.clone())));

        Ok(Self {
            body,
            air,
            weather,
            commute,
            news,
            geo,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_none()
            && self.air.is_none()
            && self.weather.is_none()
            && self.commute.is_none()
            && self.news.is_none()
    }
}
