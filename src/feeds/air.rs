//! Air quality forecast from AirNow

use std::sync::Arc;

use anyhow::{Context, Result};
use url::Url;

use super::GeoLocation;
use crate::api::HttpTransport;
use crate::models::{AirNowForecast, AirQuality};

pub struct AirFeed {
    transport: HttpTransport,
    geo: Arc<GeoLocation>,
    base_url: String,
    api_key: String,
}

impl AirFeed {
    pub fn new(
        transport: HttpTransport,
        geo: Arc<GeoLocation>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            geo,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Today's forecast for the current location.
    pub async fn fetch(&self) -> Result<AirQuality> {
        let location = self
            .geo
            .location()
            .await
            .context("Location unknown, cannot look up air quality")?;
        tracing::debug!("Using location for air quality: {:?}", location);

        let mut url = Url::parse(&format!(
            "{}/aq/forecast/latLong/",
            self.base_url.trim_end_matches('/')
        ))
        .context("Invalid AirNow base URL")?;
        url.query_pairs_mut()
            .append_pair("format", "application/json")
            .append_pair("latitude", &format!("{:.6}", location.latitude))
            .append_pair("longitude", &format!("{:.6}", location.longitude))
            .append_pair("API_KEY", &self.api_key);

        let forecasts: Vec<AirNowForecast> = self
            .transport
            .get_json(url.as_str())
            .await
            .context("No air quality response")?;
        first_forecast(forecasts)
    }
}

fn first_forecast(forecasts: Vec<AirNowForecast>) -> Result<AirQuality> {
    forecasts
        .into_iter()
        .next()
        .map(AirQuality::from)
        .context("Empty air quality forecast")
}
