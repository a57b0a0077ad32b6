//! Weather forecast from Dark Sky

use std::sync::Arc;

use anyhow::{Context, Result};

use super::GeoLocation;
use crate::api::HttpTransport;
use crate::models::{DarkSkyForecast, Weather};

pub struct WeatherFeed {
    transport: HttpTransport,
    geo: Arc<GeoLocation>,
    base_url: String,
    api_key: String,
}

impl WeatherFeed {
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

    /// Current conditions and today's outlook for the current location.
    pub async fn fetch(&self) -> Result<Weather> {
        let location = self
            .geo
            .location()
            .await
            .context("Location unknown, cannot look up the weather")?;

        let url = format!(
            "{}/forecast/{}/{:.6},{:.6}",
            self.base_url.trim_end_matches('/'),
            self.api_key,
            location.latitude,
            location.longitude
        );
        let forecast: DarkSkyForecast = self
            .transport
            .get_json(&url)
            .await
            .context("No weather response")?;
        Ok(Weather::from(forecast))
    }
}
