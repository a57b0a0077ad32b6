//! Weather models

use serde::{Deserialize, Serialize};

/// Current conditions and the outlook for the rest of the day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub current_temperature: f64,
    /// 0.0 through 1.0
    pub current_precip_probability: f64,
    /// Icon name, e.g. "clear-day" or "rain"
    pub current_icon: Option<String>,
    pub day_summary: Option<String>,
    pub day_icon: Option<String>,
    /// Mean over the hourly forecast; `None` without hourly data
    pub day_precip_probability: Option<f64>,
}

/// Dark Sky forecast response
#[derive(Debug, Clone, Deserialize)]
pub struct DarkSkyForecast {
    pub currently: DarkSkyDataPoint,
    pub hourly: Option<DarkSkyDataBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DarkSkyDataPoint {
    pub temperature: f64,
    #[serde(default)]
    pub precip_probability: f64,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DarkSkyDataBlock {
    pub summary: Option<String>,
    pub icon: Option<String>,
    #[serde(default)]
    pub data: Vec<DarkSkyHour>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DarkSkyHour {
    #[serde(default)]
    pub precip_probability: f64,
}

impl From<DarkSkyForecast> for Weather {
    fn from(forecast: DarkSkyForecast) -> Self {
        let hourly = forecast.hourly;
        let day_precip_probability = hourly.as_ref().and_then(|block| {
            if block.data.is_empty() {
                return None;
            }
            let total: f64 = block.data.iter().map(|h| h.precip_probability).sum();
            Some(total / block.data.len() as f64)
        });
        let (day_summary, day_icon) = match hourly {
            Some(block) => (block.summary, block.icon),
            None => (None, None),
        };

        Self {
            current_temperature: forecast.currently.temperature,
            current_precip_probability: forecast.currently.precip_probability,
            current_icon: forecast.currently.icon,
            day_summary,
            day_icon,
            day_precip_probability,
        }
    }
}
