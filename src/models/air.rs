//! Air quality models

use serde::{Deserialize, Serialize};

/// Current air quality index at the mirror's location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    pub aqi: i32,
    /// Category name, e.g. "Good"
    pub category: String,
    /// Category 1 (good) through 6 (hazardous)
    pub category_number: i32,
}

/// One entry of the AirNow `latLong` forecast array
#[derive(Debug, Clone, Deserialize)]
pub struct AirNowForecast {
    #[serde(rename = "AQI")]
    pub aqi: i32,
    #[serde(rename = "Category")]
    pub category: AirNowCategory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AirNowCategory {
    #[serde(rename = "Number")]
    pub number: i32,
    #[serde(rename = "Name")]
    pub name: String,
}

impl From<AirNowForecast> for AirQuality {
    fn from(forecast: AirNowForecast) -> Self {
        Self {
            aqi: forecast.aqi,
            category: forecast.category.name,
            category_number: forecast.category.number,
        }
    }
}
