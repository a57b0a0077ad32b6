//! Travel time from home to work via the Google Maps Directions API

use anyhow::{ensure, Context, Result};
use chrono::Utc;
use url::Url;

use crate::api::HttpTransport;
use crate::config::CommuteConfig;
use crate::models::{CommuteSummary, DirectionsResponse, TrafficTrend};

/// Departure offset of the second request used for the trend
const TREND_OFFSET_SECS: i64 = 15 * 60;
/// Smallest change in travel time that counts as a trend
const TREND_THRESHOLD_SECS: i64 = 2 * 60;

pub struct CommuteFeed {
    transport: HttpTransport,
    config: CommuteConfig,
}

/// Duration of the first leg of the first route
struct Trip {
    text: String,
    seconds: i64,
}

impl CommuteFeed {
    pub fn new(transport: HttpTransport, config: CommuteConfig) -> Self {
        Self { transport, config }
    }

    /// Travel time leaving now, with the trend towards leaving later.
    pub async fn fetch(&self) -> Result<CommuteSummary> {
        self.fetch_at(Utc::now().timestamp()).await
    }

    async fn fetch_at(&self, now: i64) -> Result<CommuteSummary> {
        let current = self.trip(now).await?;
        let later = self.trip(now + TREND_OFFSET_SECS).await?;

        Ok(CommuteSummary {
            text: current.text,
            travel_mode: self.config.travel_mode,
            trend: trend(later.seconds - current.seconds),
        })
    }

    async fn trip(&self, departure_time: i64) -> Result<Trip> {
        let mut url = Url::parse(&format!(
            "{}/maps/api/directions/json",
            self.config.base_url.trim_end_matches('/')
        ))
        .context("Invalid directions base URL")?;
        url.query_pairs_mut()
            .append_pair("origin", &self.config.origin)
            .append_pair("destination", &self.config.destination)
            .append_pair("mode", self.config.travel_mode.as_str())
            .append_pair("departure_time", &departure_time.to_string())
            .append_pair("key", &self.config.api_key);

        let response: DirectionsResponse = self
            .transport
            .get_json(url.as_str())
            .await
            .context("No directions response")?;
        parse_trip(response)
    }
}

fn parse_trip(response: DirectionsResponse) -> Result<Trip> {
    ensure!(
        response.status == "OK",
        "Directions request failed: {}",
        response.status
    );
    let route = response.routes.into_iter().next().context("No route")?;
    let leg = route.legs.into_iter().next().context("Route without legs")?;
    let duration = leg
        .duration_in_traffic
        .or(leg.duration)
        .context("Leg without duration")?;

    let text = if route.summary.is_empty() {
        duration.text
    } else {
        format!("{} via {}", duration.text, route.summary)
    };
    Ok(Trip {
        text,
        seconds: duration.value,
    })
}

fn trend(delta_secs: i64) -> TrafficTrend {
    if delta_secs >= TREND_THRESHOLD_SECS {
        TrafficTrend::Up
    } else if delta_secs <= -TREND_THRESHOLD_SECS {
        TrafficTrend::Down
    } else {
        TrafficTrend::Flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TravelMode;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed(server: &MockServer) -> CommuteFeed {
        CommuteFeed::new(
            HttpTransport::new(reqwest::Client::new()),
            CommuteConfig {
                api_key: "KEY".to_string(),
                origin: "1 Home St".to_string(),
                destination: "2 Work Ave".to_string(),
                travel_mode: TravelMode::Driving,
                base_url: server.uri(),
            },
        )
    }

    fn directions(traffic_secs: i64, summary: &str) -> serde_json::Value {
        json!({
            "status": "OK",
            "routes": [{
                "summary": summary,
                "legs": [{
                    "duration": { "text": "20 mins", "value": 1200 },
                    "duration_in_traffic": {
                        "text": format!("{} mins", traffic_secs / 60),
                        "value": traffic_secs
                    }
                }]
            }]
        })
    }

    async fn mount_departure(server: &MockServer, departure: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/maps/api/directions/json"))
            .and(query_param("origin", "1 Home St"))
            .and(query_param("destination", "2 Work Ave"))
            .and(query_param("mode", "driving"))
            .and(query_param("key", "KEY"))
            .and(query_param("departure_time", departure))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_compares_now_with_fifteen_minutes_later() {
        let server = MockServer::start().await;
        mount_departure(&server, "1700000000", directions(1500, "I-280 S")).await;
        mount_departure(&server, "1700000900", directions(1800, "I-280 S")).await;

        let summary = feed(&server).fetch_at(1_700_000_000).await.unwrap();
        assert_eq!(
            summary,
            CommuteSummary {
                text: "25 mins via I-280 S".to_string(),
                travel_mode: TravelMode::Driving,
                trend: TrafficTrend::Up,
            }
        );
    }

    #[tokio::test]
    async fn test_error_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/directions/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "REQUEST_DENIED", "routes": [] })),
            )
            .mount(&server)
            .await;

        assert!(feed(&server).fetch_at(1_700_000_000).await.is_err());
    }

    #[test]
    fn test_parse_trip_without_traffic_or_summary() {
        let response: DirectionsResponse = serde_json::from_value(json!({
            "status": "OK",
            "routes": [{ "legs": [{ "duration": { "text": "1 hour 5 mins", "value": 3900 } }] }]
        }))
        .unwrap();
        let trip = parse_trip(response).unwrap();
        assert_eq!(trip.text, "1 hour 5 mins");
        assert_eq!(trip.seconds, 3900);
    }

    #[test]
    fn test_trend_threshold() {
        assert_eq!(trend(120), TrafficTrend::Up);
        assert_eq!(trend(119), TrafficTrend::Flat);
        assert_eq!(trend(-119), TrafficTrend::Flat);
        assert_eq!(trend(-120), TrafficTrend::Down);
    }
}
