//! Weight history from the Withings (or Nokia Health) measure API

use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Local, Months, NaiveTime, TimeZone};

use crate::api::AuthenticatedClient;
use crate::auth::ServiceCredentialConfig;
use crate::models::{BodyMeasure, MeasureResponse, MEASURE_TYPE_WEIGHT};

/// How far back the weight history reaches
const HISTORY_MONTHS: u32 = 6;

pub struct BodyFeed {
    client: Arc<AuthenticatedClient>,
    credentials: ServiceCredentialConfig,
    api_base: String,
}

impl BodyFeed {
    pub fn new(
        client: Arc<AuthenticatedClient>,
        credentials: ServiceCredentialConfig,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            credentials,
            api_base: api_base.into(),
        }
    }

    /// Weight measures of the last six months, oldest first.
    pub async fn fetch(&self) -> Result<Vec<BodyMeasure>> {
        let url = format!(
            "{}/measure?action=getmeas&startdate={}",
            self.api_base.trim_end_matches('/'),
            start_timestamp(&Local::now())
        );
        let response: MeasureResponse = self
            .client
            .get_json(&url, &self.credentials)
            .await
            .context("No body measurement response")?;
        parse_measures(response)
    }
}

/// Local midnight today, six months back, in Unix seconds.
fn start_timestamp<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let today = now.date_naive();
    let start = today
        .checked_sub_months(Months::new(HISTORY_MONTHS))
        .unwrap_or(today)
        .and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&start).earliest() {
        Some(local) => local.timestamp(),
        None => start.and_utc().timestamp(),
    }
}

fn parse_measures(response: MeasureResponse) -> Result<Vec<BodyMeasure>> {
    ensure!(
        response.status == 0,
        "Error status in measure response: {}",
        response.status
    );
    let body = response.body.context("Measure response without body")?;

    let mut measures: Vec<BodyMeasure> = body
        .measure_groups
        .iter()
        .flat_map(|group| {
            group
                .measures
                .iter()
                .filter(|m| m.kind == MEASURE_TYPE_WEIGHT)
                .map(|m| BodyMeasure {
                    timestamp: group.date,
                    weight_kg: m.decoded(),
                })
        })
        .collect();
    measures.sort_by_key(|m| m.timestamp);
    Ok(measures)
}
