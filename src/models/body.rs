//! Body measurement models

use serde::{Deserialize, Serialize};

/// Withings measure type for body weight
pub const MEASURE_TYPE_WEIGHT: i32 = 1;

/// A timestamped weight data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyMeasure {
    /// Unix seconds when the measure was taken
    pub timestamp: i64,
    pub weight_kg: f64,
}

/// `action=getmeas` response
#[derive(Debug, Clone, Deserialize)]
pub struct MeasureResponse {
    pub status: i64,
    #[serde(default)]
    pub body: Option<MeasureBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeasureBody {
    #[serde(rename = "measuregrps", default)]
    pub measure_groups: Vec<MeasureGroup>,
}

/// Measures taken together at `date`
#[derive(Debug, Clone, Deserialize)]
pub struct MeasureGroup {
    pub date: i64,
    #[serde(default)]
    pub measures: Vec<Measure>,
}

/// One measure; its real value is `value * 10^unit`
#[derive(Debug, Clone, Deserialize)]
pub struct Measure {
    pub value: i64,
    #[serde(rename = "type")]
    pub kind: i32,
    pub unit: i32,
}

impl Measure {
    pub fn decoded(&self) -> f64 {
        self.value as f64 * 10f64.powi(self.unit)
    }
}
