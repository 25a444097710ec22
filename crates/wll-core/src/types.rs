//! Output record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamp type (Unix epoch seconds)
pub type Timestamp = i64;

/// Flat record produced from one observation packet
///
/// Values are in the unit system named by `us_units`; a `None` value means the
/// device reported the observation but had no reading for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Unix timestamp reported by the device
    #[serde(rename = "dateTime")]
    pub date_time: Timestamp,

    /// Unit system (1=US, 16=Metric, 17=MetricWX)
    #[serde(rename = "usUnits")]
    pub us_units: i32,

    /// Output field name -> value
    #[serde(flatten)]
    pub observations: BTreeMap<String, Option<f64>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, value: Option<f64>) {
        self.observations.insert(field.into(), value);
    }

    /// Outer `None` if the field is absent, inner `None` if it is present but null
    pub fn get(&self, field: &str) -> Option<Option<f64>> {
        self.observations.get(field).copied()
    }

    pub fn value(&self, field: &str) -> Option<f64> {
        self.get(field).flatten()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.observations.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Stamp capture time and unit system once all fields are mapped
    pub fn stamp(&mut self, date_time: Timestamp, us_units: i32) {
        self.date_time = date_time;
        self.us_units = us_units;
    }
}

/// Unit system codes as understood by WeeWX
pub mod unit_systems {
    pub const US: i32 = 1;
    pub const METRIC: i32 = 16;
    pub const METRICWX: i32 = 17;
}

/// Render a timestamp for log output, e.g. `2024-03-01 12:00:00 Z`
pub fn format_timestamp(ts: Timestamp) -> String {
    match DateTime::<Utc>::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S Z").to_string(),
        None => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_field_access() {
        let mut record = Record::new();
        record.set("outTemp", Some(71.2));
        record.set("outHumidity", None);

        assert_eq!(record.value("outTemp"), Some(71.2));
        assert_eq!(record.get("outHumidity"), Some(None));
        assert_eq!(record.get("windSpeed"), None);
        assert!(record.contains("outHumidity"));
    }

    #[test]
    fn test_record_serde() {
        let mut record = Record::new();
        record.set("outTemp", Some(71.5));
        record.set("windGust", None);
        record.stamp(1700000000, unit_systems::US);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""dateTime":1700000000"#));
        assert!(json.contains(r#""usUnits":1"#));
        assert!(json.contains(r#""windGust":null"#));

        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 Z");
        assert_eq!(format_timestamp(1700000000), "2023-11-14 22:13:20 Z");
    }
}
