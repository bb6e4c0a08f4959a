//! Kolada API payloads and the saved education statistics snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response body of `/data/kpi/{kpi}/municipality/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KpiDataResponse {
    #[serde(default)]
    pub values: Vec<KpiPeriod>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KpiPeriod {
    #[serde(default)]
    pub period: Option<i32>,
    #[serde(default)]
    pub values: Vec<KpiMeasurement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KpiMeasurement {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl KpiDataResponse {
    /// First non-null value reported for the total population (gender `T`).
    pub fn first_total(&self) -> Option<(f64, Option<i32>)> {
        self.values.iter().find_map(|period| {
            period
                .values
                .iter()
                .find(|m| m.gender.as_deref() == Some("T"))
                .and_then(|m| m.value)
                .map(|value| (value, period.period))
        })
    }
}

/// One KPI value for a municipality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiValue {
    pub title: String,
    pub value: f64,
    pub period: Option<i32>,
}

/// Education KPIs collected for one municipality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityStats {
    pub municipality_id: String,
    pub year: Option<i32>,
    pub kpis: BTreeMap<String, KpiValue>,
}

/// File written to `kolada/education_stats_<year|latest>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KoladaSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub year: Option<i32>,
    pub municipalities: BTreeMap<String, MunicipalityStats>,
    pub kpi_definitions: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_total_skips_gendered_and_null_values() {
        let response: KpiDataResponse = serde_json::from_str(
            r#"{"values": [
                {"period": 2023, "values": [{"gender": "K", "value": 1.0}, {"gender": "T", "value": null}]},
                {"period": 2022, "values": [{"gender": "M", "value": 2.0}, {"gender": "T", "value": 231.5}]},
                {"period": 2021, "values": [{"gender": "T", "value": 220.0}]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(response.first_total(), Some((231.5, Some(2022))));
    }

    #[test]
    fn test_empty_response() {
        let response: KpiDataResponse = serde_json::from_str(r#"{"count": 0}"#).unwrap();
        assert!(response.first_total().is_none());
    }
}
