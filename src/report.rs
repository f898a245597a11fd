//! AQI categories and CSV export of forecast series.

use chrono::{FixedOffset, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::forecast::ForecastPoint;

/// US EPA AQI band
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn from_aqi(aqi: u32) -> Self {
        match aqi {
            0..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv output was not valid UTF-8")]
    Encoding,

    #[error("timestamp {0} is out of range")]
    Timestamp(i64),
}

/// Render hourly then weekly points as `Date,Time,AQI,Category` rows
///
/// Dates and times are written in `offset`.
pub fn to_csv(
    hourly: &[ForecastPoint],
    weekly: &[ForecastPoint],
    offset: FixedOffset,
) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Date", "Time", "AQI", "Category"])?;

    for point in hourly.iter().chain(weekly.iter()) {
        let at = offset
            .timestamp_millis_opt(point.timestamp)
            .single()
            .ok_or(ReportError::Timestamp(point.timestamp))?;
        writer.write_record([
            at.format("%Y-%m-%d").to_string(),
            at.format("%H:%M").to_string(),
            point.aqi.to_string(),
            point.category().label().to_string(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| ReportError::Csv(e.into_error().into()))?;
    String::from_utf8(bytes).map_err(|_| ReportError::Encoding)
}
