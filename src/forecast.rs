use chrono::{DateTime, Datelike, TimeZone, Timelike};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::features::{is_rush_hour, is_weekend};
use crate::horizon::Horizon;
use crate::report::AqiCategory;

/// Fraction of the AQI value attributed to each pollutant.
///
/// Illustrative fixed ratios, not a chemistry model.
pub const COMPONENT_RATIOS: [(&str, f64); 4] = [
    ("pm2_5", 0.4),
    ("pm10", 0.6),
    ("o3", 1.0 / 3.0),
    ("no2", 0.2),
];

/// Half-width of the uniform noise added to every component estimate
pub const COMPONENT_NOISE: f64 = 1.0;

/// Which path produced a forecast point
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastSource {
    Model,
    Fallback,
}

/// One predicted time step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub aqi: u32,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<BTreeMap<String, f64>>,
    pub source: ForecastSource,
}

impl ForecastPoint {
    pub fn category(&self) -> AqiCategory {
        AqiCategory::from_aqi(self.aqi)
    }
}

/// Pollutant estimates derived from `aqi` by `COMPONENT_RATIOS`, never negative
pub fn pollutant_components<R: Rng + ?Sized>(aqi: u32, rng: &mut R) -> BTreeMap<String, f64> {
    COMPONENT_RATIOS
        .iter()
        .map(|&(name, ratio)| {
            let noise = rng.gen_range(-COMPONENT_NOISE..=COMPONENT_NOISE);
            let value = (f64::from(aqi) * ratio + noise).max(0.0);
            (name.to_string(), (value * 10.0).round() / 10.0)
        })
        .collect()
}

/// Rough attribution of the forecast to its inputs, for display
pub fn feature_importance<Tz: TimeZone>(
    horizon: Horizon,
    timestamp: &DateTime<Tz>,
    weather_factor: f64,
) -> BTreeMap<String, f64> {
    let weekend = is_weekend(timestamp.weekday());
    let weather_active = (weather_factor - 1.0).abs() > f64::EPSILON;

    let entries: Vec<(&str, f64)> = match horizon {
        Horizon::Hourly => vec![
            ("time_of_day", if is_rush_hour(timestamp.hour()) { 0.4 } else { 0.1 }),
            ("day_of_week", if weekend { 0.15 } else { 0.25 }),
            ("month", 0.05),
            ("previous_aqi", 0.3),
            ("weather", if weather_active { 0.25 } else { 0.05 }),
        ],
        Horizon::Weekly => vec![
            ("day_of_week", if weekend { 0.35 } else { 0.2 }),
            ("month", 0.1),
            ("weekend_effect", if weekend { 0.25 } else { 0.05 }),
            ("previous_aqi", 0.3),
            ("seasonal_pattern", 0.15),
        ],
    };

    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
