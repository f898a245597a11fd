//! Feature encoding for the hourly and weekly regressors.
//!
//! Canonical normalization: hour / 24, weekday / 7 (Sunday = 0), zero-based
//! month / 12, previous AQI / 500. Each cyclical field therefore stays in
//! `[0, 1)` for every legitimate timestamp.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::horizon::Horizon;

/// Upper end of the AQI scale, used to normalize AQI values into `[0, 1]`
pub const AQI_SCALE: f64 = 500.0;

const HOURS_PER_DAY: f64 = 24.0;
const DAYS_PER_WEEK: f64 = 7.0;
const MONTHS_PER_YEAR: f64 = 12.0;

pub const HOURLY_FEATURES: [&str; 6] = [
    "hour_of_day",
    "day_of_week",
    "month",
    "is_rush_hour",
    "previous_aqi",
    "weather_factor",
];

pub const WEEKLY_FEATURES: [&str; 5] = [
    "day_of_week",
    "month",
    "is_weekend",
    "previous_aqi",
    "weather_code",
];

/// Morning (07-09) or evening (16-19) traffic peak, bounds inclusive
pub fn is_rush_hour(hour: u32) -> bool {
    matches!(hour, 7..=9 | 16..=19)
}

pub fn is_morning_rush(hour: u32) -> bool {
    matches!(hour, 7..=9)
}

pub fn is_evening_rush(hour: u32) -> bool {
    matches!(hour, 16..=19)
}

/// 00-05, when traffic and emissions are lowest
pub fn is_night(hour: u32) -> bool {
    hour <= 5
}

pub fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Coarse weather category as reported by the weather provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherCondition {
    Clear,
    Clouds,
    Drizzle,
    Rain,
    Thunderstorm,
    Snow,
    /// Mist, fog, haze, smoke, dust
    Atmosphere,
}

impl WeatherCondition {
    /// All categories, indexed by `code()`
    pub const ALL: [WeatherCondition; 7] = [
        WeatherCondition::Clear,
        WeatherCondition::Clouds,
        WeatherCondition::Drizzle,
        WeatherCondition::Rain,
        WeatherCondition::Thunderstorm,
        WeatherCondition::Snow,
        WeatherCondition::Atmosphere,
    ];

    /// Map an OpenWeatherMap condition id to a category
    ///
    /// 2xx thunderstorm, 3xx drizzle, 5xx rain, 6xx snow, 7xx atmosphere,
    /// 800 clear, 80x clouds.
    pub fn from_owm_code(code: u32) -> Self {
        match code {
            0..=299 => WeatherCondition::Thunderstorm,
            300..=399 => WeatherCondition::Drizzle,
            400..=599 => WeatherCondition::Rain,
            600..=699 => WeatherCondition::Snow,
            700..=799 => WeatherCondition::Atmosphere,
            800 => WeatherCondition::Clear,
            _ => WeatherCondition::Clouds,
        }
    }

    /// Multiplier applied to predicted AQI
    ///
    /// Precipitation washes pollutants out (< 1), stagnant hazy air traps them (> 1).
    pub fn factor(self) -> f64 {
        match self {
            WeatherCondition::Thunderstorm => 0.8,
            WeatherCondition::Rain => 0.9,
            WeatherCondition::Drizzle => 0.92,
            WeatherCondition::Snow => 0.95,
            WeatherCondition::Clear => 1.0,
            WeatherCondition::Clouds => 1.05,
            WeatherCondition::Atmosphere => 1.2,
        }
    }

    /// Ordinal used by the weekly encoder, 0..=6
    pub fn code(self) -> u8 {
        match self {
            WeatherCondition::Clear => 0,
            WeatherCondition::Clouds => 1,
            WeatherCondition::Drizzle => 2,
            WeatherCondition::Rain => 3,
            WeatherCondition::Thunderstorm => 4,
            WeatherCondition::Snow => 5,
            WeatherCondition::Atmosphere => 6,
        }
    }

    pub fn signal(self) -> WeatherSignal {
        WeatherSignal {
            factor: self.factor(),
            code: f64::from(self.code()) / 6.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WeatherCondition::Clear => "clear",
            WeatherCondition::Clouds => "clouds",
            WeatherCondition::Drizzle => "drizzle",
            WeatherCondition::Rain => "rain",
            WeatherCondition::Thunderstorm => "thunderstorm",
            WeatherCondition::Snow => "snow",
            WeatherCondition::Atmosphere => "atmosphere",
        }
    }
}

impl Default for WeatherCondition {
    fn default() -> Self {
        WeatherCondition::Clear
    }
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeatherCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clear" | "sunny" => Ok(WeatherCondition::Clear),
            "clouds" | "cloudy" | "overcast" => Ok(WeatherCondition::Clouds),
            "drizzle" => Ok(WeatherCondition::Drizzle),
            "rain" | "showers" => Ok(WeatherCondition::Rain),
            "thunderstorm" | "storm" => Ok(WeatherCondition::Thunderstorm),
            "snow" | "sleet" => Ok(WeatherCondition::Snow),
            "atmosphere" | "mist" | "fog" | "haze" | "smoke" | "dust" | "sand" => {
                Ok(WeatherCondition::Atmosphere)
            }
            other => Err(format!("unknown weather condition '{}'", other)),
        }
    }
}

/// Weather context for one encoded step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeatherSignal {
    /// AQI multiplier, roughly 0.8..=1.2
    pub factor: f64,
    /// Normalized condition ordinal in `[0, 1]`
    pub code: f64,
}

impl Default for WeatherSignal {
    fn default() -> Self {
        WeatherCondition::Clear.signal()
    }
}

/// Normalized model input for one forecast step
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    horizon: Horizon,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column layout (features, 1) expected by the network
    pub fn as_column(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.values.len(), 1), |(i, _)| self.values[i])
    }

    pub fn names(horizon: Horizon) -> &'static [&'static str] {
        match horizon {
            Horizon::Hourly => &HOURLY_FEATURES,
            Horizon::Weekly => &WEEKLY_FEATURES,
        }
    }
}

/// Normalize an AQI reading into `[0, 1]`
pub fn normalize_aqi(aqi: f64) -> f64 {
    if aqi.is_finite() {
        (aqi / AQI_SCALE).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn denormalize_aqi(value: f64) -> f64 {
    value * AQI_SCALE
}

/// Encode one step's context; pure function of its inputs
pub fn encode<Tz: TimeZone>(
    horizon: Horizon,
    timestamp: &DateTime<Tz>,
    prev_aqi: f64,
    weather: WeatherSignal,
) -> FeatureVector {
    let weekday = timestamp.weekday();
    let day = f64::from(weekday.num_days_from_sunday()) / DAYS_PER_WEEK;
    let month = f64::from(timestamp.month0()) / MONTHS_PER_YEAR;
    let prev = normalize_aqi(prev_aqi);

    let values = match horizon {
        Horizon::Hourly => {
            let hour = timestamp.hour();
            vec![
                f64::from(hour) / HOURS_PER_DAY,
                day,
                month,
                flag(is_rush_hour(hour)),
                prev,
                weather.factor,
            ]
        }
        Horizon::Weekly => vec![
            day,
            month,
            flag(is_weekend(weekday)),
            prev,
            weather.code.clamp(0.0, 1.0),
        ],
    };

    FeatureVector { horizon, values }
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_hourly_layout() {
        // 2024-03-04 is a Monday
        let v = encode(Horizon::Hourly, &at(2024, 3, 4, 8), 100.0, WeatherCondition::Rain.signal());
        assert_eq!(v.len(), 6);
        assert_eq!(v.values()[0], 8.0 / 24.0);
        assert_eq!(v.values()[1], 1.0 / 7.0);
        assert_eq!(v.values()[2], 2.0 / 12.0);
        assert_eq!(v.values()[3], 1.0);
        assert_eq!(v.values()[4], 0.2);
        assert_eq!(v.values()[5], 0.9);
    }

    #[test]
    fn test_weekly_layout() {
        // 2024-03-09 is a Saturday
        let v = encode(Horizon::Weekly, &at(2024, 3, 9, 12), 50.0, WeatherCondition::Atmosphere.signal());
        assert_eq!(v.len(), 5);
        assert_eq!(v.values()[0], 6.0 / 7.0);
        assert_eq!(v.values()[2], 1.0);
        assert_eq!(v.values()[3], 0.1);
        assert_eq!(v.values()[4], 1.0);
    }

    #[test]
    fn test_boundaries_stay_below_one() {
        // last hour of the year, Saturday 2022-12-31
        let v = encode(Horizon::Hourly, &at(2022, 12, 31, 23), 900.0, WeatherSignal::default());
        assert!(v.values()[0] < 1.0);
        assert!(v.values()[1] < 1.0);
        assert!(v.values()[2] < 1.0);
        assert_eq!(v.values()[4], 1.0);

        let midnight = encode(Horizon::Hourly, &at(2023, 1, 1, 0), -5.0, WeatherSignal::default());
        assert_eq!(midnight.values()[0], 0.0);
        assert_eq!(midnight.values()[1], 0.0);
        assert_eq!(midnight.values()[2], 0.0);
        assert_eq!(midnight.values()[4], 0.0);
    }

    #[test]
    fn test_rush_hour_rule() {
        let rush: Vec<u32> = (0..24).filter(|&h| is_rush_hour(h)).collect();
        assert_eq!(rush, vec![7, 8, 9, 16, 17, 18, 19]);
        assert!(is_morning_rush(9) && !is_morning_rush(10));
        assert!(is_evening_rush(19) && !is_evening_rush(20));
    }

    #[test]
    fn test_local_offset_moves_hour() {
        let utc = at(2024, 6, 1, 2);
        let tokyo = utc.with_timezone(&FixedOffset::east_opt(9 * 3600).unwrap());
        let v = encode(Horizon::Hourly, &tokyo, 40.0, WeatherSignal::default());
        assert_eq!(v.values()[0], 11.0 / 24.0);
    }

    #[test]
    fn test_weather_code_mapping() {
        assert_eq!(WeatherCondition::from_owm_code(211), WeatherCondition::Thunderstorm);
        assert_eq!(WeatherCondition::from_owm_code(310), WeatherCondition::Drizzle);
        assert_eq!(WeatherCondition::from_owm_code(502), WeatherCondition::Rain);
        assert_eq!(WeatherCondition::from_owm_code(601), WeatherCondition::Snow);
        assert_eq!(WeatherCondition::from_owm_code(741), WeatherCondition::Atmosphere);
        assert_eq!(WeatherCondition::from_owm_code(800), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_owm_code(804), WeatherCondition::Clouds);
        assert!(WeatherCondition::Rain.factor() < 1.0);
        assert!(WeatherCondition::Atmosphere.factor() > 1.0);
        assert_eq!("Fog".parse::<WeatherCondition>(), Ok(WeatherCondition::Atmosphere));
        assert!("volcano".parse::<WeatherCondition>().is_err());
    }

    #[test]
    fn test_as_column_shape() {
        let v = encode(Horizon::Weekly, &at(2024, 1, 1, 0), 60.0, WeatherSignal::default());
        assert_eq!(v.as_column().shape(), &[5, 1]);
    }
}
