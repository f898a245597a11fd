use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Forecast cadence
///
/// Every component that behaves differently per cadence (feature layout,
/// allowed step change, confidence decay, fallback heuristics) matches on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    /// 24 one-hour steps
    Hourly,
    /// 7 one-day steps
    Weekly,
}

impl Horizon {
    pub const ALL: [Horizon; 2] = [Horizon::Hourly, Horizon::Weekly];

    /// Number of points a forecast of this horizon contains
    pub fn steps(self) -> usize {
        match self {
            Horizon::Hourly => 24,
            Horizon::Weekly => 7,
        }
    }

    /// Spacing between consecutive forecast points
    pub fn step_interval(self) -> Duration {
        match self {
            Horizon::Hourly => Duration::hours(1),
            Horizon::Weekly => Duration::days(1),
        }
    }

    /// Width of the encoded feature vector
    pub fn feature_count(self) -> usize {
        match self {
            Horizon::Hourly => 6,
            Horizon::Weekly => 5,
        }
    }

    /// Hidden layer widths of the regressor for this horizon
    pub fn hidden_sizes(self) -> [usize; 2] {
        match self {
            Horizon::Hourly => [12, 8],
            Horizon::Weekly => [10, 6],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Horizon::Hourly => "hourly",
            Horizon::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
