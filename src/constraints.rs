//! Plausibility limits on forecast values and the per-step confidence curve.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};
use crate::horizon::Horizon;

/// Largest fractional move from the previous value in one hourly step
pub const HOURLY_MAX_CHANGE: f64 = 0.15;
/// Largest fractional move from the previous value in one daily step
pub const WEEKLY_MAX_CHANGE: f64 = 0.30;
/// Lowest AQI a forecast reports; real readings rarely sit below it
pub const AQI_FLOOR: f64 = 5.0;
/// Top of the AQI scale
pub const AQI_CEILING: f64 = 500.0;
/// Half-width of the uniform jitter added after the step clamp
pub const JITTER_AMPLITUDE: f64 = 2.0;

const HOURLY_CONFIDENCE_DECAY: f64 = 0.02;
const HOURLY_CONFIDENCE_FLOOR: f64 = 0.5;
const WEEKLY_CONFIDENCE_DECAY: f64 = 0.1;
const WEEKLY_CONFIDENCE_FLOOR: f64 = 0.3;

/// Confidence of the `step`-th point (0-based); non-increasing in `step`
pub fn confidence(step: usize, horizon: Horizon) -> f64 {
    let (decay, floor) = match horizon {
        Horizon::Hourly => (HOURLY_CONFIDENCE_DECAY, HOURLY_CONFIDENCE_FLOOR),
        Horizon::Weekly => (WEEKLY_CONFIDENCE_DECAY, WEEKLY_CONFIDENCE_FLOOR),
    };
    (1.0 - step as f64 * decay).max(floor)
}

/// Tunable limits, defaulting to the constants above
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub hourly_max_change: f64,
    pub weekly_max_change: f64,
    pub floor: f64,
    pub ceiling: f64,
    pub jitter: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            hourly_max_change: HOURLY_MAX_CHANGE,
            weekly_max_change: WEEKLY_MAX_CHANGE,
            floor: AQI_FLOOR,
            ceiling: AQI_CEILING,
            jitter: JITTER_AMPLITUDE,
        }
    }
}

impl Constraints {
    pub fn validate(&self) -> ForecastResult<()> {
        let fractions_ok = [self.hourly_max_change, self.weekly_max_change]
            .iter()
            .all(|f| f.is_finite() && *f >= 0.0 && *f <= 1.0);
        if !fractions_ok {
            return Err(ForecastError::InvalidConfig("max change fractions must be in [0, 1]".into()));
        }
        if !(self.floor.is_finite() && self.ceiling.is_finite() && 0.0 <= self.floor && self.floor < self.ceiling) {
            return Err(ForecastError::InvalidConfig("AQI floor must be below the ceiling".into()));
        }
        if !(self.jitter.is_finite() && self.jitter >= 0.0) {
            return Err(ForecastError::InvalidConfig("jitter must be non-negative".into()));
        }
        Ok(())
    }

    pub fn max_change(&self, horizon: Horizon) -> f64 {
        match horizon {
            Horizon::Hourly => self.hourly_max_change,
            Horizon::Weekly => self.weekly_max_change,
        }
    }

    pub fn clamp_to_domain(&self, aqi: f64) -> f64 {
        if aqi.is_finite() {
            aqi.clamp(self.floor, self.ceiling)
        } else {
            self.floor
        }
    }

    /// Largest `|result - baseline|` `constrain` can produce for this baseline
    /// (rounding included), as long as the baseline lies inside the domain.
    pub fn step_bound(&self, baseline: f64, horizon: Horizon) -> f64 {
        self.max_change(horizon) * baseline + self.jitter + 0.5
    }

    /// Pull a raw AQI estimate into a plausible value near `baseline`
    ///
    /// Order: step clamp around the baseline, jitter, absolute domain clamp,
    /// rounding. The domain clamp runs last so jitter can never leave it.
    pub fn constrain<R: Rng + ?Sized>(&self, raw: f64, baseline: f64, horizon: Horizon, rng: &mut R) -> u32 {
        let baseline = self.clamp_to_domain(baseline);
        let raw = if raw.is_finite() { raw } else { baseline };

        let max_delta = baseline * self.max_change(horizon);
        let stepped = raw.clamp(baseline - max_delta, baseline + max_delta);

        let jitter = if self.jitter > 0.0 {
            rng.gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };

        self.clamp_to_domain(stepped + jitter).round() as u32
    }
}
