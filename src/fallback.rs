//! Synthetic forecast series used whenever the model path cannot answer.
//!
//! The fallback never touches the network. Its output goes through the same
//! constraint engine as model output, so callers cannot tell the two apart by
//! shape or bounds.

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::constraints::{confidence, Constraints};
use crate::features::{is_evening_rush, is_morning_rush, is_night, is_weekend};
use crate::forecast::{pollutant_components, ForecastPoint, ForecastSource};
use crate::horizon::Horizon;
use crate::state::{ScalarStore, LAST_AQI_KEY};

/// Seed used when neither a stored value nor a baseline is available
pub const DEFAULT_SEED_AQI: f64 = 50.0;
/// Range the perturbed seed is kept in
pub const SEED_RANGE: (f64, f64) = (20.0, 150.0);
/// Magnitude range of the seed perturbation; the sign is random
pub const SEED_PERTURBATION: (f64, f64) = (10.0, 20.0);

const MORNING_RUSH_FACTOR: f64 = 1.3;
const EVENING_RUSH_FACTOR: f64 = 1.4;
const NIGHT_FACTOR: f64 = 0.7;
const WEEKDAY_FACTOR: f64 = 1.2;
const WEEKEND_FACTOR: f64 = 0.9;
const WEEKLY_TREND: f64 = 0.02;
const HOURLY_NOISE: f64 = 5.0;
const WEEKLY_NOISE: f64 = 8.0;

pub struct FallbackGenerator {
    store: Arc<dyn ScalarStore>,
    constraints: Constraints,
}

impl FallbackGenerator {
    pub fn new(store: Arc<dyn ScalarStore>, constraints: Constraints) -> Self {
        FallbackGenerator { store, constraints }
    }

    /// Unperturbed seed: stored last value, else `baseline`, else 50
    pub async fn base_seed(&self, baseline: Option<f64>) -> f64 {
        let stored = match self.store.get(LAST_AQI_KEY).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "could not read last AQI value");
                None
            }
        };
        stored
            .filter(|v| v.is_finite())
            .or(baseline.filter(|v| v.is_finite()))
            .unwrap_or(DEFAULT_SEED_AQI)
    }

    /// Persist the seed a series was built from; failures are logged and ignored
    pub async fn remember(&self, seed: f64) {
        if let Err(e) = self.store.set(LAST_AQI_KEY, seed).await {
            warn!(error = %e, "could not persist last AQI value");
        }
    }

    /// Full fallback path: resolve the seed, build the series, persist the seed
    pub async fn generate<R: Rng + Send + ?Sized>(
        &self,
        horizon: Horizon,
        baseline: Option<f64>,
        now: DateTime<FixedOffset>,
        rng: &mut R,
    ) -> Vec<ForecastPoint> {
        let seed = perturb_seed(self.base_seed(baseline).await, rng);
        let points = self.series(horizon, seed, now, rng);
        self.remember(seed).await;
        points
    }

    /// Deterministic given `rng`; first timestamp is `now`
    pub fn series<R: Rng + ?Sized>(
        &self,
        horizon: Horizon,
        seed: f64,
        now: DateTime<FixedOffset>,
        rng: &mut R,
    ) -> Vec<ForecastPoint> {
        debug!(%horizon, seed, "generating fallback series");
        let noise = match horizon {
            Horizon::Hourly => HOURLY_NOISE,
            Horizon::Weekly => WEEKLY_NOISE,
        };

        let mut previous = self.constraints.clamp_to_domain(seed);
        let mut points = Vec::with_capacity(horizon.steps());

        for i in 0..horizon.steps() {
            let timestamp = now + horizon.step_interval() * i as i32;
            let raw = seed * pattern_factor(horizon, &timestamp, i) + rng.gen_range(-noise..=noise);
            let aqi = self.constraints.constrain(raw, previous, horizon, rng);

            points.push(ForecastPoint {
                timestamp: timestamp.timestamp_millis(),
                aqi,
                confidence: confidence(i, horizon),
                components: Some(pollutant_components(aqi, rng)),
                feature_importance: None,
                source: ForecastSource::Fallback,
            });
            previous = f64::from(aqi);
        }

        points
    }
}

/// Move the seed by a random ±(10..20) and keep it in `SEED_RANGE`
pub fn perturb_seed<R: Rng + ?Sized>(seed: f64, rng: &mut R) -> f64 {
    let magnitude = rng.gen_range(SEED_PERTURBATION.0..SEED_PERTURBATION.1);
    let delta = if rng.gen_bool(0.5) { magnitude } else { -magnitude };
    let base = if seed.is_finite() { seed } else { DEFAULT_SEED_AQI };
    (base + delta).clamp(SEED_RANGE.0, SEED_RANGE.1)
}

fn pattern_factor(horizon: Horizon, timestamp: &DateTime<FixedOffset>, step: usize) -> f64 {
    match horizon {
        Horizon::Hourly => {
            let hour = timestamp.hour();
            if is_morning_rush(hour) {
                MORNING_RUSH_FACTOR
            } else if is_evening_rush(hour) {
                EVENING_RUSH_FACTOR
            } else if is_night(hour) {
                NIGHT_FACTOR
            } else {
                1.0
            }
        }
        Horizon::Weekly => {
            let day = if is_weekend(timestamp.weekday()) {
                WEEKEND_FACTOR
            } else {
                WEEKDAY_FACTOR
            };
            day * (1.0 + WEEKLY_TREND * step as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryScalarStore;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn generator(store: Arc<dyn ScalarStore>) -> FallbackGenerator {
        FallbackGenerator::new(store, Constraints::default())
    }

    fn noon() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 14, 12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_perturb_seed_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for seed in [0.0, 20.0, 50.0, 150.0, 400.0, f64::NAN] {
            for _ in 0..50 {
                let s = perturb_seed(seed, &mut rng);
                assert!((20.0..=150.0).contains(&s));
            }
        }
        for _ in 0..50 {
            let delta = (perturb_seed(80.0, &mut rng) - 80.0).abs();
            assert!((10.0..=20.0).contains(&delta));
        }
    }

    #[tokio::test]
    async fn test_seed_prefers_stored_value() {
        let store = Arc::new(MemoryScalarStore::with_value(LAST_AQI_KEY, 90.0));
        assert_eq!(generator(store).base_seed(Some(30.0)).await, 90.0);

        let empty = Arc::new(MemoryScalarStore::new());
        assert_eq!(generator(empty.clone()).base_seed(Some(30.0)).await, 30.0);
        assert_eq!(generator(empty).base_seed(None).await, DEFAULT_SEED_AQI);
    }

    #[test]
    fn test_series_well_formed() {
        let g = generator(Arc::new(MemoryScalarStore::new()));
        let mut rng = StdRng::seed_from_u64(2);
        let constraints = Constraints::default();

        for horizon in Horizon::ALL {
            let seed = 70.0;
            let points = g.series(horizon, seed, noon(), &mut rng);
            assert_eq!(points.len(), horizon.steps());

            let step_ms = horizon.step_interval().num_milliseconds();
            assert_eq!(points[0].timestamp, noon().timestamp_millis());

            let mut previous = seed;
            for (i, p) in points.iter().enumerate() {
                if i > 0 {
                    assert_eq!(p.timestamp - points[i - 1].timestamp, step_ms);
                    assert!(p.confidence <= points[i - 1].confidence);
                }
                assert!((5..=500).contains(&p.aqi));
                assert!((f64::from(p.aqi) - previous).abs() <= constraints.step_bound(previous, horizon));
                assert_eq!(p.source, ForecastSource::Fallback);
                assert!(p.components.is_some());
                previous = f64::from(p.aqi);
            }
        }
    }

    #[tokio::test]
    async fn test_generate_persists_seed() {
        let store = Arc::new(MemoryScalarStore::new());
        let g = generator(store.clone());
        let mut rng = StdRng::seed_from_u64(3);

        let points = g.generate(Horizon::Hourly, Some(60.0), noon(), &mut rng).await;
        assert_eq!(points.len(), 24);

        let stored = store.get(LAST_AQI_KEY).await.unwrap().unwrap();
        assert!((20.0..=150.0).contains(&stored));
        assert!((stored - 60.0).abs() >= 10.0);
    }

    #[test]
    fn test_series_is_deterministic_for_a_seed() {
        let g = generator(Arc::new(MemoryScalarStore::new()));
        let a = g.series(Horizon::Weekly, 55.0, noon(), &mut StdRng::seed_from_u64(9));
        let b = g.series(Horizon::Weekly, 55.0, noon(), &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
