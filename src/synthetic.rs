//! Synthetic training data.
//!
//! There is no historical AQI archive on the device, so the regressors are fit
//! on a generated series that carries the patterns we expect the model to pick
//! up: daily cycle, rush-hour peaks, quieter nights, weekend dips, seasonal
//! drift and weather influence. Samples go through the same encoder used at
//! prediction time.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike};
use ndarray::{Array2, Axis};
use rand::Rng;
use rand::seq::SliceRandom;
use std::f64::consts::PI;

use crate::features::{encode, is_night, is_rush_hour, is_weekend, normalize_aqi, WeatherCondition, WeatherSignal};
use crate::horizon::Horizon;

/// Feature matrix and targets laid out as (features, samples) and (1, samples)
#[derive(Clone, Debug)]
pub struct Dataset {
    pub horizon: Horizon,
    pub features: Array2<f64>,
    pub targets: Array2<f64>,
}

impl Dataset {
    pub fn from_columns(horizon: Horizon, columns: Vec<(Vec<f64>, f64)>) -> Self {
        let n = columns.len();
        let width = horizon.feature_count();
        let mut features = Array2::zeros((width, n));
        let mut targets = Array2::zeros((1, n));

        for (j, (x, y)) in columns.into_iter().enumerate() {
            for (i, v) in x.into_iter().take(width).enumerate() {
                features[[i, j]] = v;
            }
            targets[[0, j]] = y;
        }

        Dataset { horizon, features, targets }
    }

    pub fn len(&self) -> usize {
        self.features.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Columns selected by `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> (Array2<f64>, Array2<f64>) {
        (
            self.features.select(Axis(1), indices),
            self.targets.select(Axis(1), indices),
        )
    }

    /// Shuffle once and split off the trailing `fraction` as validation data
    pub fn split<R: Rng + ?Sized>(&self, fraction: f64, rng: &mut R) -> (Dataset, Option<Dataset>) {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(rng);

        let n_val = ((self.len() as f64) * fraction.clamp(0.0, 0.5)).floor() as usize;
        if n_val == 0 || n_val >= self.len() {
            return (self.subset(&indices), None);
        }

        let (train_idx, val_idx) = indices.split_at(self.len() - n_val);
        (self.subset(train_idx), Some(self.subset(val_idx)))
    }

    fn subset(&self, indices: &[usize]) -> Dataset {
        let (features, targets) = self.select(indices);
        Dataset {
            horizon: self.horizon,
            features,
            targets,
        }
    }
}

/// Generate `samples` (features, normalized target) pairs starting at `reference`
pub fn generate<R: Rng + ?Sized>(
    horizon: Horizon,
    reference: DateTime<FixedOffset>,
    samples: usize,
    rng: &mut R,
) -> Dataset {
    let columns = match horizon {
        Horizon::Hourly => hourly_samples(reference, samples, rng),
        Horizon::Weekly => weekly_samples(reference, samples, rng),
    };
    Dataset::from_columns(horizon, columns)
}

fn hourly_samples<R: Rng + ?Sized>(
    reference: DateTime<FixedOffset>,
    samples: usize,
    rng: &mut R,
) -> Vec<(Vec<f64>, f64)> {
    let start = reference - Duration::hours(i64::from(reference.hour()));

    (0..samples)
        .map(|i| {
            let t = i as f64;
            let timestamp = start + Duration::hours(i as i64);
            let hour = timestamp.hour();

            let cyclical = (t / 12.0).sin() * 15.0;
            let trend = (t / 50.0).sin() * 10.0;
            let noise = rng.gen_range(-5.0..5.0);

            let prev_aqi = 50.0 + cyclical + trend + noise;
            let weather = WeatherSignal {
                factor: 1.0 + (t / 5.0).sin() * 0.2,
                code: 0.0,
            };

            let mut target = 50.0;
            if is_rush_hour(hour) {
                target += 20.0;
            }
            if is_night(hour) {
                target -= 15.0;
            }
            target += cyclical + trend;
            target *= weather.factor;
            target += noise * 0.5;

            let x = encode(Horizon::Hourly, &timestamp, prev_aqi, weather);
            (x.values().to_vec(), normalize_aqi(target))
        })
        .collect()
}

fn weekly_samples<R: Rng + ?Sized>(
    reference: DateTime<FixedOffset>,
    samples: usize,
    rng: &mut R,
) -> Vec<(Vec<f64>, f64)> {
    (0..samples)
        .map(|i| {
            let timestamp = reference + Duration::days(i as i64);
            let condition = WeatherCondition::ALL[i % WeatherCondition::ALL.len()];

            let month = f64::from(timestamp.month0());
            let weekend = is_weekend(timestamp.weekday());

            let seasonal = (month / 6.0 * PI).sin() * 10.0;
            let weekday_effect = if weekend { -5.0 } else { 5.0 };
            let noise = rng.gen_range(-4.0..4.0);
            let prev_aqi = 50.0 + seasonal + weekday_effect + noise;

            let mut target = 50.0 + seasonal;
            target += if weekend { -10.0 } else { 5.0 };
            target *= condition.factor();
            target += noise * 0.7;
            let target = target.clamp(20.0, 200.0);

            let x = encode(Horizon::Weekly, &timestamp, prev_aqi, condition.signal());
            (x.values().to_vec(), normalize_aqi(target))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn reference() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 14, 15, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_generate_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let hourly = generate(Horizon::Hourly, reference(), 150, &mut rng);
        assert_eq!(hourly.features.shape(), &[6, 150]);
        assert_eq!(hourly.targets.shape(), &[1, 150]);

        let weekly = generate(Horizon::Weekly, reference(), 100, &mut rng);
        assert_eq!(weekly.features.shape(), &[5, 100]);
    }

    #[test]
    fn test_targets_are_normalized() {
        let mut rng = StdRng::seed_from_u64(2);
        for horizon in Horizon::ALL {
            let data = generate(horizon, reference(), 120, &mut rng);
            assert!(data.targets.iter().all(|&y| (0.0..=1.0).contains(&y)));
        }
    }

    #[test]
    fn test_hourly_series_starts_at_midnight() {
        let mut rng = StdRng::seed_from_u64(3);
        let data = generate(Horizon::Hourly, reference(), 30, &mut rng);
        assert_eq!(data.features[[0, 0]], 0.0);
        assert_eq!(data.features[[0, 8]], 8.0 / 24.0);
        assert_eq!(data.features[[3, 8]], 1.0);
        assert_eq!(data.features[[3, 12]], 0.0);
    }

    #[test]
    fn test_same_seed_same_data() {
        let a = generate(Horizon::Weekly, reference(), 40, &mut StdRng::seed_from_u64(9));
        let b = generate(Horizon::Weekly, reference(), 40, &mut StdRng::seed_from_u64(9));
        assert_eq!(a.features, b.features);
        assert_eq!(a.targets, b.targets);
    }

    #[test]
    fn test_split_sizes() {
        let mut rng = StdRng::seed_from_u64(4);
        let data = generate(Horizon::Hourly, reference(), 150, &mut rng);
        let (train, val) = data.split(0.2, &mut rng);
        assert_eq!(train.len(), 120);
        assert_eq!(val.map(|v| v.len()), Some(30));

        let (all, none) = data.split(0.0, &mut rng);
        assert_eq!(all.len(), 150);
        assert!(none.is_none());
    }
}
