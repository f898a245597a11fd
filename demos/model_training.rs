use aqi_forecast::training::train_horizon;
use aqi_forecast::{Horizon, TrainingConfig};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aqi_forecast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TrainingConfig::default();
    let reference = Utc::now().fixed_offset();
    let mut rng = StdRng::seed_from_u64(2024);

    for horizon in Horizon::ALL {
        let trained = train_horizon(horizon, &config, reference, &mut rng)?;

        println!("{} model ({} training samples)", horizon, trained.training_samples);
        for layer in trained.network.architecture() {
            println!("  {}", layer);
        }
        println!("  epoch      loss   accuracy proxy");
        for i in 0..trained.metrics.len() {
            println!(
                "  {:>5}  {:>8.5}  {:>6.3}",
                trained.metrics.epoch[i], trained.metrics.loss[i], trained.metrics.accuracy_proxy[i]
            );
        }
        println!();
    }
    Ok(())
}
