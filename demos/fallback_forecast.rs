use aqi_forecast::{Constraints, FallbackGenerator, Horizon, MemoryScalarStore};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aqi_forecast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let generator = FallbackGenerator::new(Arc::new(MemoryScalarStore::new()), Constraints::default());
    let mut rng = StdRng::seed_from_u64(7);
    let now = Utc::now().fixed_offset();

    // The second call seeds from the value the first one stored
    for horizon in Horizon::ALL {
        let points = generator.generate(horizon, Some(85.0), now, &mut rng).await;
        let values: Vec<String> = points.iter().map(|p| p.aqi.to_string()).collect();
        println!("{:<7} {}", horizon, values.join(" "));
    }
}
