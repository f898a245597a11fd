use aqi_forecast::{ForecastConfig, ForecastService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aqi_forecast=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Reads config/aqi-forecast.* and AQI_FORECAST__* variables if present
    let config = ForecastConfig::load()?;
    let service = ForecastService::from_config(config)?;

    let ready = service.init_models().await;
    println!("Models ready: {} ({})", ready, service.status());

    // Bengaluru
    let points = service.get_hourly_predictions(12.97, 77.59).await;
    for point in &points {
        println!(
            "{}  AQI {:>3}  {:<30}  confidence {:.2}  [{:?}]",
            point.timestamp,
            point.aqi,
            point.category().to_string(),
            point.confidence,
            point.source
        );
    }

    println!();
    println!("{}", service.export_csv(12.97, 77.59).await?);
    Ok(())
}
