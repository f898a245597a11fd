//! Upstream data sources: current AQI and current weather.
//!
//! The forecast service only sees the traits; the HTTP clients here are the
//! production implementations.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::features::WeatherCondition;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("unexpected upstream payload: {0}")]
    Decode(String),

    #[error("provider is not configured: {0}")]
    NotConfigured(&'static str),
}

/// WGS84 position
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Coordinates { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Current air quality at a location
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentAqi {
    #[serde(alias = "airQuality")]
    pub aqi: f64,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub components: Option<HashMap<String, f64>>,
}

/// Current weather at a location
#[derive(Clone, Debug, PartialEq)]
pub struct WeatherReport {
    pub condition: WeatherCondition,
    pub description: Option<String>,
}

#[async_trait]
pub trait AqiProvider: Send + Sync {
    async fn current_aqi(&self, coords: Coordinates) -> Result<CurrentAqi, ProviderError>;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_weather(&self, coords: Coordinates) -> Result<WeatherReport, ProviderError>;
}

fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

/// AQI service answering `GET {base}/current?lat=..&lon=..` with a JSON body
/// holding `aqi` (or `airQuality`)
pub struct HttpAqiProvider {
    client: Client,
    base_url: String,
}

impl HttpAqiProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(HttpAqiProvider {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AqiProvider for HttpAqiProvider {
    async fn current_aqi(&self, coords: Coordinates) -> Result<CurrentAqi, ProviderError> {
        let url = format!("{}/current", self.base_url);
        debug!(%url, lat = coords.lat, lon = coords.lon, "fetching current AQI");

        let response = self
            .client
            .get(&url)
            .query(&[("lat", coords.lat), ("lon", coords.lon)])
            .send()
            .await?;
        let current: CurrentAqi = check_status(response).await?.json().await?;

        if !current.aqi.is_finite() || current.aqi < 0.0 {
            return Err(ProviderError::Decode(format!("AQI {} out of range", current.aqi)));
        }
        Ok(current)
    }
}

#[derive(Deserialize)]
struct OwmResponse {
    weather: Vec<OwmWeather>,
}

#[derive(Deserialize)]
struct OwmWeather {
    id: u32,
    #[serde(default)]
    description: Option<String>,
}

/// OpenWeatherMap current-weather endpoint (`GET {base}/weather`)
pub struct OpenWeatherProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenWeatherProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openweathermap.org/data/2.5";

    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(OpenWeatherProvider {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current_weather(&self, coords: Coordinates) -> Result<WeatherReport, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("weather API key"))?;
        let url = format!("{}/weather", self.base_url);
        debug!(%url, lat = coords.lat, lon = coords.lon, "fetching current weather");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", coords.lat.to_string()),
                ("lon", coords.lon.to_string()),
                ("appid", api_key.to_string()),
            ])
            .send()
            .await?;
        let body: OwmResponse = check_status(response).await?.json().await?;

        let first = body
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("empty weather list".into()))?;

        Ok(WeatherReport {
            condition: WeatherCondition::from_owm_code(first.id),
            description: first.description,
        })
    }
}
