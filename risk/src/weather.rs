//! Weather Providers
//!
//! Live forecast aggregation with a bounded timeout, falling back to a
//! calibrated synthetic snapshot whenever the live source misbehaves.

use crate::{Result, RiskError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geoguard_sim::GeoPoint;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Forecast bucket span (hours)
const BUCKET_HOURS: u32 = 3;

const OPENWEATHER_FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// Sky condition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WeatherCondition {
    Clear,
    Clouds,
    Drizzle,
    Rain,
    Thunderstorm,
}

impl WeatherCondition {
    pub const ALL: [WeatherCondition; 5] = [
        WeatherCondition::Clear,
        WeatherCondition::Clouds,
        WeatherCondition::Drizzle,
        WeatherCondition::Rain,
        WeatherCondition::Thunderstorm,
    ];

    /// Condition score used by the climate model
    pub fn severity(&self) -> f64 {
        match self {
            WeatherCondition::Thunderstorm => 1.0,
            WeatherCondition::Rain => 0.6,
            WeatherCondition::Drizzle => 0.3,
            WeatherCondition::Clouds => 0.1,
            WeatherCondition::Clear => 0.0,
        }
    }

    /// Map a forecast feed's condition group. Groups without a slope
    /// effect (mist, haze, snow...) count as clear.
    pub fn from_feed(main: &str) -> Self {
        match main {
            "Thunderstorm" => WeatherCondition::Thunderstorm,
            "Rain" => WeatherCondition::Rain,
            "Drizzle" => WeatherCondition::Drizzle,
            "Clouds" => WeatherCondition::Clouds,
            _ => WeatherCondition::Clear,
        }
    }
}

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    Simulated,
}

/// Weather snapshot for one fusion cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherSnapshot {
    pub temperature_c: f64,
    pub rainfall_1h_mm: f64,
    pub rainfall_24h_mm: f64,
    pub rainfall_72h_mm: f64,
    pub max_rain_intensity_mm_per_h: f64,
    pub humidity_pct: f64,
    pub wind_speed_mps: f64,
    pub condition: WeatherCondition,
    pub provenance: Provenance,
    pub fetched_at: DateTime<Utc>,
}

impl WeatherSnapshot {
    /// Dry, still, clear weather
    pub fn calm() -> Self {
        Self {
            temperature_c: 25.0,
            rainfall_1h_mm: 0.0,
            rainfall_24h_mm: 0.0,
            rainfall_72h_mm: 0.0,
            max_rain_intensity_mm_per_h: 0.0,
            humidity_pct: 0.0,
            wind_speed_mps: 0.0,
            condition: WeatherCondition::Clear,
            provenance: Provenance::Simulated,
            fetched_at: Utc::now(),
        }
    }

    /// Synthetic snapshot drawn from plausible ranges for the site
    pub fn simulated<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let intensity = round2(rng.gen_range(0.0..=25.0));
        let condition = WeatherCondition::ALL[rng.gen_range(0..WeatherCondition::ALL.len())];

        Self {
            temperature_c: rng.gen_range(25.0..=35.0),
            rainfall_1h_mm: round2(rng.gen::<f64>() * intensity),
            rainfall_24h_mm: round2(rng.gen_range(0.0..=50.0)),
            rainfall_72h_mm: round2(rng.gen_range(0.0..=120.0)),
            max_rain_intensity_mm_per_h: intensity,
            humidity_pct: rng.gen_range(60.0..=90.0),
            wind_speed_mps: rng.gen_range(5.0..=20.0),
            condition,
            provenance: Provenance::Simulated,
            fetched_at: Utc::now(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn synthetic() -> WeatherSnapshot {
    WeatherSnapshot::simulated(&mut rand::thread_rng())
}

/// Source of weather snapshots. Never fails; degraded sources fall back
/// to a simulated snapshot and say so in its provenance.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn get_weather(&self) -> WeatherSnapshot;
}

/// Always returns the same snapshot
pub struct FixedWeather {
    snapshot: WeatherSnapshot,
}

impl FixedWeather {
    pub fn new(snapshot: WeatherSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl WeatherProvider for FixedWeather {
    async fn get_weather(&self) -> WeatherSnapshot {
        self.snapshot.clone()
    }
}

/// Synthetic weather only
pub struct SimulatedWeather;

#[async_trait]
impl WeatherProvider for SimulatedWeather {
    async fn get_weather(&self) -> WeatherSnapshot {
        synthetic()
    }
}

// ============================================================================
// Forecast feed (5 day / 3 hour buckets)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastBucket>,
}

#[derive(Debug, Deserialize)]
struct ForecastBucket {
    main: MainBlock,
    #[serde(default)]
    wind: Option<WindBlock>,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
    #[serde(default)]
    rain: Option<RainBlock>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    main: String,
}

#[derive(Debug, Deserialize)]
struct RainBlock {
    #[serde(rename = "3h", default)]
    three_hour: f64,
}

impl ForecastBucket {
    fn rain_mm(&self) -> f64 {
        self.rain.as_ref().map(|r| r.three_hour).unwrap_or(0.0)
    }
}

/// Total rain over the buckets covering the first `hours` of the feed
fn sum_rain(buckets: &[ForecastBucket], hours: u32) -> f64 {
    let steps = (hours / BUCKET_HOURS) as usize;
    round2(buckets.iter().take(steps).map(ForecastBucket::rain_mm).sum())
}

/// Peak hourly rate across the whole feed
fn max_intensity(buckets: &[ForecastBucket]) -> f64 {
    let peak = buckets
        .iter()
        .map(|b| b.rain_mm() / BUCKET_HOURS as f64)
        .fold(0.0, f64::max);
    round2(peak)
}

/// Aggregate a forecast feed body into a live snapshot
pub fn parse_forecast(body: &str) -> Result<WeatherSnapshot> {
    let forecast: ForecastResponse =
        serde_json::from_str(body).map_err(|e| RiskError::MalformedWeather(e.to_string()))?;

    let current = forecast
        .list
        .first()
        .ok_or_else(|| RiskError::MalformedWeather("forecast list is empty".to_string()))?;

    let condition = current
        .weather
        .first()
        .map(|c| WeatherCondition::from_feed(&c.main))
        .unwrap_or(WeatherCondition::Clear);

    Ok(WeatherSnapshot {
        temperature_c: current.main.temp,
        rainfall_1h_mm: round2(current.rain_mm() / BUCKET_HOURS as f64),
        rainfall_24h_mm: sum_rain(&forecast.list, 24),
        rainfall_72h_mm: sum_rain(&forecast.list, 72),
        max_rain_intensity_mm_per_h: max_intensity(&forecast.list),
        humidity_pct: current.main.humidity,
        wind_speed_mps: current.wind.as_ref().map(|w| w.speed).unwrap_or(0.0),
        condition,
        provenance: Provenance::Live,
        fetched_at: Utc::now(),
    })
}

/// OpenWeatherMap forecast client with synthetic fallback
pub struct OpenWeatherProvider {
    client: reqwest::Client,
    location: GeoPoint,
    api_key: Option<String>,
    timeout: Duration,
    base_url: String,
}

impl OpenWeatherProvider {
    pub fn new(location: GeoPoint, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            location,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
            base_url: OPENWEATHER_FORECAST_URL.to_string(),
        }
    }

    /// Point the provider at another forecast endpoint
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub fn location(&self) -> GeoPoint {
        self.location
    }

    async fn fetch_live(&self, api_key: &str) -> Result<WeatherSnapshot> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", self.location.lat.to_string()),
                ("lon", self.location.lon.to_string()),
                ("appid", api_key.to_string()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RiskError::WeatherStatus(status.as_u16()));
        }

        let body = response.text().await?;
        parse_forecast(&body)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn get_weather(&self) -> WeatherSnapshot {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!("No weather API key configured, using simulated weather");
            return synthetic();
        };

        match tokio::time::timeout(self.timeout, self.fetch_live(api_key)).await {
            Ok(Ok(snapshot)) => {
                tracing::debug!(
                    "Live weather fetched for ({:.4}, {:.4})",
                    self.location.lat,
                    self.location.lon
                );
                snapshot
            }
            Ok(Err(e)) => {
                tracing::warn!("Weather feed error: {}, using simulated weather", e);
                synthetic()
            }
            Err(_) => {
                tracing::warn!(
                    "Weather feed timed out after {:?}, using simulated weather",
                    self.timeout
                );
                synthetic()
            }
        }
    }
}
