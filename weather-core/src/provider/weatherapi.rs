use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::model::{ForecastPoint, ForecastSeries, WeatherReading};

use super::{ForecastProvider, Provider, ProviderError, WeatherProvider};

const BASE_URL: &str = "https://api.weatherapi.com/v1";

/// The free tier serves at most 3 forecast days; larger requests are clamped,
/// not rejected, to match what the upstream plan actually returns.
const MAX_FREE_TIER_DAYS: u32 = 3;

const KPH_PER_MPS: f64 = 3.6;

/// Client for `api.weatherapi.com`. Implements both capabilities.
///
/// WeatherAPI reports wind in km/h; speeds are normalized to m/s before they
/// enter the core model.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: Client::new(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: self.name(),
                source,
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|source| ProviderError::Transport {
            provider: self.name(),
            source,
        })?;

        if !status.is_success() {
            return Err(ProviderError::UpstreamStatus {
                provider: self.name(),
                status,
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|source| ProviderError::Decode {
            provider: self.name(),
            source,
        })
    }
}

impl Provider for WeatherApiProvider {
    fn name(&self) -> String {
        "WeatherAPI".to_string()
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn fetch_current(&self, location: &str) -> Result<WeatherReading, ProviderError> {
        let url = format!("{BASE_URL}/current.json");
        let parsed: WaCurrentResponse = self
            .get_json(&url, &[("key", self.api_key.as_str()), ("q", location)])
            .await?;

        Ok(current_to_reading(&self.name(), location, parsed))
    }
}

#[async_trait]
impl ForecastProvider for WeatherApiProvider {
    async fn fetch_forecast(
        &self,
        location: &str,
        days: u32,
    ) -> Result<ForecastSeries, ProviderError> {
        let days = days.min(MAX_FREE_TIER_DAYS);

        let url = format!("{BASE_URL}/forecast.json");
        let parsed: WaForecastResponse = self
            .get_json(
                &url,
                &[
                    ("key", self.api_key.as_str()),
                    ("q", location),
                    ("days", days.to_string().as_str()),
                    ("aqi", "no"),
                    ("alerts", "no"),
                ],
            )
            .await?;

        Ok(forecast_to_series(&self.name(), location, parsed))
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct WaLocation {
    name: String,
    country: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct WaCondition {
    text: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    humidity: f64,
    wind_kph: f64,
    #[serde(default)]
    wind_degree: i32,
    pressure_mb: f64,
    #[serde(default)]
    condition: WaCondition,
    #[serde(default)]
    last_updated_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WaCurrentResponse {
    #[serde(default)]
    location: WaLocation,
    current: WaCurrent,
}

#[derive(Debug, Deserialize)]
struct WaHour {
    time_epoch: i64,
    temp_c: f64,
    humidity: f64,
    wind_kph: f64,
    #[serde(default)]
    wind_degree: i32,
    pressure_mb: f64,
    #[serde(default)]
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    hour: Vec<WaHour>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    forecast: WaForecast,
}

fn current_to_reading(provider: &str, requested: &str, parsed: WaCurrentResponse) -> WeatherReading {
    let location = if !parsed.location.name.is_empty() && !parsed.location.country.is_empty() {
        format!("{},{}", parsed.location.name, parsed.location.country)
    } else {
        requested.to_string()
    };

    WeatherReading {
        provider: provider.to_string(),
        location,
        temperature_c: parsed.current.temp_c,
        humidity_pct: parsed.current.humidity,
        wind_speed_mps: parsed.current.wind_kph / KPH_PER_MPS,
        wind_deg: parsed.current.wind_degree,
        pressure_hpa: parsed.current.pressure_mb,
        description: parsed.current.condition.text,
        icon: parsed.current.condition.icon,
        timestamp: parsed
            .current
            .last_updated_epoch
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now),
    }
}

fn forecast_to_series(provider: &str, location: &str, parsed: WaForecastResponse) -> ForecastSeries {
    let points = parsed
        .forecast
        .forecastday
        .into_iter()
        .flat_map(|day| day.hour)
        .map(|hour| ForecastPoint {
            temperature_c: hour.temp_c,
            humidity_pct: hour.humidity,
            wind_speed_mps: hour.wind_kph / KPH_PER_MPS,
            wind_deg: hour.wind_degree,
            pressure_hpa: hour.pressure_mb,
            description: hour.condition.text,
            icon: hour.condition.icon,
            timestamp: DateTime::from_timestamp(hour.time_epoch, 0).unwrap_or_else(Utc::now),
        })
        .collect();

    ForecastSeries {
        provider: provider.to_string(),
        location: location.to_string(),
        points,
        updated: Utc::now(),
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        format!("{}...", &body[..MAX])
    } else {
        body.to_string()
    }
}
