use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::model::{ForecastPoint, ForecastSeries, WeatherReading};

use super::{ForecastProvider, Provider, ProviderError, WeatherProvider};

const BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// OpenWeatherMap's forecast endpoint returns 3-hourly steps, 8 per day.
const ENTRIES_PER_DAY: usize = 8;

/// Client for `api.openweathermap.org`. Implements both capabilities.
///
/// Requests use `units=metric`, so temperatures arrive in °C and wind speeds
/// in m/s with no further conversion.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: Client,
}

impl OpenWeatherProvider {
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

impl Provider for OpenWeatherProvider {
    fn name(&self) -> String {
        "OpenWeatherMap".to_string()
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch_current(&self, location: &str) -> Result<WeatherReading, ProviderError> {
        let url = format!("{BASE_URL}/weather");
        let parsed: OwCurrentResponse = self
            .get_json(
                &url,
                &[
                    ("q", location),
                    ("appid", self.api_key.as_str()),
                    ("units", "metric"),
                ],
            )
            .await?;

        Ok(current_to_reading(&self.name(), parsed))
    }
}

#[async_trait]
impl ForecastProvider for OpenWeatherProvider {
    async fn fetch_forecast(
        &self,
        location: &str,
        days: u32,
    ) -> Result<ForecastSeries, ProviderError> {
        let url = format!("{BASE_URL}/forecast");
        let parsed: OwForecastResponse = self
            .get_json(
                &url,
                &[
                    ("q", location),
                    ("appid", self.api_key.as_str()),
                    ("units", "metric"),
                ],
            )
            .await?;

        Ok(forecast_to_series(&self.name(), parsed, days))
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
    #[serde(default)]
    deg: i32,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    #[serde(default)]
    sys: Option<OwSys>,
}

#[derive(Debug, Deserialize)]
struct OwCity {
    name: String,
    country: String,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    city: OwCity,
    list: Vec<OwForecastEntry>,
}

fn current_to_reading(provider: &str, parsed: OwCurrentResponse) -> WeatherReading {
    let (description, icon) = first_condition(&parsed.weather);

    let location = match parsed.sys {
        Some(sys) if !sys.country.is_empty() => format!("{},{}", parsed.name, sys.country),
        _ => parsed.name,
    };

    WeatherReading {
        provider: provider.to_string(),
        location,
        temperature_c: parsed.main.temp,
        humidity_pct: parsed.main.humidity,
        wind_speed_mps: parsed.wind.speed,
        wind_deg: parsed.wind.deg,
        pressure_hpa: parsed.main.pressure,
        description,
        icon,
        timestamp: unix_to_utc(parsed.dt).unwrap_or_else(Utc::now),
    }
}

fn forecast_to_series(provider: &str, parsed: OwForecastResponse, days: u32) -> ForecastSeries {
    let max_entries = (days as usize * ENTRIES_PER_DAY).min(parsed.list.len());

    let points = parsed
        .list
        .into_iter()
        .take(max_entries)
        .map(|entry| {
            let (description, icon) = first_condition(&entry.weather);
            ForecastPoint {
                temperature_c: entry.main.temp,
                humidity_pct: entry.main.humidity,
                wind_speed_mps: entry.wind.speed,
                wind_deg: entry.wind.deg,
                pressure_hpa: entry.main.pressure,
                description,
                icon,
                timestamp: unix_to_utc(entry.dt).unwrap_or_else(Utc::now),
            }
        })
        .collect();

    ForecastSeries {
        provider: provider.to_string(),
        location: format!("{},{}", parsed.city.name, parsed.city.country),
        points,
        updated: Utc::now(),
    }
}

fn first_condition(weather: &[OwWeather]) -> (String, String) {
    weather
        .first()
        .map(|w| (w.description.clone(), w.icon.clone()))
        .unwrap_or_default()
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        format!("{}...", &body[..MAX])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURRENT_JSON: &str = r#"{
        "name": "London",
        "dt": 1700000000,
        "main": { "temp": 11.5, "humidity": 82, "pressure": 1013 },
        "weather": [ { "description": "light rain", "icon": "10d" } ],
        "wind": { "speed": 4.1, "deg": 250 },
        "sys": { "country": "GB" }
    }"#;

    const FORECAST_JSON: &str = r#"{
        "city": { "name": "London", "country": "GB" },
        "list": [
            {
                "dt": 1700010800,
                "main": { "temp": 10.0, "humidity": 80, "pressure": 1012 },
                "weather": [ { "description": "overcast clouds", "icon": "04d" } ],
                "wind": { "speed": 3.2, "deg": 240 }
            },
            {
                "dt": 1700021600,
                "main": { "temp": 9.5, "humidity": 85, "pressure": 1011 },
                "weather": [],
                "wind": { "speed": 2.8, "deg": 230 }
            }
        ]
    }"#;

    #[test]
    fn decodes_current_response() {
        let parsed: OwCurrentResponse = serde_json::from_str(CURRENT_JSON).unwrap();
        let reading = current_to_reading("OpenWeatherMap", parsed);

        assert_eq!(reading.provider, "OpenWeatherMap");
        assert_eq!(reading.location, "London,GB");
        assert_eq!(reading.temperature_c, 11.5);
        assert_eq!(reading.humidity_pct, 82.0);
        assert_eq!(reading.wind_speed_mps, 4.1);
        assert_eq!(reading.wind_deg, 250);
        assert_eq!(reading.pressure_hpa, 1013.0);
        assert_eq!(reading.description, "light rain");
        assert_eq!(reading.icon, "10d");
        assert_eq!(reading.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn forecast_clamps_to_requested_days() {
        let parsed: OwForecastResponse = serde_json::from_str(FORECAST_JSON).unwrap();
        // One day would allow 8 entries, but only 2 are present.
        let series = forecast_to_series("OpenWeatherMap", parsed, 1);

        assert_eq!(series.location, "London,GB");
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[0].description, "overcast clouds");
        // Missing weather array maps to empty condition, not an error.
        assert_eq!(series.points[1].description, "");
    }

    #[test]
    fn truncates_long_error_bodies() {
        let long = "x".repeat(500);
        let truncated = truncate_body(&long);
        assert!(truncated.len() < 250);
        assert!(truncated.ends_with("..."));
    }
}
