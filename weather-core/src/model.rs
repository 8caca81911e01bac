use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single point-in-time observation from one provider.
///
/// All values are normalized before construction: temperature in °C, wind
/// speed in m/s, pressure in hPa. Immutable once built; stores replace whole
/// readings, never patch fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReading {
    pub provider: String,
    pub location: String,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_mps: f64,
    pub wind_deg: i32,
    pub pressure_hpa: f64,
    pub description: String,
    pub icon: String,
    pub timestamp: DateTime<Utc>,
}

/// One forecast point: the same fields as a reading, for a future timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_mps: f64,
    pub wind_deg: i32,
    pub pressure_hpa: f64,
    pub description: String,
    pub icon: String,
    pub timestamp: DateTime<Utc>,
}

/// An ordered forecast series from one provider for one location.
///
/// Replaced wholesale on refresh; `updated` marks when the series was fetched
/// and drives age-based pruning in the forecast store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub provider: String,
    pub location: String,
    pub points: Vec<ForecastPoint>,
    pub updated: DateTime<Utc>,
}
