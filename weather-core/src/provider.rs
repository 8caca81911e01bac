use crate::model::{ForecastSeries, WeatherReading};
use async_trait::async_trait;
use std::convert::TryFrom;

pub mod openweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeatherMap,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeatherMap => "openweathermap",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeatherMap, ProviderId::WeatherApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweathermap" => Ok(ProviderId::OpenWeatherMap),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweathermap, weatherapi."
            )),
        }
    }
}

/// Errors surfaced by provider fetches and the decorators around them.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure before any response arrived.
    #[error("{provider}: request failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream API answered with a non-success status.
    #[error("{provider}: upstream returned status {status}: {body}")]
    UpstreamStatus {
        provider: String,
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("{provider}: failed to decode response: {source}")]
    Decode {
        provider: String,
        #[source]
        source: serde_json::Error,
    },

    /// The caller's cancellation signal fired while waiting for a rate-limit
    /// token. No upstream call was made.
    #[error("{provider}: rate limit wait cancelled")]
    RateLimitCancelled { provider: String },
}

/// Base capability: every source exposes a stable display name, used as the
/// cache/store/log key. Supertrait of both fetch capabilities so a type
/// implementing both defines its name exactly once.
pub trait Provider: Send + Sync {
    fn name(&self) -> String;
}

/// Capability to fetch current weather for a location.
#[async_trait]
pub trait WeatherProvider: Provider {
    /// Fetch the current conditions for `location`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] on transport failure, a non-success
    /// upstream status, or a body that fails to decode.
    async fn fetch_current(&self, location: &str) -> Result<WeatherReading, ProviderError>;
}

/// Capability to fetch a multi-day forecast for a location.
#[async_trait]
pub trait ForecastProvider: Provider {
    /// Fetch a forecast covering up to `days` days.
    ///
    /// `days` is a request hint: providers may clamp it to the range their
    /// plan supports and return fewer days than asked for.
    ///
    /// # Errors
    ///
    /// Same failure kinds as [`WeatherProvider::fetch_current`].
    async fn fetch_forecast(
        &self,
        location: &str,
        days: u32,
    ) -> Result<ForecastSeries, ProviderError>;
}
