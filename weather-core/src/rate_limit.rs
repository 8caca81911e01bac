//! Token-bucket rate limiting for provider capabilities.
//!
//! [`RateLimited`] wraps any provider and throttles outbound calls to a
//! sustained rate with a bounded burst. Each capability gets its own bucket,
//! so weather and forecast quotas can differ (upstream free tiers meter the
//! two endpoints separately). Whether the wrapper offers a capability is
//! decided by the trait system: `RateLimited<S>` implements
//! [`WeatherProvider`] only when `S` does, and likewise for forecasts.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;

use crate::model::{ForecastSeries, WeatherReading};
use crate::provider::{ForecastProvider, Provider, ProviderError, WeatherProvider};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Admission policy for one wrapped provider.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Sustained current-weather requests per second. Fractional rates are
    /// allowed (0.4 means one request every 2.5 seconds).
    pub weather_rps: f64,
    /// Sustained forecast requests per second.
    pub forecast_rps: f64,
    /// Maximum calls that may proceed without waiting; refilled at the
    /// sustained rate.
    pub burst: u32,
}

/// Decorator that makes every call acquire a token before it reaches the
/// wrapped provider. While a caller waits for a token it also watches the
/// shutdown signal handed in at construction; cancellation wins and yields
/// [`ProviderError::RateLimitCancelled`] with no upstream call.
pub struct RateLimited<S> {
    inner: S,
    weather_limiter: DirectLimiter,
    forecast_limiter: DirectLimiter,
    shutdown: CancellationToken,
}

impl<S: Provider> RateLimited<S> {
    /// Wrap `inner` with the given admission policy.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is unusable: a non-positive or non-finite
    /// rate, or a burst of zero. These are configuration errors, reported at
    /// construction rather than on the fetch path.
    pub fn new(
        inner: S,
        config: RateLimitConfig,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            weather_limiter: RateLimiter::direct(quota(config.weather_rps, config.burst)?),
            forecast_limiter: RateLimiter::direct(quota(config.forecast_rps, config.burst)?),
            inner,
            shutdown,
        })
    }

    async fn acquire(&self, limiter: &DirectLimiter) -> Result<(), ProviderError> {
        tokio::select! {
            // Checked first so a fired shutdown always beats an available token.
            biased;
            () = self.shutdown.cancelled() => Err(ProviderError::RateLimitCancelled {
                provider: self.inner.name(),
            }),
            _ = limiter.until_ready() => Ok(()),
        }
    }
}

fn quota(rps: f64, burst: u32) -> anyhow::Result<Quota> {
    anyhow::ensure!(
        rps.is_finite() && rps > 0.0,
        "rate limit must be a positive requests-per-second value, got {rps}"
    );
    let burst = NonZeroU32::new(burst).context("rate limit burst must be at least 1")?;
    let period = Duration::from_secs_f64(1.0 / rps);
    let quota = Quota::with_period(period).context("rate limit period out of range")?;
    Ok(quota.allow_burst(burst))
}

impl<S: Provider> Provider for RateLimited<S> {
    fn name(&self) -> String {
        format!("{} [Rate Limited]", self.inner.name())
    }
}

#[async_trait]
impl<S: WeatherProvider> WeatherProvider for RateLimited<S> {
    async fn fetch_current(&self, location: &str) -> Result<WeatherReading, ProviderError> {
        self.acquire(&self.weather_limiter).await?;
        self.inner.fetch_current(location).await
    }
}

#[async_trait]
impl<S: ForecastProvider> ForecastProvider for RateLimited<S> {
    async fn fetch_forecast(
        &self,
        location: &str,
        days: u32,
    ) -> Result<ForecastSeries, ProviderError> {
        self.acquire(&self.forecast_limiter).await?;
        self.inner.fetch_forecast(location, days).await
    }
}
