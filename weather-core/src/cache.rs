//! Time-boxed memoization for provider capabilities.
//!
//! [`Cached`] wraps any provider and answers repeat calls from memory while
//! the entry is younger than the validity window. Entries are keyed by
//! location for current weather and by `location:days` for forecasts, since
//! the forecast payload shape depends on the requested day count.
//!
//! Lookups happen under a read lock; the upstream call happens outside any
//! lock, so two concurrent callers missing on the same key may both fetch.
//! That duplicate fetch is accepted behavior, not deduplicated.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::model::{ForecastSeries, WeatherReading};
use crate::provider::{ForecastProvider, Provider, ProviderError, WeatherProvider};

struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

/// One capability's entry map plus its hit/miss counters, behind one lock so
/// a reader never sees counters and entries out of step.
struct CacheShard<T> {
    entries: HashMap<String, CacheEntry<T>>,
    hits: u64,
    misses: u64,
}

impl<T> Default for CacheShard<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

/// Monotonic hit/miss totals across both capabilities of one decorator
/// instance. Never reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Decorator that memoizes successful results for a fixed validity window.
/// Upstream failures propagate unchanged and are never cached.
pub struct Cached<S> {
    inner: S,
    validity: Duration,
    weather: RwLock<CacheShard<WeatherReading>>,
    forecast: RwLock<CacheShard<ForecastSeries>>,
}

impl<S> Cached<S> {
    pub fn new(inner: S, validity: Duration) -> Self {
        Self {
            inner,
            validity,
            weather: RwLock::new(CacheShard::default()),
            forecast: RwLock::new(CacheShard::default()),
        }
    }

    /// Hit/miss totals for this instance.
    pub fn stats(&self) -> CacheStats {
        let weather = self.weather.read();
        let forecast = self.forecast.read();
        CacheStats {
            hits: weather.hits + forecast.hits,
            misses: weather.misses + forecast.misses,
        }
    }
}

/// Look up `key`, classify the access, and return the value when it is still
/// inside the validity window. An entry whose age has reached `validity` is
/// never returned.
fn lookup<T: Clone>(shard: &RwLock<CacheShard<T>>, key: &str, validity: Duration) -> Option<T> {
    let fresh = {
        let guard = shard.read();
        guard
            .entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < validity)
            .map(|entry| entry.value.clone())
    };

    let mut guard = shard.write();
    if fresh.is_some() {
        guard.hits += 1;
    } else {
        guard.misses += 1;
    }
    fresh
}

fn store<T>(shard: &RwLock<CacheShard<T>>, key: String, value: T) {
    shard.write().entries.insert(
        key,
        CacheEntry {
            value,
            fetched_at: Instant::now(),
        },
    );
}

impl<S: Provider> Provider for Cached<S> {
    fn name(&self) -> String {
        format!("{} [Cached]", self.inner.name())
    }
}

#[async_trait]
impl<S: WeatherProvider> WeatherProvider for Cached<S> {
    async fn fetch_current(&self, location: &str) -> Result<WeatherReading, ProviderError> {
        if let Some(reading) = lookup(&self.weather, location, self.validity) {
            debug!(provider = %self.inner.name(), location, "weather cache hit");
            return Ok(reading);
        }

        debug!(provider = %self.inner.name(), location, "weather cache miss");
        let fresh = self.inner.fetch_current(location).await?;
        store(&self.weather, location.to_string(), fresh.clone());
        Ok(fresh)
    }
}

#[async_trait]
impl<S: ForecastProvider> ForecastProvider for Cached<S> {
    async fn fetch_forecast(
        &self,
        location: &str,
        days: u32,
    ) -> Result<ForecastSeries, ProviderError> {
        let key = format!("{location}:{days}");

        if let Some(series) = lookup(&self.forecast, &key, self.validity) {
            debug!(provider = %self.inner.name(), location, days, "forecast cache hit");
            return Ok(series);
        }

        debug!(provider = %self.inner.name(), location, days, "forecast cache miss");
        let fresh = self.inner.fetch_forecast(location, days).await?;
        store(&self.forecast, key, fresh.clone());
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockSource {
        calls: Arc<AtomicUsize>,
        fail: AtomicBool,
    }

    impl MockSource {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: calls.clone(),
                    fail: AtomicBool::new(false),
                },
                calls,
            )
        }

        fn failing() -> (Self, Arc<AtomicUsize>) {
            let (source, calls) = Self::new();
            source.fail.store(true, Ordering::SeqCst);
            (source, calls)
        }

        fn error(&self) -> ProviderError {
            ProviderError::UpstreamStatus {
                provider: self.name(),
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: "boom".to_string(),
            }
        }
    }

    impl Provider for MockSource {
        fn name(&self) -> String {
            "Mock".to_string()
        }
    }

    #[async_trait]
    impl WeatherProvider for MockSource {
        async fn fetch_current(&self, location: &str) -> Result<WeatherReading, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(self.error());
            }
            Ok(WeatherReading {
                provider: "Mock".to_string(),
                location: location.to_string(),
                temperature_c: 20.0,
                humidity_pct: 40.0,
                wind_speed_mps: 2.0,
                wind_deg: 90,
                pressure_hpa: 1015.0,
                description: "clear".to_string(),
                icon: String::new(),
                timestamp: Utc::now(),
            })
        }
    }

    #[async_trait]
    impl ForecastProvider for MockSource {
        async fn fetch_forecast(
            &self,
            location: &str,
            _days: u32,
        ) -> Result<ForecastSeries, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(self.error());
            }
            Ok(ForecastSeries {
                provider: "Mock".to_string(),
                location: location.to_string(),
                points: Vec::new(),
                updated: Utc::now(),
            })
        }
    }

    #[test]
    fn appends_cached_marker_to_name() {
        let (source, _) = MockSource::new();
        let cached = Cached::new(source, Duration::from_secs(60));
        assert_eq!(cached.name(), "Mock [Cached]");
    }

    #[tokio::test]
    async fn second_read_within_validity_is_a_hit() {
        let (source, calls) = MockSource::new();
        let cached = Cached::new(source, Duration::from_secs(60));

        cached.fetch_current("London,UK").await.unwrap();
        cached.fetch_current("London,UK").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1, "hit must not call upstream");
        assert_eq!(cached.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn expired_entry_triggers_exactly_one_fresh_fetch() {
        let (source, calls) = MockSource::new();
        let cached = Cached::new(source, Duration::from_millis(40));

        cached.fetch_current("London,UK").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        cached.fetch_current("London,UK").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.stats(), CacheStats { hits: 0, misses: 2 });
    }

    #[tokio::test]
    async fn forecast_entries_are_keyed_by_location_and_days() {
        let (source, calls) = MockSource::new();
        let cached = Cached::new(source, Duration::from_secs(60));

        cached.fetch_forecast("Paris,FR", 3).await.unwrap();
        cached.fetch_forecast("Paris,FR", 5).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2, "distinct day counts are distinct keys");

        cached.fetch_forecast("Paris,FR", 3).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.stats(), CacheStats { hits: 1, misses: 2 });
    }

    #[tokio::test]
    async fn failures_propagate_and_are_never_cached() {
        let (source, calls) = MockSource::failing();
        let cached = Cached::new(source, Duration::from_secs(60));

        let first = cached.fetch_current("London,UK").await;
        let second = cached.fetch_current("London,UK").await;

        assert!(matches!(first, Err(ProviderError::UpstreamStatus { .. })));
        assert!(matches!(second, Err(ProviderError::UpstreamStatus { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2, "a failure must not satisfy later reads");
        assert_eq!(cached.stats(), CacheStats { hits: 0, misses: 2 });
    }

    #[tokio::test]
    async fn weather_and_forecast_keys_do_not_collide() {
        let (source, calls) = MockSource::new();
        let cached = Cached::new(source, Duration::from_secs(60));

        cached.fetch_current("Rome,IT").await.unwrap();
        cached.fetch_forecast("Rome,IT", 3).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
