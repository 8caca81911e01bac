use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use weather_core::config::ProviderSettings;
use weather_core::provider::openweather::OpenWeatherProvider;
use weather_core::provider::weatherapi::WeatherApiProvider;
use weather_core::{
    Cached, Collector, Config, ForecastProvider, ForecastStore, Provider, ProviderId, RateLimited,
    WeatherProvider, WeatherStore,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-service", version, about = "Weather aggregation service")]
pub struct Cli {
    /// Path to the TOML configuration file (defaults to the platform config directory).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the weather collection refresh interval, in seconds.
    #[arg(long)]
    pub refresh: Option<u64>,

    /// Disable outbound rate limiting (useful against local stubs).
    #[arg(long)]
    pub no_rate_limit: bool,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = Config::load(self.config.as_deref())?;
        config.apply_env_overrides();
        if let Some(secs) = self.refresh {
            config.collector.refresh_interval_secs = secs;
        }
        config.validate()?;

        let shutdown = CancellationToken::new();

        let mut weather_sources: Vec<Arc<dyn WeatherProvider>> = Vec::new();
        let mut forecast_sources: Vec<Arc<dyn ForecastProvider>> = Vec::new();

        for id in config.enabled_providers() {
            let Some(settings) = config.provider_settings(id) else {
                continue;
            };
            match id {
                ProviderId::OpenWeatherMap => register(
                    OpenWeatherProvider::new(settings.api_key.clone()),
                    settings,
                    self.no_rate_limit,
                    &shutdown,
                    config.cache.validity(),
                    &mut weather_sources,
                    &mut forecast_sources,
                )?,
                ProviderId::WeatherApi => register(
                    WeatherApiProvider::new(settings.api_key.clone()),
                    settings,
                    self.no_rate_limit,
                    &shutdown,
                    config.cache.validity(),
                    &mut weather_sources,
                    &mut forecast_sources,
                )?,
            }
            info!(provider = %id, rate_limited = !self.no_rate_limit, "provider enabled");
        }

        let weather_store = Arc::new(WeatherStore::new());
        let forecast_store = Arc::new(ForecastStore::new());

        let collector = Collector::new(weather_sources, config.locations.clone())
            .with_refresh_interval(config.collector.refresh_interval())
            .with_fetch_timeout(config.collector.fetch_timeout());
        let (collector_handle, mut readings, mut errors) = collector.start(&shutdown);

        let mut workers = JoinSet::new();

        // Drain collected readings into the weather store.
        {
            let store = weather_store.clone();
            workers.spawn(async move {
                while let Some(reading) = readings.recv().await {
                    debug!(provider = %reading.provider, location = %reading.location, "reading stored");
                    store.update(reading);
                }
            });
        }

        // Surface collection errors in the log.
        workers.spawn(async move {
            while let Some(err) = errors.recv().await {
                warn!(error = %err, "collection error");
            }
        });

        {
            let sources = forecast_sources.clone();
            let store = forecast_store.clone();
            let cancel = shutdown.clone();
            let locations = config.locations.clone();
            let days = config.forecast.days;
            let interval = config.forecast.refresh_interval();
            let timeout = config.collector.fetch_timeout();
            workers.spawn(async move {
                forecast_refresh_loop(sources, locations, days, interval, timeout, store, cancel)
                    .await;
            });
        }

        {
            let store = forecast_store.clone();
            let cancel = shutdown.clone();
            let max_age = config.forecast.max_age();
            let every = config.forecast.prune_interval();
            workers.spawn(async move { prune_loop(store, max_age, every, cancel).await });
        }

        info!(
            locations = config.locations.len(),
            "weather service running, press Ctrl-C to stop"
        );
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("shutdown signal received");

        shutdown.cancel();
        collector_handle.stop().await;
        while workers.join_next().await.is_some() {}

        info!("weather service stopped");
        Ok(())
    }
}

/// Decorate a concrete provider and register it under both capabilities.
///
/// The same decorated instance backs both handles, so the weather and
/// forecast paths share one rate limiter and one cache.
fn register<P>(
    provider: P,
    settings: &ProviderSettings,
    no_rate_limit: bool,
    shutdown: &CancellationToken,
    cache_validity: Duration,
    weather: &mut Vec<Arc<dyn WeatherProvider>>,
    forecasts: &mut Vec<Arc<dyn ForecastProvider>>,
) -> Result<()>
where
    P: WeatherProvider + ForecastProvider + 'static,
{
    if no_rate_limit {
        let cached = Arc::new(Cached::new(provider, cache_validity));
        weather.push(cached.clone());
        forecasts.push(cached);
    } else {
        let limited = RateLimited::new(provider, settings.rate_limit(), shutdown.child_token())?;
        let cached = Arc::new(Cached::new(limited, cache_validity));
        weather.push(cached.clone());
        forecasts.push(cached);
    }
    Ok(())
}

/// Periodically refresh forecasts for every (source, location) pair into the
/// forecast store. Failures are logged and skipped; the next tick retries.
async fn forecast_refresh_loop(
    sources: Vec<Arc<dyn ForecastProvider>>,
    locations: Vec<String>,
    days: u32,
    interval: Duration,
    fetch_timeout: Duration,
    store: Arc<ForecastStore>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {
                for source in &sources {
                    for location in &locations {
                        let fetched = tokio::select! {
                            res = tokio::time::timeout(fetch_timeout, source.fetch_forecast(location, days)) => res,
                            () = cancel.cancelled() => return,
                        };
                        match fetched {
                            Ok(Ok(series)) => {
                                debug!(provider = %series.provider, location = %series.location, "forecast stored");
                                store.update(series);
                            }
                            Ok(Err(err)) => warn!(error = %err, "forecast fetch failed"),
                            Err(_) => warn!(
                                provider = %source.name(),
                                %location,
                                "forecast fetch timed out"
                            ),
                        }
                    }
                }
            }
        }
    }
}

/// Periodically drop forecast entries older than `max_age`.
async fn prune_loop(
    store: Arc<ForecastStore>,
    max_age: chrono::Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let removed = store.prune_older_than(max_age);
                if removed > 0 {
                    info!(removed, "pruned stale forecasts");
                }
            }
        }
    }
}
