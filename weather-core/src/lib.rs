//! Core library for the weather aggregation service.
//!
//! This crate defines:
//! - Shared domain models (readings, forecast series)
//! - The capability traits every weather source implements
//! - Composable decorators adding rate limiting and caching to any source
//! - The collector that continuously refreshes every (source, location) pair
//! - In-memory stores holding the latest value per key
//! - Configuration & credentials handling
//!
//! It is used by the `weather-service` binary, but can also be reused by
//! other binaries or services.

pub mod cache;
pub mod collector;
pub mod config;
pub mod model;
pub mod provider;
pub mod rate_limit;
pub mod store;

pub use cache::{CacheStats, Cached};
pub use collector::{CollectError, Collector, CollectorHandle};
pub use config::Config;
pub use model::{ForecastPoint, ForecastSeries, WeatherReading};
pub use provider::{ForecastProvider, Provider, ProviderError, ProviderId, WeatherProvider};
pub use rate_limit::{RateLimitConfig, RateLimited};
pub use store::{ForecastStore, WeatherStore};
