use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::provider::ProviderId;
use crate::rate_limit::RateLimitConfig;

/// Settings for a single upstream provider.
///
/// The rate defaults mirror the upstream free tiers; see [`Config::default`]
/// for the per-provider values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_rps")]
    pub weather_rps: f64,
    #[serde(default = "default_rps")]
    pub forecast_rps: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_rps() -> f64 {
    1.0
}

fn default_burst() -> u32 {
    5
}

impl ProviderSettings {
    fn disabled(weather_rps: f64, forecast_rps: f64, burst: u32) -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            weather_rps,
            forecast_rps,
            burst,
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            weather_rps: self.weather_rps,
            forecast_rps: self.forecast_rps,
            burst: self.burst,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    pub refresh_interval_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 15 * 60,
            fetch_timeout_secs: 10,
        }
    }
}

impl CollectorSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub validity_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { validity_secs: 300 }
    }
}

impl CacheSettings {
    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastSettings {
    /// Day count requested from providers; individual providers may clamp it.
    pub days: u32,
    pub refresh_interval_secs: u64,
    pub max_age_secs: u64,
    pub prune_interval_secs: u64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            days: 3,
            refresh_interval_secs: 30 * 60,
            max_age_secs: 6 * 3600,
            prune_interval_secs: 3600,
        }
    }
}

impl ForecastSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_age_secs as i64)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

/// Top-level configuration stored on disk as TOML.
///
/// Example:
/// ```toml
/// locations = ["London,UK", "Berlin,DE"]
///
/// [providers.openweathermap]
/// enabled = true
/// api_key = "..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub locations: Vec<String>,
    pub providers: HashMap<String, ProviderSettings>,
    pub collector: CollectorSettings,
    pub cache: CacheSettings,
    pub forecast: ForecastSettings,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();
        // OpenWeatherMap free tier: 60 calls/minute, generous burst.
        providers.insert(
            ProviderId::OpenWeatherMap.as_str().to_string(),
            ProviderSettings::disabled(1.0, 1.0, 5),
        );
        // WeatherAPI free tier: roughly 23 calls/minute.
        providers.insert(
            ProviderId::WeatherApi.as_str().to_string(),
            ProviderSettings::disabled(0.4, 0.4, 3),
        );

        Self {
            locations: vec![
                "London,UK".to_string(),
                "New York,US".to_string(),
                "Tokyo,JP".to_string(),
            ],
            providers,
            collector: CollectorSettings::default(),
            cache: CacheSettings::default(),
            forecast: ForecastSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the platform config directory
    /// when no path is given. A missing default file yields `Config::default()`
    /// (first run); a missing explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(explicit) => explicit.to_path_buf(),
            None => {
                let default = Self::config_file_path()?;
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-service", "weather-service")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Override API keys from the environment: `OPENWEATHERMAP_API_KEY`,
    /// `WEATHERAPI_API_KEY`. Environment wins over the file so secrets can
    /// stay out of it.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for id in ProviderId::all() {
            let var = format!("{}_API_KEY", id.as_str().to_uppercase());
            if let Some(key) = lookup(&var) {
                if let Some(settings) = self.providers.get_mut(id.as_str()) {
                    settings.api_key = key;
                }
            }
        }
    }

    pub fn provider_settings(&self, id: ProviderId) -> Option<&ProviderSettings> {
        self.providers.get(id.as_str())
    }

    /// Enabled providers in the stable [`ProviderId::all`] order.
    pub fn enabled_providers(&self) -> Vec<ProviderId> {
        ProviderId::all()
            .iter()
            .copied()
            .filter(|id| {
                self.provider_settings(*id)
                    .is_some_and(|settings| settings.enabled)
            })
            .collect()
    }

    /// Reject configurations the service cannot start with: unknown provider
    /// names (typos), an enabled provider without an API key, or no enabled
    /// provider at all.
    pub fn validate(&self) -> Result<()> {
        for name in self.providers.keys() {
            ProviderId::try_from(name.as_str())
                .with_context(|| format!("Unknown provider '{name}' in [providers] section"))?;
        }

        for id in self.enabled_providers() {
            let settings = self
                .provider_settings(id)
                .ok_or_else(|| anyhow!("missing settings for provider '{id}'"))?;
            if settings.api_key.trim().is_empty() {
                return Err(anyhow!(
                    "Provider '{id}' is enabled but has no API key.\n\
                     Hint: set it in the config file or export {}_API_KEY.",
                    id.as_str().to_uppercase()
                ));
            }
        }

        if self.enabled_providers().is_empty() {
            return Err(anyhow!("No weather providers enabled in configuration"));
        }

        if self.locations.is_empty() {
            return Err(anyhow!("No locations configured"));
        }

        // Zero-length tickers are never meaningful and panic at runtime.
        anyhow::ensure!(
            self.collector.refresh_interval_secs > 0
                && self.forecast.refresh_interval_secs > 0
                && self.forecast.prune_interval_secs > 0,
            "refresh and prune intervals must be at least 1 second"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_both_known_providers() {
        let cfg = Config::default();

        for id in ProviderId::all() {
            let settings = cfg.provider_settings(*id).expect("settings must exist");
            assert!(!settings.enabled);
        }
        assert_eq!(cfg.locations.len(), 3);
        assert!(cfg.enabled_providers().is_empty());
    }

    #[test]
    fn partial_toml_fills_remaining_fields_from_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            locations = ["Berlin,DE"]

            [providers.openweathermap]
            enabled = true
            api_key = "KEY"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.locations, vec!["Berlin,DE".to_string()]);
        assert_eq!(cfg.collector.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.forecast.days, 3);

        let owm = cfg.provider_settings(ProviderId::OpenWeatherMap).unwrap();
        assert!(owm.enabled);
        assert_eq!(owm.weather_rps, 1.0);
        assert_eq!(cfg.enabled_providers(), vec![ProviderId::OpenWeatherMap]);
    }

    #[test]
    fn env_override_replaces_file_api_key() {
        let mut cfg = Config::default();
        cfg.apply_overrides_from(|name| {
            (name == "WEATHERAPI_API_KEY").then(|| "FROM_ENV".to_string())
        });

        let wapi = cfg.provider_settings(ProviderId::WeatherApi).unwrap();
        assert_eq!(wapi.api_key, "FROM_ENV");

        let owm = cfg.provider_settings(ProviderId::OpenWeatherMap).unwrap();
        assert_eq!(owm.api_key, "");
    }

    #[test]
    fn validate_rejects_enabled_provider_without_key() {
        let mut cfg = Config::default();
        cfg.providers
            .get_mut(ProviderId::OpenWeatherMap.as_str())
            .unwrap()
            .enabled = true;

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("no API key"));
    }

    #[test]
    fn validate_rejects_unknown_provider_names() {
        let mut cfg = Config::default();
        cfg.providers.insert(
            "openwether".to_string(),
            ProviderSettings::disabled(1.0, 1.0, 1),
        );

        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_at_least_one_enabled_provider() {
        let cfg = Config::default();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("No weather providers enabled"));
    }

    #[test]
    fn validate_accepts_a_usable_configuration() {
        let mut cfg = Config::default();
        let owm = cfg
            .providers
            .get_mut(ProviderId::OpenWeatherMap.as_str())
            .unwrap();
        owm.enabled = true;
        owm.api_key = "KEY".to_string();

        assert!(cfg.validate().is_ok());
    }
}
