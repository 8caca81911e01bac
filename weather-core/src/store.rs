//! In-memory registries for the latest data per location.
//!
//! Two independent stores, each guarded by its own reader/writer lock: the
//! weather store keeps one reading per (location, provider), the forecast
//! store one series per (location, provider) with explicit age-based pruning.
//! Absence is `None`, never an error; readers never observe a half-written
//! record.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use parking_lot::RwLock;

use crate::model::{ForecastSeries, WeatherReading};

/// Latest current-weather reading per location, one entry per provider.
#[derive(Default)]
pub struct WeatherStore {
    data: RwLock<HashMap<String, Vec<WeatherReading>>>,
}

impl WeatherStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a reading: replaces any existing entry from the same provider
    /// for that location, leaving other providers' entries in place and in
    /// their original order.
    pub fn update(&self, reading: WeatherReading) {
        let mut data = self.data.write();
        let entries = data.entry(reading.location.clone()).or_default();

        match entries.iter_mut().find(|e| e.provider == reading.provider) {
            Some(existing) => *existing = reading,
            None => entries.push(reading),
        }
    }

    /// All providers' readings for a location, or `None` when nothing has
    /// been collected for it yet.
    pub fn get_by_location(&self, location: &str) -> Option<Vec<WeatherReading>> {
        self.data.read().get(location).cloned()
    }

    pub fn locations(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }
}

/// Latest forecast series keyed by (location, provider).
#[derive(Default)]
pub struct ForecastStore {
    data: RwLock<HashMap<String, HashMap<String, ForecastSeries>>>,
}

impl ForecastStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the series for (location, provider) wholesale.
    pub fn update(&self, series: ForecastSeries) {
        let mut data = self.data.write();
        data.entry(series.location.clone())
            .or_default()
            .insert(series.provider.clone(), series);
    }

    pub fn get_by_location(&self, location: &str) -> Option<Vec<ForecastSeries>> {
        self.data
            .read()
            .get(location)
            .map(|providers| providers.values().cloned().collect())
    }

    pub fn get_by_provider(&self, location: &str, provider: &str) -> Option<ForecastSeries> {
        self.data
            .read()
            .get(location)
            .and_then(|providers| providers.get(provider).cloned())
    }

    pub fn locations(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Remove every series whose `updated` timestamp is older than
    /// `now - max_age`, dropping a location entirely once its last provider
    /// entry is gone. Returns the number of provider entries removed.
    pub fn prune_older_than(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut pruned = 0;

        let mut data = self.data.write();
        data.retain(|_, providers| {
            let before = providers.len();
            providers.retain(|_, series| series.updated >= cutoff);
            pruned += before - providers.len();
            !providers.is_empty()
        });

        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn reading(provider: &str, location: &str, temperature_c: f64) -> WeatherReading {
        WeatherReading {
            provider: provider.to_string(),
            location: location.to_string(),
            temperature_c,
            humidity_pct: 50.0,
            wind_speed_mps: 2.0,
            wind_deg: 0,
            pressure_hpa: 1010.0,
            description: String::new(),
            icon: String::new(),
            timestamp: Utc::now(),
        }
    }

    fn series(provider: &str, location: &str, updated: DateTime<Utc>) -> ForecastSeries {
        ForecastSeries {
            provider: provider.to_string(),
            location: location.to_string(),
            points: Vec::new(),
            updated,
        }
    }

    #[test]
    fn missing_location_is_none_not_an_error() {
        let store = WeatherStore::new();
        assert!(store.get_by_location("Nowhere").is_none());
        assert!(store.locations().is_empty());
    }

    #[test]
    fn same_provider_updates_in_place() {
        let store = WeatherStore::new();
        store.update(reading("OpenWeatherMap", "London,UK", 10.0));
        store.update(reading("OpenWeatherMap", "London,UK", 12.5));

        let entries = store.get_by_location("London,UK").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].temperature_c, 12.5);
    }

    #[test]
    fn different_providers_sit_side_by_side_in_insertion_order() {
        let store = WeatherStore::new();
        store.update(reading("OpenWeatherMap", "London,UK", 10.0));
        store.update(reading("WeatherAPI", "London,UK", 11.0));
        store.update(reading("OpenWeatherMap", "London,UK", 9.0));

        let entries = store.get_by_location("London,UK").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].provider, "OpenWeatherMap");
        assert_eq!(entries[0].temperature_c, 9.0);
        assert_eq!(entries[1].provider, "WeatherAPI");
    }

    #[test]
    fn forecast_update_replaces_wholesale() {
        let store = ForecastStore::new();
        let first = Utc::now() - Duration::hours(1);
        store.update(series("OpenWeatherMap", "Paris,FR", first));
        store.update(series("OpenWeatherMap", "Paris,FR", Utc::now()));

        let stored = store.get_by_provider("Paris,FR", "OpenWeatherMap").unwrap();
        assert!(stored.updated > first);
        assert_eq!(store.get_by_location("Paris,FR").unwrap().len(), 1);
    }

    #[test]
    fn prune_removes_only_stale_entries_and_counts_them() {
        let store = ForecastStore::new();
        store.update(series("OpenWeatherMap", "Paris,FR", Utc::now() - Duration::hours(3)));
        store.update(series("WeatherAPI", "Paris,FR", Utc::now()));
        store.update(series("OpenWeatherMap", "Oslo,NO", Utc::now() - Duration::hours(5)));

        let pruned = store.prune_older_than(Duration::hours(1));
        assert_eq!(pruned, 2);

        // Paris keeps its fresh provider; Oslo is gone entirely.
        let paris = store.get_by_location("Paris,FR").unwrap();
        assert_eq!(paris.len(), 1);
        assert_eq!(paris[0].provider, "WeatherAPI");
        assert!(store.get_by_location("Oslo,NO").is_none());
        assert_eq!(store.locations(), vec!["Paris,FR".to_string()]);
    }

    #[test]
    fn prune_on_empty_store_is_a_no_op() {
        let store = ForecastStore::new();
        assert_eq!(store.prune_older_than(Duration::minutes(5)), 0);
    }
}
