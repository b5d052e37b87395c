// src/config.rs

use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

/// Hard ceiling the batch geocoding service accepts per request.
pub const MAX_BATCH_SIZE: usize = 1000;

const DEFAULT_GEOCODER_URL: &str =
    "https://geocoding.geo.census.gov/geocoder/geographies/addressbatch";
const DEFAULT_BENCHMARK: &str = "Public_AR_Current";
const DEFAULT_VINTAGE: &str = "Current_Current";
const DEFAULT_LAYERS: &str = "16,18,20";
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// What to do with `No_Match` rows returned by the service. Applied to every flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchPolicy {
    Keep,
    Drop,
}

impl NoMatchPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep" => Some(NoMatchPolicy::Keep),
            "drop" => Some(NoMatchPolicy::Drop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub url: String,
    pub benchmark: String,
    pub vintage: String,
    pub layers: String,
    pub batch_size: usize,
    pub timeout: Duration,
    pub no_match: NoMatchPolicy,
}

impl GeocoderConfig {
    /// Builds the geocoder configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let url = get("GEOCODER_URL").unwrap_or_else(|| DEFAULT_GEOCODER_URL.to_string());
        let benchmark = get("GEOCODER_BENCHMARK").unwrap_or_else(|| DEFAULT_BENCHMARK.to_string());
        let vintage = get("GEOCODER_VINTAGE").unwrap_or_else(|| DEFAULT_VINTAGE.to_string());
        let layers = get("GEOCODER_LAYERS").unwrap_or_else(|| DEFAULT_LAYERS.to_string());

        let batch_size = match get("GEOCODER_BATCH_SIZE").map(|v| v.trim().parse::<usize>()) {
            None => MAX_BATCH_SIZE,
            Some(Ok(n)) if n > 0 && n <= MAX_BATCH_SIZE => n,
            Some(Ok(n)) => {
                warn!("GEOCODER_BATCH_SIZE={} outside 1..={}, using {}", n, MAX_BATCH_SIZE, MAX_BATCH_SIZE);
                MAX_BATCH_SIZE
            }
            Some(Err(e)) => {
                warn!("Invalid GEOCODER_BATCH_SIZE ({}), using {}", e, MAX_BATCH_SIZE);
                MAX_BATCH_SIZE
            }
        };

        let timeout_secs = match get("GEOCODER_TIMEOUT_SECS").map(|v| v.trim().parse::<u64>()) {
            None => DEFAULT_TIMEOUT_SECS,
            Some(Ok(0)) => {
                warn!("GEOCODER_TIMEOUT_SECS=0 would fail every request, using {}", DEFAULT_TIMEOUT_SECS);
                DEFAULT_TIMEOUT_SECS
            }
            Some(Ok(secs)) => secs,
            Some(Err(e)) => {
                warn!("Invalid GEOCODER_TIMEOUT_SECS ({}), using {}", e, DEFAULT_TIMEOUT_SECS);
                DEFAULT_TIMEOUT_SECS
            }
        };

        let no_match = match get("GEOCODER_NO_MATCH") {
            None => NoMatchPolicy::Drop,
            Some(raw) => NoMatchPolicy::parse(&raw).unwrap_or_else(|| {
                warn!("Unknown GEOCODER_NO_MATCH value '{}', dropping No_Match rows", raw);
                NoMatchPolicy::Drop
            }),
        };

        info!(
            "Geocoder Config: URL={}, Benchmark={}, Vintage={}, Layers={}, BatchSize={}, Timeout={}s, NoMatch={:?}",
            url, benchmark, vintage, layers, batch_size, timeout_secs, no_match
        );
        GeocoderConfig {
            url,
            benchmark,
            vintage,
            layers,
            batch_size,
            timeout: Duration::from_secs(timeout_secs),
            no_match,
        }
    }
}

/// Directory layout used by the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// One `<STATE>.txt` gazetteer file per state.
    pub gazetteer_dir: PathBuf,
    /// One sub-directory per state holding `<City_Name>.txt` filing extracts.
    pub pub78_dir: PathBuf,
    /// Where `<STATE>.txt` mapping files are written.
    pub mapping_dir: PathBuf,
}

impl ReconcileConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let dir = |key: &str, default: &str| PathBuf::from(get(key).unwrap_or_else(|| default.to_string()));
        let config = ReconcileConfig {
            gazetteer_dir: dir("GAZETTEER_DIR", "data/census_places_lon_lat"),
            pub78_dir: dir("PUB78_DIR", "data/pub78"),
            mapping_dir: dir("CITY_MAPPING_DIR", "data/pub78_to_census"),
        };
        info!(
            "Reconcile Config: Gazetteer={:?}, Pub78={:?}, Output={:?}",
            config.gazetteer_dir, config.pub78_dir, config.mapping_dir
        );
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn geocoder_defaults() {
        let config = GeocoderConfig::from_lookup(lookup(&[]));
        assert_eq!(config.url, DEFAULT_GEOCODER_URL);
        assert_eq!(config.benchmark, "Public_AR_Current");
        assert_eq!(config.vintage, "Current_Current");
        assert_eq!(config.layers, "16,18,20");
        assert_eq!(config.batch_size, MAX_BATCH_SIZE);
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.no_match, NoMatchPolicy::Drop);
    }

    #[test]
    fn batch_size_is_clamped_to_service_ceiling() {
        let config = GeocoderConfig::from_lookup(lookup(&[("GEOCODER_BATCH_SIZE", "5000")]));
        assert_eq!(config.batch_size, MAX_BATCH_SIZE);
        let config = GeocoderConfig::from_lookup(lookup(&[("GEOCODER_BATCH_SIZE", "0")]));
        assert_eq!(config.batch_size, MAX_BATCH_SIZE);
        let config = GeocoderConfig::from_lookup(lookup(&[("GEOCODER_BATCH_SIZE", "250")]));
        assert_eq!(config.batch_size, 250);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = GeocoderConfig::from_lookup(lookup(&[
            ("GEOCODER_BATCH_SIZE", "lots"),
            ("GEOCODER_TIMEOUT_SECS", "-3"),
            ("GEOCODER_NO_MATCH", "sometimes"),
        ]));
        assert_eq!(config.batch_size, MAX_BATCH_SIZE);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.no_match, NoMatchPolicy::Drop);
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let config = GeocoderConfig::from_lookup(lookup(&[("GEOCODER_TIMEOUT_SECS", "0")]));
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let config = GeocoderConfig::from_lookup(lookup(&[("GEOCODER_TIMEOUT_SECS", " 30 ")]));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn no_match_policy_is_case_insensitive() {
        let config = GeocoderConfig::from_lookup(lookup(&[("GEOCODER_NO_MATCH", "KEEP")]));
        assert_eq!(config.no_match, NoMatchPolicy::Keep);
    }

    #[test]
    fn reconcile_dirs_from_env() {
        let config = ReconcileConfig::from_lookup(lookup(&[("PUB78_DIR", "/tmp/pub78")]));
        assert_eq!(config.pub78_dir, PathBuf::from("/tmp/pub78"));
        assert_eq!(config.gazetteer_dir, PathBuf::from("data/census_places_lon_lat"));
        assert_eq!(config.mapping_dir, PathBuf::from("data/pub78_to_census"));
    }
}
