//! Engine configuration: defaults, optional JSON file, CLI overrides on top.

use crate::location::cache::{LocationCache, DEFAULT_TTL};
use crate::location::collaborators::{Position, PositionOptions};
use crate::location::providers::{default_ip_providers, BackendConfig, IpProvider, DEFAULT_NOMINATIM_URL};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Defaults to ~/.whereabouts/location.json.
    pub cache_path: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    /// Hard cap on a whole detection run.
    pub safety_net_secs: u64,
    pub device_timeout_secs: u64,
    pub device_max_age_secs: u64,
    /// Per IP geolocation provider.
    pub provider_timeout_secs: u64,
    /// Transport timeout for reverse geocoding and backend queries.
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub nominatim_url: String,
    pub network_providers: Vec<IpProvider>,
    /// Stands in for the device fix on hosts without positioning hardware.
    pub position: Option<Position>,
    pub backend: Option<BackendConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            safety_net_secs: 15,
            device_timeout_secs: 10,
            device_max_age_secs: 5 * 60,
            provider_timeout_secs: 5,
            http_timeout_secs: 10,
            user_agent: format!("whereabouts/{}", env!("CARGO_PKG_VERSION")),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            network_providers: default_ip_providers(),
            position: None,
            backend: None,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let data = fs::read_to_string(path)?;
                Ok(serde_json::from_str(&data)?)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn cache(&self) -> LocationCache {
        let path = self
            .cache_path
            .clone()
            .unwrap_or_else(LocationCache::default_path);
        LocationCache::open(path, self.cache_ttl())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn safety_net(&self) -> Duration {
        Duration::from_secs(self.safety_net_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn position_options(&self) -> PositionOptions {
        PositionOptions {
            high_accuracy: false,
            timeout: Duration::from_secs(self.device_timeout_secs),
            maximum_age: Duration::from_secs(self.device_max_age_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_ttl(), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.safety_net(), Duration::from_secs(15));
        assert_eq!(config.provider_timeout(), Duration::from_secs(5));

        let options = config.position_options();
        assert!(!options.high_accuracy);
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.maximum_age, Duration::from_secs(300));
        assert_eq!(config.network_providers.len(), 4);
    }

    #[test]
    fn test_load_without_path_is_default() {
        assert_eq!(EngineConfig::load(None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("whereabouts.json");
        fs::write(
            &path,
            r#"{
                "safety_net_secs": 20,
                "position": { "latitude": -8.05, "longitude": -34.88 },
                "network_providers": [
                    { "name": "corp", "url": "http://geo.internal/json", "city_field": "town", "region_field": "/subdivision/code" }
                ],
                "backend": { "url": "https://db.example", "api_key": "anon" }
            }"#,
        )
        .unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.safety_net(), Duration::from_secs(20));
        assert_eq!(config.provider_timeout_secs, 5);
        assert_eq!(config.network_providers.len(), 1);
        assert_eq!(config.network_providers[0].region_field, "/subdivision/code");
        assert!((config.position.unwrap().latitude + 8.05).abs() < 1e-9);
        assert_eq!(config.backend.unwrap().listings_table, "establishments");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = EngineConfig::load(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ safety_net_secs: }").unwrap();
        assert!(matches!(EngineConfig::load(Some(&path)), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_cache_path_override() {
        let config = EngineConfig {
            cache_path: Some(PathBuf::from("/tmp/where.json")),
            ..EngineConfig::default()
        };
        assert_eq!(config.cache().path(), Path::new("/tmp/where.json"));
    }
}
