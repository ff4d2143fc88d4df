//! File-based location cache at ~/.whereabouts/location.json.
//!
//! Holds a single entry. Expired or unreadable entries are removed on read.

use super::types::{LocationError, LocationSource, ResolvedLocation};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// The persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub city: String,
    pub region: String,
    /// Strategy that originally produced the entry.
    pub source: LocationSource,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl CacheEntry {
    /// The entry as served from cache.
    pub fn to_resolved(&self) -> ResolvedLocation {
        ResolvedLocation::new(self.city.clone(), self.region.clone(), LocationSource::Cache)
    }
}

/// The location cache.
#[derive(Debug, Clone)]
pub struct LocationCache {
    path: PathBuf,
    ttl: Duration,
}

impl LocationCache {
    pub fn open(path: PathBuf, ttl: Duration) -> Self {
        Self { path, ttl }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".whereabouts")
            .join("location.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the entry. Returns None if missing, malformed, or expired.
    pub fn read(&self) -> Option<CacheEntry> {
        let data = fs::read_to_string(&self.path).ok()?;

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "discarding malformed location cache");
                self.remove_quietly();
                return None;
            }
        };

        let age_ms = chrono::Utc::now().timestamp_millis() - entry.timestamp;
        if age_ms > self.ttl.as_millis() as i64 {
            debug!(age_ms, "discarding expired location cache");
            self.remove_quietly();
            return None;
        }

        Some(entry)
    }

    /// Persist a location with the current timestamp, replacing any prior entry.
    pub fn write(&self, city: &str, region: &str, source: LocationSource) -> Result<(), LocationError> {
        let entry = CacheEntry {
            city: city.to_string(),
            region: region.to_string(),
            source,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.persist(&entry)
    }

    pub fn clear(&self) -> Result<(), LocationError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, entry: &CacheEntry) -> Result<(), LocationError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entry)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn remove_quietly(&self) {
        if let Err(e) = self.clear() {
            warn!(path = %self.path.display(), error = %e, "could not remove stale location cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_cache() -> (LocationCache, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("location.json");
        (LocationCache::open(path, DEFAULT_TTL), dir)
    }

    fn write_raw(cache: &LocationCache, age: chrono::Duration) {
        let entry = CacheEntry {
            city: "Recife".into(),
            region: "PE".into(),
            source: LocationSource::Network,
            timestamp: (chrono::Utc::now() - age).timestamp_millis(),
        };
        fs::write(cache.path(), serde_json::to_string(&entry).unwrap()).unwrap();
    }

    #[test]
    fn test_cache_write_read() {
        let (cache, _dir) = test_cache();
        cache.write("Florianópolis", "SC", LocationSource::Network).unwrap();

        let entry = cache.read().unwrap();
        assert_eq!(entry.city, "Florianópolis");
        assert_eq!(entry.region, "SC");
        assert_eq!(entry.source, LocationSource::Network);

        let resolved = entry.to_resolved();
        assert_eq!(resolved.source, LocationSource::Cache);
    }

    #[test]
    fn test_cache_miss() {
        let (cache, _dir) = test_cache();
        assert!(cache.read().is_none());
    }

    #[test]
    fn test_cache_overwrite() {
        let (cache, _dir) = test_cache();
        cache.write("Recife", "PE", LocationSource::Device).unwrap();
        cache.write("Curitiba", "PR", LocationSource::Manual).unwrap();

        let entry = cache.read().unwrap();
        assert_eq!(entry.city, "Curitiba");
        assert_eq!(entry.source, LocationSource::Manual);
    }

    #[test]
    fn test_cache_fresh_entry_within_ttl() {
        let (cache, _dir) = test_cache();
        write_raw(&cache, chrono::Duration::days(6));
        assert_eq!(cache.read().unwrap().city, "Recife");
    }

    #[test]
    fn test_cache_expired_entry_removed() {
        let (cache, _dir) = test_cache();
        write_raw(&cache, chrono::Duration::days(8));

        assert!(cache.read().is_none());
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_cache_malformed_entry_removed() {
        let (cache, _dir) = test_cache();
        fs::write(cache.path(), "{\"city\": \"Recife\"").unwrap();

        assert!(cache.read().is_none());
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_cache_clear() {
        let (cache, _dir) = test_cache();
        cache.write("Recife", "PE", LocationSource::Profile).unwrap();
        cache.clear().unwrap();
        assert!(cache.read().is_none());
        // Clearing an absent entry is fine.
        cache.clear().unwrap();
    }

    #[test]
    fn test_cache_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("location.json");

        LocationCache::open(path.clone(), DEFAULT_TTL)
            .write("Salvador", "BA", LocationSource::Device)
            .unwrap();

        let reopened = LocationCache::open(path, DEFAULT_TTL);
        assert_eq!(reopened.read().unwrap().city, "Salvador");
    }
}
