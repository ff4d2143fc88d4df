//! Seams to the outside world: session/profile backend, positioning, reverse
//! geocoding, raw JSON over HTTP, and the listing count query.
//!
//! Concrete network implementations live in [`super::providers`]; the small
//! offline ones are here.

use super::types::LocationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An authenticated user session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
}

/// Address saved on the user's profile. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SavedAddress {
    pub city: Option<String>,
    pub region: Option<String>,
}

#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, LocationError>;

    async fn saved_address(&self, user_id: &str) -> Result<Option<SavedAddress>, LocationError>;
}

/// A coordinate fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Parameters for a positioning request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest fix that may be reused instead of polling again.
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: false,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(5 * 60),
        }
    }
}

#[async_trait]
pub trait Positioner: Send + Sync {
    /// Whether a positioning capability exists at all.
    fn is_available(&self) -> bool {
        true
    }

    async fn current_position(&self, options: &PositionOptions) -> Result<Position, LocationError>;
}

/// Structured result of reverse geocoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// City, town or village, whichever the geocoder knew.
    pub city: Option<String>,
    /// Region name or code, not yet normalized.
    pub region: Option<String>,
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, position: Position) -> Result<Address, LocationError>;
}

/// GET a URL and decode the body as JSON. Non-2xx statuses are errors.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<serde_json::Value, LocationError>;
}

/// Counts active listings for a city/region, case-insensitively.
#[async_trait]
pub trait ListingCounter: Send + Sync {
    async fn count_active(&self, city: &str, region: &str) -> Result<u64, LocationError>;
}

/// Host without any positioning capability.
pub struct NoPositioner;

#[async_trait]
impl Positioner for NoPositioner {
    fn is_available(&self) -> bool {
        false
    }

    async fn current_position(&self, _options: &PositionOptions) -> Result<Position, LocationError> {
        Err(LocationError::ProviderUnavailable(
            "no positioning capability".into(),
        ))
    }
}

/// Reports a configured coordinate as the device fix.
pub struct FixedPositioner {
    position: Position,
}

impl FixedPositioner {
    pub fn new(position: Position) -> Self {
        Self { position }
    }
}

#[async_trait]
impl Positioner for FixedPositioner {
    async fn current_position(&self, _options: &PositionOptions) -> Result<Position, LocationError> {
        Ok(self.position)
    }
}

/// Stand-in when no backend is configured: never signed in, listings unknown.
pub struct NoBackend;

#[async_trait]
impl ProfileSource for NoBackend {
    async fn current_session(&self) -> Result<Option<Session>, LocationError> {
        Ok(None)
    }

    async fn saved_address(&self, _user_id: &str) -> Result<Option<SavedAddress>, LocationError> {
        Ok(None)
    }
}

#[async_trait]
impl ListingCounter for NoBackend {
    async fn count_active(&self, _city: &str, _region: &str) -> Result<u64, LocationError> {
        Err(LocationError::VerifierQueryFailed(
            "no listings backend configured".into(),
        ))
    }
}
