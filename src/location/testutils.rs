//! Scriptable collaborators for resolver and strategy tests.

use super::collaborators::{
    Address, JsonFetcher, ListingCounter, Position, PositionOptions, Positioner, ProfileSource,
    ReverseGeocoder, SavedAddress, Session,
};
use super::providers::IpProvider;
use super::resolver::{Collaborators, LocationResolver};
use super::cache::LocationCache;
use super::types::LocationError;
use crate::config::EngineConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// What a mocked call does.
#[derive(Clone)]
pub enum Reply<T> {
    Ok(T),
    Fail,
    /// Never settles.
    Hang,
}

impl<T: Clone> Reply<T> {
    async fn play(&self, what: &str) -> Result<T, LocationError> {
        match self {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::Fail => Err(LocationError::ProviderUnavailable(format!("{} failed", what))),
            Reply::Hang => std::future::pending().await,
        }
    }
}

pub struct MockProfile {
    pub session: Reply<Option<Session>>,
    pub address: Reply<Option<SavedAddress>>,
    pub session_calls: AtomicUsize,
    pub address_calls: AtomicUsize,
}

impl MockProfile {
    pub fn signed_out() -> Self {
        Self {
            session: Reply::Ok(None),
            address: Reply::Ok(None),
            session_calls: AtomicUsize::new(0),
            address_calls: AtomicUsize::new(0),
        }
    }

    pub fn signed_in(city: Option<&str>, region: Option<&str>) -> Self {
        Self {
            session: Reply::Ok(Some(Session {
                user_id: "user-1".into(),
            })),
            address: Reply::Ok(Some(SavedAddress {
                city: city.map(String::from),
                region: region.map(String::from),
            })),
            ..Self::signed_out()
        }
    }
}

#[async_trait]
impl ProfileSource for MockProfile {
    async fn current_session(&self) -> Result<Option<Session>, LocationError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        self.session.play("session lookup").await
    }

    async fn saved_address(&self, _user_id: &str) -> Result<Option<SavedAddress>, LocationError> {
        self.address_calls.fetch_add(1, Ordering::SeqCst);
        self.address.play("profile fetch").await
    }
}

pub struct MockPositioner {
    pub available: bool,
    pub fix: Reply<Position>,
    pub calls: AtomicUsize,
}

impl MockPositioner {
    pub fn fixed(latitude: f64, longitude: f64) -> Self {
        Self {
            available: true,
            fix: Reply::Ok(Position {
                latitude,
                longitude,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Permission denied.
    pub fn denied() -> Self {
        Self {
            fix: Reply::Fail,
            ..Self::fixed(0.0, 0.0)
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::denied()
        }
    }
}

#[async_trait]
impl Positioner for MockPositioner {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn current_position(&self, _options: &PositionOptions) -> Result<Position, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fix.play("positioning").await
    }
}

pub struct MockGeocoder {
    pub address: Reply<Address>,
    pub calls: AtomicUsize,
}

impl MockGeocoder {
    pub fn new(address: Reply<Address>) -> Self {
        Self {
            address,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for MockGeocoder {
    async fn reverse(&self, _position: Position) -> Result<Address, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.address.play("reverse geocode").await
    }
}

/// Replies per URL; unknown URLs fail like an HTTP 500.
pub struct MockFetcher {
    replies: Vec<(String, Reply<Value>)>,
    requested: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new(replies: Vec<(&str, Reply<Value>)>) -> Self {
        Self {
            replies: replies
                .into_iter()
                .map(|(url, reply)| (url.to_string(), reply))
                .collect(),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl JsonFetcher for MockFetcher {
    async fn get_json(&self, url: &str, _query: &[(String, String)]) -> Result<Value, LocationError> {
        self.requested.lock().push(url.to_string());
        let reply = self
            .replies
            .iter()
            .find(|(known, _)| known == url)
            .map(|(_, reply)| reply.clone())
            .unwrap_or(Reply::Fail);
        reply.play(url).await
    }
}

pub struct MockListings {
    pub count: Reply<u64>,
    /// Overrides `count` for specific cities.
    pub per_city: Vec<(String, Reply<u64>)>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl MockListings {
    pub fn new(count: Reply<u64>) -> Self {
        Self {
            count,
            per_city: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_city(mut self, city: &str, count: Reply<u64>) -> Self {
        self.per_city.push((city.to_string(), count));
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ListingCounter for MockListings {
    async fn count_active(&self, city: &str, region: &str) -> Result<u64, LocationError> {
        self.calls.lock().push((city.to_string(), region.to_string()));
        let reply = self
            .per_city
            .iter()
            .find(|(known, _)| known == city)
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.count.clone());
        reply.play("listing count").await
    }
}

pub const ALPHA_URL: &str = "http://alpha.test/json";
pub const BETA_URL: &str = "http://beta.test/json";

/// Two providers with different field mappings.
pub fn test_providers() -> Vec<IpProvider> {
    vec![
        IpProvider::new("alpha", ALPHA_URL, "city", "region"),
        IpProvider::new("beta", BETA_URL, "city", "region_code"),
    ]
}

/// A full set of mocks plus a private cache directory.
///
/// Defaults: signed out, positioning denied, no network provider answers,
/// two active listings everywhere.
pub struct Harness {
    pub profile: Arc<MockProfile>,
    pub positioner: Arc<MockPositioner>,
    pub geocoder: Arc<MockGeocoder>,
    pub fetcher: Arc<MockFetcher>,
    pub listings: Arc<MockListings>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            profile: Arc::new(MockProfile::signed_out()),
            positioner: Arc::new(MockPositioner::denied()),
            geocoder: Arc::new(MockGeocoder::new(Reply::Fail)),
            fetcher: Arc::new(MockFetcher::new(Vec::new())),
            listings: Arc::new(MockListings::new(Reply::Ok(2))),
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            cache_path: Some(self.dir.path().join("location.json")),
            network_providers: test_providers(),
            ..EngineConfig::default()
        }
    }

    pub fn cache(&self) -> LocationCache {
        self.config().cache()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            profile: self.profile.clone(),
            positioner: self.positioner.clone(),
            geocoder: self.geocoder.clone(),
            http: self.fetcher.clone(),
            listings: self.listings.clone(),
        }
    }

    pub fn resolver(&self) -> LocationResolver {
        LocationResolver::new(&self.config(), self.collaborators())
    }

    /// Total calls made to any detection collaborator.
    pub fn strategy_calls(&self) -> usize {
        self.profile.session_calls.load(Ordering::SeqCst)
            + self.positioner.calls.load(Ordering::SeqCst)
            + self.geocoder.calls.load(Ordering::SeqCst)
            + self.fetcher.requested().len()
    }
}
