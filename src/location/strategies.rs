//! The three detection strategies, in cascade order: profile, device, network.
//!
//! A strategy never fails the cascade. Internal errors are logged and turned
//! into `None` so the next strategy gets its turn.

use super::collaborators::{JsonFetcher, Position, PositionOptions, Positioner, ProfileSource, ReverseGeocoder};
use super::normalize::normalize_region;
use super::providers::IpProvider;
use super::types::{LocationError, LocationSource, ResolvedLocation};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// One candidate method for resolving a location.
#[async_trait]
pub trait LocateStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn locate(&self) -> Option<ResolvedLocation>;
}

/// Both fields present and non-blank, trimmed.
fn complete_pair(city: Option<String>, region: Option<String>) -> Option<(String, String)> {
    let city = city?.trim().to_string();
    let region = region?.trim().to_string();
    if city.is_empty() || region.is_empty() {
        return None;
    }
    Some((city, region))
}

fn settle(
    strategy: &'static str,
    result: Result<Option<ResolvedLocation>, LocationError>,
) -> Option<ResolvedLocation> {
    match result {
        Ok(Some(location)) => {
            info!(strategy, city = %location.city, region = %location.region, "location detected");
            Some(location)
        }
        Ok(None) => {
            debug!(strategy, "strategy produced no location");
            None
        }
        Err(e) => {
            debug!(strategy, error = %e, "strategy failed");
            None
        }
    }
}

// ─── Profile ────────────────────────────────────────────────────

/// Reads the address saved on the signed-in user's profile.
pub struct ProfileStrategy {
    source: Arc<dyn ProfileSource>,
}

impl ProfileStrategy {
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self { source }
    }

    async fn lookup(&self) -> Result<Option<ResolvedLocation>, LocationError> {
        let Some(session) = self.source.current_session().await? else {
            return Ok(None);
        };
        let Some(address) = self.source.saved_address(&session.user_id).await? else {
            return Ok(None);
        };
        Ok(complete_pair(address.city, address.region).map(|(city, region)| {
            ResolvedLocation::new(city, normalize_region(&region), LocationSource::Profile)
        }))
    }
}

#[async_trait]
impl LocateStrategy for ProfileStrategy {
    fn name(&self) -> &'static str {
        "profile"
    }

    async fn locate(&self) -> Option<ResolvedLocation> {
        settle(self.name(), self.lookup().await)
    }
}

// ─── Device ─────────────────────────────────────────────────────

/// Coarse device fix followed by reverse geocoding.
pub struct DeviceStrategy {
    positioner: Arc<dyn Positioner>,
    geocoder: Arc<dyn ReverseGeocoder>,
    options: PositionOptions,
    last_fix: Mutex<Option<(Position, Instant)>>,
}

impl DeviceStrategy {
    pub fn new(
        positioner: Arc<dyn Positioner>,
        geocoder: Arc<dyn ReverseGeocoder>,
        options: PositionOptions,
    ) -> Self {
        Self {
            positioner,
            geocoder,
            options,
            last_fix: Mutex::new(None),
        }
    }

    async fn acquire_fix(&self) -> Result<Position, LocationError> {
        let cached = *self.last_fix.lock();
        if let Some((position, taken_at)) = cached {
            if taken_at.elapsed() <= self.options.maximum_age {
                debug!("reusing recent device fix");
                return Ok(position);
            }
        }

        let position = tokio::time::timeout(
            self.options.timeout,
            self.positioner.current_position(&self.options),
        )
        .await
        .map_err(|_| LocationError::ProviderTimeout {
            provider: "device".into(),
            after: self.options.timeout,
        })??;

        *self.last_fix.lock() = Some((position, Instant::now()));
        Ok(position)
    }

    async fn lookup(&self) -> Result<Option<ResolvedLocation>, LocationError> {
        if !self.positioner.is_available() {
            return Ok(None);
        }
        let position = self.acquire_fix().await?;
        let address = self.geocoder.reverse(position).await?;
        Ok(complete_pair(address.city, address.region).map(|(city, region)| {
            ResolvedLocation::new(city, normalize_region(&region), LocationSource::Device)
        }))
    }
}

#[async_trait]
impl LocateStrategy for DeviceStrategy {
    fn name(&self) -> &'static str {
        "device"
    }

    async fn locate(&self) -> Option<ResolvedLocation> {
        settle(self.name(), self.lookup().await)
    }
}

// ─── Network origin ─────────────────────────────────────────────

/// Walks the IP geolocation providers in order, one at a time.
pub struct NetworkStrategy {
    http: Arc<dyn JsonFetcher>,
    providers: Vec<IpProvider>,
    timeout: Duration,
}

impl NetworkStrategy {
    pub fn new(http: Arc<dyn JsonFetcher>, providers: Vec<IpProvider>, timeout: Duration) -> Self {
        Self {
            http,
            providers,
            timeout,
        }
    }

    async fn query(&self, provider: &IpProvider) -> Result<(String, String), LocationError> {
        let body = tokio::time::timeout(self.timeout, self.http.get_json(&provider.url, &[]))
            .await
            .map_err(|_| LocationError::ProviderTimeout {
                provider: provider.name.clone(),
                after: self.timeout,
            })??;

        provider.extract(&body).ok_or_else(|| {
            LocationError::InvalidResponse(format!("{} returned no city/region", provider.name))
        })
    }

    async fn lookup(&self) -> Result<Option<ResolvedLocation>, LocationError> {
        for provider in &self.providers {
            match self.query(provider).await {
                Ok((city, region)) => {
                    debug!(provider = %provider.name, "network provider answered");
                    return Ok(Some(ResolvedLocation::new(
                        city,
                        normalize_region(&region),
                        LocationSource::Network,
                    )));
                }
                Err(e) => debug!(provider = %provider.name, error = %e, "network provider failed"),
            }
        }
        Err(LocationError::AllProvidersExhausted)
    }
}

#[async_trait]
impl LocateStrategy for NetworkStrategy {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn locate(&self) -> Option<ResolvedLocation> {
        settle(self.name(), self.lookup().await)
    }
}
