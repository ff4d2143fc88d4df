//! Location resolver: orchestrates the detection cascade.
//!
//! Start:     cache hit → ready, verify in background
//!            cache miss → profile → device → network, capped by the safety net
//! Manual:    set / clear take effect immediately
//! Redetect:  drop cache, supersede any running cascade, detect again
//!
//! Every cascade carries a generation number. Manual set, clear and redetect
//! bump the generation, so a cascade that finishes afterwards is discarded.

use super::cache::LocationCache;
use super::collaborators::{
    FixedPositioner, JsonFetcher, ListingCounter, NoBackend, NoPositioner, Positioner,
    ProfileSource, ReverseGeocoder,
};
use super::normalize::normalize_region;
use super::providers::{NominatimGeocoder, RestBackend, UreqFetcher};
use super::strategies::{DeviceStrategy, LocateStrategy, NetworkStrategy, ProfileStrategy};
use super::types::{
    Availability, DetectionFailure, LocationError, LocationSource, ResolutionState,
    ResolvedLocation,
};
use super::verifier::EstablishmentVerifier;
use super::view::LocationView;
use crate::config::EngineConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tracing::{debug, info, warn};

/// Everything the resolver talks to outside the process.
pub struct Collaborators {
    pub profile: Arc<dyn ProfileSource>,
    pub positioner: Arc<dyn Positioner>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
    pub http: Arc<dyn JsonFetcher>,
    pub listings: Arc<dyn ListingCounter>,
}

impl Collaborators {
    /// Real network collaborators as described by the config.
    pub fn from_config(config: &EngineConfig) -> Self {
        let http: Arc<dyn JsonFetcher> =
            Arc::new(UreqFetcher::new(&config.user_agent, config.http_timeout()));
        let geocoder = Arc::new(NominatimGeocoder::new(http.clone(), &config.nominatim_url));

        let positioner: Arc<dyn Positioner> = match config.position {
            Some(position) => Arc::new(FixedPositioner::new(position)),
            None => Arc::new(NoPositioner),
        };

        let (profile, listings): (Arc<dyn ProfileSource>, Arc<dyn ListingCounter>) =
            match &config.backend {
                Some(backend) => {
                    let backend = Arc::new(RestBackend::new(
                        backend.clone(),
                        &config.user_agent,
                        config.http_timeout(),
                    ));
                    (backend.clone(), backend)
                }
                None => (Arc::new(NoBackend), Arc::new(NoBackend)),
            };

        Self {
            profile,
            positioner,
            geocoder,
            http,
            listings,
        }
    }
}

struct Inner {
    cache: LocationCache,
    strategies: Vec<Arc<dyn LocateStrategy>>,
    verifier: EstablishmentVerifier,
    safety_net: Duration,
    state: watch::Sender<ResolutionState>,
    availability: watch::Sender<Availability>,
    /// One-shot activation flag for `start`.
    started: AtomicBool,
    /// Held across every state transition.
    generation: Mutex<u64>,
    cascade: Mutex<Option<JoinHandle<()>>>,
}

/// The location resolver. Cheap to clone; clones share one instance.
#[derive(Clone)]
pub struct LocationResolver {
    inner: Arc<Inner>,
}

impl LocationResolver {
    pub fn new(config: &EngineConfig, collaborators: Collaborators) -> Self {
        let strategies: Vec<Arc<dyn LocateStrategy>> = vec![
            Arc::new(ProfileStrategy::new(collaborators.profile)),
            Arc::new(DeviceStrategy::new(
                collaborators.positioner,
                collaborators.geocoder,
                config.position_options(),
            )),
            Arc::new(NetworkStrategy::new(
                collaborators.http,
                config.network_providers.clone(),
                config.provider_timeout(),
            )),
        ];

        let (state, _) = watch::channel(ResolutionState::initial());
        let (availability, _) = watch::channel(Availability::default());

        Self {
            inner: Arc::new(Inner {
                cache: config.cache(),
                strategies,
                verifier: EstablishmentVerifier::new(collaborators.listings),
                safety_net: config.safety_net(),
                state,
                availability,
                started: AtomicBool::new(false),
                generation: Mutex::new(0),
                cascade: Mutex::new(None),
            }),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config, Collaborators::from_config(config))
    }

    /// Activate the resolver. Only the first call does anything.
    ///
    /// A valid cache entry resolves synchronously, before this returns.
    /// Otherwise a detection cascade is spawned on the current tokio runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("resolver already started");
            return;
        }

        if let Some(entry) = self.inner.cache.read() {
            let location = entry.to_resolved();
            info!(city = %location.city, region = %location.region, origin = %entry.source, "location served from cache");
            let generation = {
                let generation = self.inner.generation.lock();
                self.inner.state.send_modify(|state| {
                    state.is_loading = false;
                    state.is_detecting = false;
                    state.error = None;
                    state.resolved = Some(location.clone());
                });
                *generation
            };
            self.inner.spawn_verifier(location, generation);
            return;
        }

        self.launch_cascade();
    }

    /// Pin the location to a user choice. Does not stop a running cascade,
    /// but that cascade's result will be discarded.
    ///
    /// Must be called from within a tokio runtime; the listing check is spawned.
    pub fn set_manual_location(&self, city: &str, region: &str) -> Result<ResolvedLocation, LocationError> {
        let city = city.trim();
        let region = region.trim();
        if city.is_empty() || region.is_empty() {
            return Err(LocationError::InvalidManualLocation);
        }

        let location = ResolvedLocation::new(city, normalize_region(region), LocationSource::Manual);
        let generation = {
            let mut generation = self.inner.generation.lock();
            *generation += 1;
            if let Err(e) = self
                .inner
                .cache
                .write(&location.city, &location.region, LocationSource::Manual)
            {
                warn!(error = %e, "could not persist manual location");
            }
            self.inner.state.send_modify(|state| {
                state.is_loading = false;
                state.is_detecting = false;
                state.error = None;
                state.resolved = Some(location.clone());
            });
            self.inner.reset_availability();
            *generation
        };

        info!(city = %location.city, region = %location.region, "manual location set");
        self.inner.spawn_verifier(location.clone(), generation);
        Ok(location)
    }

    /// Forget the location entirely.
    pub fn clear_location(&self) {
        let mut generation = self.inner.generation.lock();
        *generation += 1;
        if let Err(e) = self.inner.cache.clear() {
            warn!(error = %e, "could not clear location cache");
        }
        self.inner.state.send_replace(ResolutionState::unknown());
        self.inner.reset_availability();
        info!("location cleared");
    }

    /// Drop the cache and detect again, superseding any running cascade.
    ///
    /// Must be called from within a tokio runtime.
    pub fn redetect(&self) {
        self.inner.started.store(true, Ordering::SeqCst);
        if let Some(handle) = self.inner.cascade.lock().take() {
            handle.abort();
        }

        {
            let mut generation = self.inner.generation.lock();
            *generation += 1;
            if let Err(e) = self.inner.cache.clear() {
                warn!(error = %e, "could not clear location cache");
            }
            self.inner.state.send_replace(ResolutionState {
                is_loading: true,
                is_detecting: false,
                error: None,
                resolved: None,
            });
            self.inner.reset_availability();
        }

        info!("redetecting location");
        self.launch_cascade();
    }

    /// Abort a running cascade, if any.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.cascade.lock().take() {
            handle.abort();
        }
    }

    pub fn snapshot(&self) -> ResolutionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolutionState> {
        self.inner.state.subscribe()
    }

    pub fn availability(&self) -> Availability {
        *self.inner.availability.borrow()
    }

    pub fn subscribe_availability(&self) -> watch::Receiver<Availability> {
        self.inner.availability.subscribe()
    }

    pub fn view(&self) -> LocationView {
        LocationView::new(&self.snapshot(), self.availability())
    }

    /// Resolves once loading is over. Never returns if `start` is never called.
    pub async fn wait_until_loaded(&self) -> ResolutionState {
        let mut rx = self.subscribe();
        let state = match rx.wait_for(|state| !state.is_loading).await {
            Ok(state) => (*state).clone(),
            Err(_) => self.snapshot(),
        };
        state
    }

    /// Spawn a cascade unless one is already running.
    fn launch_cascade(&self) {
        let mut slot = self.inner.cascade.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("cascade already in flight");
            return;
        }

        let generation = {
            let mut generation = self.inner.generation.lock();
            *generation += 1;
            self.inner.state.send_modify(|state| {
                state.is_detecting = true;
                state.error = None;
            });
            *generation
        };

        let inner = Arc::clone(&self.inner);
        *slot = Some(tokio::spawn(async move {
            inner.run_cascade(generation).await;
        }));
    }
}

impl Inner {
    async fn run_cascade(self: Arc<Self>, generation: u64) {
        debug!(generation, "cascade started");
        let outcome = tokio::time::timeout(self.safety_net, self.cascade()).await;
        self.finish(generation, outcome);
    }

    async fn cascade(&self) -> Option<ResolvedLocation> {
        for strategy in &self.strategies {
            debug!(strategy = strategy.name(), "trying strategy");
            if let Some(location) = strategy.locate().await {
                return Some(location);
            }
        }
        None
    }

    fn finish(self: &Arc<Self>, generation: u64, outcome: Result<Option<ResolvedLocation>, Elapsed>) {
        let current = self.generation.lock();
        if *current != generation {
            debug!(generation, current = *current, "discarding superseded cascade");
            return;
        }

        match outcome {
            Ok(Some(location)) => {
                if let Err(e) = self.cache.write(&location.city, &location.region, location.source) {
                    warn!(error = %e, "could not persist detected location");
                }
                self.state.send_modify(|state| {
                    state.is_loading = false;
                    state.is_detecting = false;
                    state.error = None;
                    state.resolved = Some(location.clone());
                });
                drop(current);
                info!(city = %location.city, region = %location.region, source = %location.source, "location resolved");
                self.spawn_verifier(location, generation);
            }
            Ok(None) => {
                warn!("no strategy could detect the location");
                self.fail(DetectionFailure::NotDetected);
            }
            Err(_) => {
                warn!(after = ?self.safety_net, "safety net expired before detection settled");
                self.fail(DetectionFailure::TimedOut);
            }
        }
    }

    fn fail(&self, failure: DetectionFailure) {
        self.state.send_modify(|state| {
            state.is_loading = false;
            state.is_detecting = false;
            state.error = Some(failure);
            state.resolved = None;
        });
    }

    /// Back to "no listings known". Subscribers are only woken if the value
    /// actually changes.
    fn reset_availability(&self) {
        self.availability.send_if_modified(|availability| {
            let changed = *availability != Availability::default();
            *availability = Availability::default();
            changed
        });
    }

    /// Fire-and-forget listing count for `location`, resolved under
    /// `generation`. The result is dropped if the generation moved on.
    fn spawn_verifier(self: &Arc<Self>, location: ResolvedLocation, generation: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let availability = inner.verifier.verify(&location.city, &location.region).await;
            let current = inner.generation.lock();
            if *current == generation {
                inner.availability.send_replace(availability);
            } else {
                debug!(city = %location.city, generation, current = *current, "dropping availability for a superseded location");
            }
        });
    }
}
