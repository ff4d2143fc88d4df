//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a location was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Cache,
    Device,
    Network,
    Profile,
    Manual,
    None,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Device => write!(f, "device"),
            Self::Network => write!(f, "network"),
            Self::Profile => write!(f, "profile"),
            Self::Manual => write!(f, "manual"),
            Self::None => write!(f, "none"),
        }
    }
}

/// A city/region pair with the strategy that produced it.
///
/// `region` is the canonical two-letter code whenever the normalizer knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub city: String,
    pub region: String,
    pub source: LocationSource,
}

impl ResolvedLocation {
    pub fn new(city: impl Into<String>, region: impl Into<String>, source: LocationSource) -> Self {
        Self {
            city: city.into(),
            region: region.into(),
            source,
        }
    }

    pub fn display_line(&self) -> String {
        format!("\u{1F4CD} {}, {} ({})", self.city, self.region, self.source)
    }
}

/// Why a detection run ended without a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum DetectionFailure {
    #[error("location not detected")]
    NotDetected,
    #[error("location detection timed out")]
    TimedOut,
}

/// Observable state of one resolver instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionState {
    pub is_loading: bool,
    pub is_detecting: bool,
    pub error: Option<DetectionFailure>,
    pub resolved: Option<ResolvedLocation>,
}

impl ResolutionState {
    /// State of a freshly mounted resolver, before the cache has been read.
    pub fn initial() -> Self {
        Self {
            is_loading: true,
            is_detecting: false,
            error: None,
            resolved: None,
        }
    }

    /// State after `clear_location`: nothing known, nothing running.
    pub fn unknown() -> Self {
        Self {
            is_loading: false,
            is_detecting: false,
            error: None,
            resolved: None,
        }
    }

    pub fn source(&self) -> LocationSource {
        self.resolved
            .as_ref()
            .map(|loc| loc.source)
            .unwrap_or(LocationSource::None)
    }
}

/// Active listings found for the resolved location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub count: u64,
    pub has_any: bool,
}

impl Availability {
    pub fn from_count(count: u64) -> Self {
        Self {
            count,
            has_any: count > 0,
        }
    }
}

/// Location resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("provider {provider} timed out after {after:?}")]
    ProviderTimeout { provider: String, after: Duration },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("location not detected by any provider")]
    AllProvidersExhausted,
    #[error("listing count query failed: {0}")]
    VerifierQueryFailed(String),
    #[error("manual location needs both a city and a region")]
    InvalidManualLocation,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
