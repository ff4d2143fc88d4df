//! Location detection subsystem for Whereabouts.
//!
//! Resolves the user's city and region from a local cache, their profile, a
//! device fix, or IP geolocation, within a fixed time bound, and checks in the
//! background whether the result has active listings.

pub mod cache;
pub mod collaborators;
pub mod normalize;
pub mod providers;
pub mod resolver;
pub mod strategies;
pub mod types;
pub mod verifier;
pub mod view;

#[cfg(test)]
pub(crate) mod testutils;

pub use normalize::normalize_region;
pub use resolver::{Collaborators, LocationResolver};
pub use types::{
    Availability, DetectionFailure, LocationError, LocationSource, ResolutionState,
    ResolvedLocation,
};
pub use view::LocationView;
