//! Flat snapshot handed to presentation code.

use super::types::{Availability, LocationSource, ResolutionState};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationView {
    pub city: Option<String>,
    pub region: Option<String>,
    pub source: LocationSource,
    pub is_loading: bool,
    pub is_detecting: bool,
    pub error: Option<String>,
    pub availability: Availability,
}

impl LocationView {
    pub fn new(state: &ResolutionState, availability: Availability) -> Self {
        Self {
            city: state.resolved.as_ref().map(|loc| loc.city.clone()),
            region: state.resolved.as_ref().map(|loc| loc.region.clone()),
            source: state.source(),
            is_loading: state.is_loading,
            is_detecting: state.is_detecting,
            error: state.error.map(|e| e.to_string()),
            availability,
        }
    }
}
