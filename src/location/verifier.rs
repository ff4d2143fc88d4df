//! Background check that a resolved location actually has active listings.

use super::collaborators::ListingCounter;
use super::types::Availability;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct EstablishmentVerifier {
    counter: Arc<dyn ListingCounter>,
}

impl EstablishmentVerifier {
    pub fn new(counter: Arc<dyn ListingCounter>) -> Self {
        Self { counter }
    }

    /// Count active listings for the pair. A failed query counts as none.
    pub async fn verify(&self, city: &str, region: &str) -> Availability {
        match self.counter.count_active(city, region).await {
            Ok(count) => {
                debug!(city, region, count, "active listings counted");
                Availability::from_count(count)
            }
            Err(e) => {
                warn!(city, region, error = %e, "listing count failed, treating as unavailable");
                Availability::default()
            }
        }
    }
}
