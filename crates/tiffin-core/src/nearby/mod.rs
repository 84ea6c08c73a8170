//! Nearby chef matching.
//!
//! Each chef is placed by its stored coordinates or, failing that, by
//! geocoding its free-text location. When geocoding fails the chef's
//! location is compared with the customer's city as plain text: a match
//! counts as close, anything else as far. Chefs within the radius are
//! returned nearest first.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tiffin_config::NearbyConfig;
use tiffin_geocoding::GeocodingService;
use tiffin_types::{normalize_place, Chef, Coordinates, MatchMethod, NearbyChef};

/// Case-insensitive substring match in either direction. Blank strings
/// never match.
pub fn city_matches(chef_location: &str, customer_city: &str) -> bool {
	let location = normalize_place(chef_location);
	let city = normalize_place(customer_city);
	if location.is_empty() || city.is_empty() {
		return false;
	}
	location.contains(&city) || city.contains(&location)
}

/// Ranks chefs by distance from a customer.
pub struct NearbyMatcher {
	geocoding: Arc<GeocodingService>,
	config: NearbyConfig,
}

impl NearbyMatcher {
	pub fn new(geocoding: Arc<GeocodingService>, config: NearbyConfig) -> Self {
		Self { geocoding, config }
	}

	pub fn config(&self) -> &NearbyConfig {
		&self.config
	}

	async fn place(
		&self,
		chef: &Chef,
		customer: Coordinates,
		customer_city: Option<&str>,
	) -> (f64, MatchMethod) {
		if let Some(stored) = chef.coordinates.filter(Coordinates::is_valid) {
			return (customer.distance_km(&stored), MatchMethod::Stored);
		}

		match self.geocoding.forward(&chef.location).await {
			Ok(resolved) => (customer.distance_km(&resolved), MatchMethod::Geocoded),
			Err(e) => {
				tracing::debug!(chef_id = %chef.id, error = %e, "Falling back to city match");
				let matched = customer_city.is_some_and(|city| city_matches(&chef.location, city));
				let distance = if matched {
					self.config.fallback_match_km
				} else {
					self.config.fallback_miss_km
				};
				(distance, MatchMethod::CityFallback)
			},
		}
	}

	/// Returns the chefs within the configured radius, nearest first.
	///
	/// Lookups run concurrently up to `max_concurrent_lookups`. A failed
	/// lookup only affects its own chef.
	pub async fn find(
		&self,
		customer: Coordinates,
		customer_city: Option<&str>,
		chefs: Vec<Chef>,
	) -> Vec<NearbyChef> {
		let candidates = chefs.len();
		let mut nearby: Vec<NearbyChef> = stream::iter(chefs)
			.map(|chef| async move {
				let (distance_km, method) = self.place(&chef, customer, customer_city).await;
				NearbyChef {
					chef,
					distance_km,
					method,
				}
			})
			.buffer_unordered(self.config.max_concurrent_lookups.max(1))
			.filter(|candidate| {
				let keep = candidate.distance_km <= self.config.radius_km;
				async move { keep }
			})
			.collect()
			.await;

		nearby.sort_by(|a, b| {
			a.distance_km
				.total_cmp(&b.distance_km)
				.then_with(|| a.chef.id.cmp(&b.chef.id))
		});

		tracing::debug!(candidates, matched = nearby.len(), "Nearby search finished");
		nearby
	}
}
