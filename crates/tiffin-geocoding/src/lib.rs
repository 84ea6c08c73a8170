//! Geocoding module for the tiffin marketplace.
//!
//! Turns free-text places into coordinates and coordinates back into
//! address components. Geocoders are unreliable by nature, so the
//! [`GeocodingService`] holds an ordered chain of resolvers and tries each
//! in turn until one answers.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tiffin_types::{ConfigSchema, Coordinates, ImplementationRegistry, ResolvedAddress};

/// Re-export implementations
pub mod implementations {
	pub mod coordinates;
	pub mod nominatim;
	pub mod table;
}

/// Errors that can occur during geocoding.
#[derive(Debug, Error)]
pub enum GeocodingError {
	/// The resolver answered but knows no such place.
	#[error("No match for '{0}'")]
	NotFound(String),
	/// The resolver could not be reached.
	#[error("Network error: {0}")]
	Network(String),
	/// The resolver answered with something unusable.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// The resolver did not answer in time.
	#[error("Lookup timed out after {0:?}")]
	Timeout(Duration),
	/// The resolver does not support this kind of lookup.
	#[error("Lookup not supported")]
	Unsupported,
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// Every resolver in the chain failed.
	#[error("Geocoding unavailable: {0}")]
	Unavailable(String),
}

/// Trait defining the interface for geocoder implementations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeocoderInterface: Send + Sync {
	/// Returns the configuration schema for this geocoder.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Resolves a free-text place to coordinates.
	async fn forward(&self, query: &str) -> Result<Coordinates, GeocodingError>;

	/// Resolves coordinates to address components.
	async fn reverse(&self, _coordinates: Coordinates) -> Result<ResolvedAddress, GeocodingError> {
		Err(GeocodingError::Unsupported)
	}
}

/// Type alias for geocoder factory functions.
pub type GeocoderFactory = fn(&toml::Value) -> Result<Box<dyn GeocoderInterface>, GeocodingError>;

/// Registry trait for geocoder implementations.
pub trait GeocoderRegistry: ImplementationRegistry<Factory = GeocoderFactory> {}

/// Get all registered geocoder implementations.
pub fn get_all_implementations() -> Vec<(&'static str, GeocoderFactory)> {
	use implementations::{coordinates, nominatim, table};

	vec![
		(coordinates::Registry::NAME, coordinates::Registry::factory()),
		(nominatim::Registry::NAME, nominatim::Registry::factory()),
		(table::Registry::NAME, table::Registry::factory()),
	]
}

/// Ordered chain of geocoders.
///
/// Lookups try each resolver in configuration order, each bounded by the
/// same timeout, and return the first success. Failures are logged and only
/// surface as [`GeocodingError::Unavailable`] once the whole chain is
/// exhausted.
pub struct GeocodingService {
	resolvers: Vec<(String, Box<dyn GeocoderInterface>)>,
	timeout: Duration,
}

impl GeocodingService {
	pub fn new(resolvers: Vec<(String, Box<dyn GeocoderInterface>)>, timeout: Duration) -> Self {
		Self { resolvers, timeout }
	}

	/// Names of the resolvers, in the order they are tried.
	pub fn resolver_names(&self) -> Vec<&str> {
		self.resolvers.iter().map(|(name, _)| name.as_str()).collect()
	}

	/// Resolves a free-text place through the chain.
	pub async fn forward(&self, query: &str) -> Result<Coordinates, GeocodingError> {
		let query = query.trim();
		if query.is_empty() {
			return Err(GeocodingError::NotFound(String::new()));
		}

		let mut failures = Vec::new();
		for (name, resolver) in &self.resolvers {
			let result = match tokio::time::timeout(self.timeout, resolver.forward(query)).await {
				Ok(Ok(coords)) if coords.is_valid() => Ok(coords),
				Ok(Ok(coords)) => Err(GeocodingError::InvalidResponse(format!(
					"coordinates out of range: {}, {}",
					coords.lat, coords.lon
				))),
				Ok(Err(e)) => Err(e),
				Err(_) => Err(GeocodingError::Timeout(self.timeout)),
			};

			match result {
				Ok(coords) => {
					tracing::debug!(resolver = %name, query = %query, "Resolved place");
					return Ok(coords);
				},
				Err(e) => {
					tracing::debug!(
						resolver = %name,
						query = %query,
						error = %e,
						"Resolver failed"
					);
					failures.push(format!("{}: {}", name, e));
				},
			}
		}

		Err(Self::exhausted(failures))
	}

	/// Resolves coordinates to address components through the chain.
	///
	/// Resolvers that do not support reverse lookups are skipped silently.
	pub async fn reverse(
		&self,
		coordinates: Coordinates,
	) -> Result<ResolvedAddress, GeocodingError> {
		let mut failures = Vec::new();
		for (name, resolver) in &self.resolvers {
			match tokio::time::timeout(self.timeout, resolver.reverse(coordinates)).await {
				Ok(Ok(address)) => return Ok(address),
				Ok(Err(GeocodingError::Unsupported)) => continue,
				Ok(Err(e)) => failures.push(format!("{}: {}", name, e)),
				Err(_) => failures.push(format!(
					"{}: {}",
					name,
					GeocodingError::Timeout(self.timeout)
				)),
			}
		}

		Err(Self::exhausted(failures))
	}

	fn exhausted(failures: Vec<String>) -> GeocodingError {
		if failures.is_empty() {
			GeocodingError::Unavailable("no resolver configured".into())
		} else {
			GeocodingError::Unavailable(failures.join("; "))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mockall::predicate::eq;

	fn boxed(mock: MockGeocoderInterface) -> Box<dyn GeocoderInterface> {
		Box::new(mock)
	}

	#[tokio::test]
	async fn test_first_success_wins() {
		let mut primary = MockGeocoderInterface::new();
		primary
			.expect_forward()
			.with(eq("Pune"))
			.times(1)
			.returning(|_| Err(GeocodingError::Network("connection refused".into())));

		let mut secondary = MockGeocoderInterface::new();
		secondary
			.expect_forward()
			.times(1)
			.returning(|_| Ok(Coordinates::new(18.5204, 73.8567)));

		let mut never = MockGeocoderInterface::new();
		never.expect_forward().never();

		let service = GeocodingService::new(
			vec![
				("primary".into(), boxed(primary)),
				("secondary".into(), boxed(secondary)),
				("never".into(), boxed(never)),
			],
			Duration::from_secs(1),
		);

		let coords = service.forward("  Pune ").await.unwrap();
		assert_eq!(coords, Coordinates::new(18.5204, 73.8567));
	}

	#[tokio::test]
	async fn test_all_failures_are_reported() {
		let mut a = MockGeocoderInterface::new();
		a.expect_forward()
			.returning(|q| Err(GeocodingError::NotFound(q.to_string())));
		let mut b = MockGeocoderInterface::new();
		b.expect_forward()
			.returning(|_| Ok(Coordinates::new(123.0, 0.0)));

		let service = GeocodingService::new(
			vec![("a".into(), boxed(a)), ("b".into(), boxed(b))],
			Duration::from_secs(1),
		);

		match service.forward("Atlantis").await {
			Err(GeocodingError::Unavailable(msg)) => {
				assert!(msg.contains("a: No match for 'Atlantis'"));
				assert!(msg.contains("b: Invalid response"));
			},
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_blank_query_skips_chain() {
		let mut never = MockGeocoderInterface::new();
		never.expect_forward().never();
		let service =
			GeocodingService::new(vec![("never".into(), boxed(never))], Duration::from_secs(1));

		assert!(matches!(
			service.forward("   ").await,
			Err(GeocodingError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_reverse_skips_unsupported() {
		let mut forward_only = MockGeocoderInterface::new();
		forward_only
			.expect_reverse()
			.returning(|_| Err(GeocodingError::Unsupported));
		let mut full = MockGeocoderInterface::new();
		full.expect_reverse().returning(|_| {
			Ok(ResolvedAddress {
				city: Some("Pune".into()),
				..Default::default()
			})
		});

		let service = GeocodingService::new(
			vec![
				("forward_only".into(), boxed(forward_only)),
				("full".into(), boxed(full)),
			],
			Duration::from_secs(1),
		);

		let address = service
			.reverse(Coordinates::new(18.52, 73.85))
			.await
			.unwrap();
		assert_eq!(address.city.as_deref(), Some("Pune"));
	}

	#[tokio::test]
	async fn test_empty_chain_is_unavailable() {
		let service = GeocodingService::new(vec![], Duration::from_secs(1));
		assert!(matches!(
			service.forward("Pune").await,
			Err(GeocodingError::Unavailable(_))
		));
	}
}
