//! Builder pattern for constructing marketplace engines.
//!
//! Composes a MarketplaceEngine from storage and geocoder implementations
//! created through factory functions keyed by implementation name.

use crate::engine::{event_bus::EventBus, MarketplaceEngine};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tiffin_config::Config;
use tiffin_geocoding::{GeocoderInterface, GeocodingError, GeocodingService};
use tiffin_storage::{StorageError, StorageInterface, StorageService};

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component.
pub struct MarketplaceFactories<SF, GF> {
	pub storage_factories: HashMap<String, SF>,
	pub geocoder_factories: HashMap<String, GF>,
}

/// Builder for constructing a MarketplaceEngine with pluggable implementations.
pub struct MarketplaceBuilder {
	config: Config,
}

impl MarketplaceBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine.
	///
	/// The primary storage must load. Geocoders are chained in the order of
	/// `geocoding.resolvers`; an empty chain is allowed, in which case every
	/// chef without stored coordinates goes through the city fallback.
	pub fn build<SF, GF>(
		self,
		factories: MarketplaceFactories<SF, GF>,
	) -> Result<MarketplaceEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		GF: Fn(&toml::Value) -> Result<Box<dyn GeocoderInterface>, GeocodingError>,
	{
		let storage = Arc::new(StorageService::new(self.build_storage(&factories)?));
		let geocoding = Arc::new(self.build_geocoding(&factories)?);

		Ok(MarketplaceEngine::new(
			self.config,
			storage,
			geocoding,
			EventBus::default(),
		))
	}

	fn build_storage<SF, GF>(
		&self,
		factories: &MarketplaceFactories<SF, GF>,
	) -> Result<Box<dyn StorageInterface>, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let primary = &self.config.storage.primary;
		let config = self.config.storage.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Primary storage '{}' is not configured", primary))
		})?;
		let factory = factories
			.storage_factories
			.get(primary)
			.ok_or_else(|| BuilderError::MissingComponent(format!("storage '{}'", primary)))?;

		match factory(config) {
			Ok(implementation) => {
				tracing::info!(
					component = "storage",
					implementation = %primary,
					enabled = true,
					"Loaded"
				);
				Ok(implementation)
			},
			Err(e) => {
				tracing::error!(
					component = "storage",
					implementation = %primary,
					error = %e,
					"Failed to create storage implementation"
				);
				Err(BuilderError::Config(format!(
					"Failed to create storage implementation '{}': {}",
					primary, e
				)))
			},
		}
	}

	fn build_geocoding<SF, GF>(
		&self,
		factories: &MarketplaceFactories<SF, GF>,
	) -> Result<GeocodingService, BuilderError>
	where
		GF: Fn(&toml::Value) -> Result<Box<dyn GeocoderInterface>, GeocodingError>,
	{
		let geocoding = &self.config.geocoding;
		let empty = toml::Value::Table(toml::map::Map::new());

		let mut resolvers = Vec::with_capacity(geocoding.resolvers.len());
		for name in &geocoding.resolvers {
			let factory = factories
				.geocoder_factories
				.get(name)
				.ok_or_else(|| BuilderError::MissingComponent(format!("geocoder '{}'", name)))?;
			let config = geocoding.implementations.get(name).unwrap_or(&empty);

			match factory(config) {
				Ok(implementation) => {
					tracing::info!(
						component = "geocoding",
						implementation = %name,
						position = resolvers.len(),
						"Loaded"
					);
					resolvers.push((name.clone(), implementation));
				},
				Err(e) => {
					tracing::error!(
						component = "geocoding",
						implementation = %name,
						error = %e,
						"Failed to create geocoder"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create geocoder '{}': {}",
						name, e
					)));
				},
			}
		}

		if resolvers.is_empty() {
			tracing::warn!(
				component = "geocoding",
				"No geocoders configured, nearby search will use city matching only"
			);
		}

		Ok(GeocodingService::new(
			resolvers,
			Duration::from_secs(geocoding.timeout_seconds),
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::tests::test_config;
	use tiffin_geocoding::implementations::coordinates;
	use tiffin_storage::implementations::memory;

	type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;
	type GeocoderFactory = fn(&toml::Value) -> Result<Box<dyn GeocoderInterface>, GeocodingError>;

	fn factories() -> MarketplaceFactories<StorageFactory, GeocoderFactory> {
		let mut storage_factories: HashMap<String, StorageFactory> = HashMap::new();
		storage_factories.insert("memory".into(), memory::create_storage);
		let mut geocoder_factories: HashMap<String, GeocoderFactory> = HashMap::new();
		geocoder_factories.insert("coordinates".into(), coordinates::create_geocoder);
		MarketplaceFactories {
			storage_factories,
			geocoder_factories,
		}
	}

	#[test]
	fn test_build_with_memory_storage() {
		let mut config = test_config();
		config.geocoding.resolvers = vec!["coordinates".into()];

		let engine = MarketplaceBuilder::new(config).build(factories()).unwrap();
		assert_eq!(engine.geocoding.resolver_names(), vec!["coordinates"]);
	}

	#[test]
	fn test_unknown_geocoder_is_missing_component() {
		let mut config = test_config();
		config.geocoding.resolvers = vec!["carrier-pigeon".into()];

		let result = MarketplaceBuilder::new(config).build(factories());
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}

	#[test]
	fn test_unknown_storage_is_missing_component() {
		let mut config = test_config();
		config.storage.primary = "file".into();
		config
			.storage
			.implementations
			.insert("file".into(), toml::Value::Table(toml::map::Map::new()));

		let result = MarketplaceBuilder::new(config).build(factories());
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}
}
