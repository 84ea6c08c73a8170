//! Factory registry for marketplace implementations.
//!
//! Collects the factories every implementation crate advertises through
//! `get_all_implementations()` so configuration can refer to them by name.

use std::collections::HashMap;
use std::sync::OnceLock;
use tiffin_config::Config;
use tiffin_core::{MarketplaceBuilder, MarketplaceEngine, MarketplaceFactories};
use tiffin_geocoding::GeocoderFactory;
use tiffin_storage::StorageFactory;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub geocoders: HashMap<String, GeocoderFactory>,
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the registry, populating it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut storage = HashMap::new();
		for (name, factory) in tiffin_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			storage.insert(name.to_string(), factory);
		}

		let mut geocoders = HashMap::new();
		for (name, factory) in tiffin_geocoding::get_all_implementations() {
			tracing::debug!("Registering geocoder implementation: {}", name);
			geocoders.insert(name.to_string(), factory);
		}

		FactoryRegistry { storage, geocoders }
	})
}

/// Picks the factories named in configuration, failing on unknown names.
macro_rules! build_factories {
	($registry:expr, $names:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $names {
			if let Some(factory) = $registry.$registry_field.get(name.as_str()) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Builds the engine from configuration using the registered factories.
pub fn build_marketplace(config: Config) -> Result<MarketplaceEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations.keys(), storage, "storage");
	let geocoder_factories =
		build_factories!(registry, config.geocoding.resolvers.iter(), geocoders, "geocoder");

	let factories = MarketplaceFactories {
		storage_factories,
		geocoder_factories,
	};

	Ok(MarketplaceBuilder::new(config).build(factories)?)
}
