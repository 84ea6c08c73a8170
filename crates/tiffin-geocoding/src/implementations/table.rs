//! Static place-table geocoder.
//!
//! Resolves places from a gazetteer held in configuration:
//!
//! ```toml
//! [geocoding.implementations.table]
//! reverse_radius_km = 25.0
//! [geocoding.implementations.table.places]
//! "new delhi" = [28.6139, 77.2090]
//! ```
//!
//! Names are compared after whitespace and case normalization. A query such
//! as `"12 MG Road, Pune, MH"` that does not match as a whole is retried
//! part by part, so any comma-separated component naming a known place wins.

use crate::{GeocoderFactory, GeocoderInterface, GeocoderRegistry, GeocodingError};
use async_trait::async_trait;
use tiffin_types::{
	normalize_place, ConfigSchema, Coordinates, Field, FieldType, ImplementationRegistry,
	ResolvedAddress, Schema, ValidationError,
};

const DEFAULT_REVERSE_RADIUS_KM: f64 = 25.0;

struct Place {
	key: String,
	name: String,
	coordinates: Coordinates,
}

/// Geocoder backed by a fixed list of places.
pub struct TableGeocoder {
	places: Vec<Place>,
	reverse_radius_km: f64,
}

impl TableGeocoder {
	/// Creates a geocoder from `(name, coordinates)` pairs.
	pub fn new(
		places: impl IntoIterator<Item = (String, Coordinates)>,
		reverse_radius_km: f64,
	) -> Self {
		let places = places
			.into_iter()
			.map(|(name, coordinates)| Place {
				key: normalize_place(&name),
				name,
				coordinates,
			})
			.collect();
		Self {
			places,
			reverse_radius_km,
		}
	}

	fn lookup(&self, name: &str) -> Option<Coordinates> {
		let key = normalize_place(name);
		if key.is_empty() {
			return None;
		}
		self.places
			.iter()
			.find(|p| p.key == key)
			.map(|p| p.coordinates)
	}
}

#[async_trait]
impl GeocoderInterface for TableGeocoder {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(TableGeocoderSchema)
	}

	async fn forward(&self, query: &str) -> Result<Coordinates, GeocodingError> {
		self.lookup(query)
			.or_else(|| query.split(',').find_map(|part| self.lookup(part)))
			.ok_or_else(|| GeocodingError::NotFound(query.to_string()))
	}

	async fn reverse(&self, coordinates: Coordinates) -> Result<ResolvedAddress, GeocodingError> {
		self.places
			.iter()
			.map(|p| (p, p.coordinates.distance_km(&coordinates)))
			.filter(|(_, d)| *d <= self.reverse_radius_km)
			.min_by(|a, b| a.1.total_cmp(&b.1))
			.map(|(p, _)| ResolvedAddress {
				city: Some(p.name.clone()),
				..Default::default()
			})
			.ok_or_else(|| {
				GeocodingError::NotFound(format!("{}, {}", coordinates.lat, coordinates.lon))
			})
	}
}

fn parse_place(value: &toml::Value) -> Option<Coordinates> {
	let pair = value.as_array()?;
	if pair.len() != 2 {
		return None;
	}
	let number = |v: &toml::Value| v.as_float().or_else(|| v.as_integer().map(|i| i as f64));
	let coordinates = Coordinates::new(number(&pair[0])?, number(&pair[1])?);
	coordinates.is_valid().then_some(coordinates)
}

/// Configuration schema for TableGeocoder.
pub struct TableGeocoderSchema;

impl ConfigSchema for TableGeocoderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("places", FieldType::Table(Schema::new(vec![], vec![]))).with_validator(
					|v| {
						let Some(table) = v.as_table() else {
							return Ok(());
						};
						for (name, value) in table {
							if parse_place(value).is_none() {
								return Err(format!(
									"place '{}' must be a [lat, lon] pair within range",
									name
								));
							}
						}
						Ok(())
					},
				),
				Field::new(
					"reverse_radius_km",
					FieldType::Float {
						min: Some(0.0),
						max: None,
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a table geocoder from configuration.
///
/// Configuration parameters:
/// - `places`: Table of place name to `[lat, lon]`
/// - `reverse_radius_km`: Maximum distance for reverse matches (default: 25)
pub fn create_geocoder(config: &toml::Value) -> Result<Box<dyn GeocoderInterface>, GeocodingError> {
	TableGeocoderSchema
		.validate(config)
		.map_err(|e| GeocodingError::Configuration(e.to_string()))?;

	let places = config
		.get("places")
		.and_then(|v| v.as_table())
		.map(|table| {
			table
				.iter()
				.filter_map(|(name, value)| parse_place(value).map(|c| (name.clone(), c)))
				.collect::<Vec<_>>()
		})
		.unwrap_or_default();

	let reverse_radius_km = config
		.get("reverse_radius_km")
		.and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
		.unwrap_or(DEFAULT_REVERSE_RADIUS_KM);

	tracing::debug!(places = places.len(), "Loaded place table");

	Ok(Box::new(TableGeocoder::new(places, reverse_radius_km)))
}

/// Registry for the table geocoder.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "table";
	type Factory = GeocoderFactory;

	fn factory() -> Self::Factory {
		create_geocoder
	}
}

impl GeocoderRegistry for Registry {}
