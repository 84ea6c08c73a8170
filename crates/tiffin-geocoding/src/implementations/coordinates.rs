//! Literal coordinate geocoder.
//!
//! Accepts queries that are already coordinates, written as `lat, lon`.

use crate::{GeocoderFactory, GeocoderInterface, GeocoderRegistry, GeocodingError};
use async_trait::async_trait;
use tiffin_types::{ConfigSchema, Coordinates, ImplementationRegistry, Schema, ValidationError};

/// Parses `lat, lon` pairs.
pub struct CoordinatesGeocoder;

/// Parses a `lat, lon` pair, returning `None` for anything else.
pub fn parse_pair(query: &str) -> Option<Coordinates> {
	let (lat, lon) = query.split_once(',')?;
	let lat = lat.trim().parse::<f64>().ok()?;
	let lon = lon.trim().parse::<f64>().ok()?;
	Some(Coordinates::new(lat, lon))
}

#[async_trait]
impl GeocoderInterface for CoordinatesGeocoder {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(CoordinatesGeocoderSchema)
	}

	async fn forward(&self, query: &str) -> Result<Coordinates, GeocodingError> {
		parse_pair(query).ok_or_else(|| GeocodingError::NotFound(query.to_string()))
	}
}

/// Configuration schema for CoordinatesGeocoder. It takes no options.
pub struct CoordinatesGeocoderSchema;

impl ConfigSchema for CoordinatesGeocoderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create the coordinate geocoder.
pub fn create_geocoder(config: &toml::Value) -> Result<Box<dyn GeocoderInterface>, GeocodingError> {
	CoordinatesGeocoderSchema
		.validate(config)
		.map_err(|e| GeocodingError::Configuration(e.to_string()))?;
	Ok(Box::new(CoordinatesGeocoder))
}

/// Registry for the coordinate geocoder.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "coordinates";
	type Factory = GeocoderFactory;

	fn factory() -> Self::Factory {
		create_geocoder
	}
}

impl GeocoderRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_pair() {
		assert_eq!(parse_pair("28.7, 77.1"), Some(Coordinates::new(28.7, 77.1)));
		assert_eq!(parse_pair(" -33.86 ,151.2 "), Some(Coordinates::new(-33.86, 151.2)));
		assert_eq!(parse_pair("New Delhi, India"), None);
		assert_eq!(parse_pair("28.7"), None);
	}

	#[tokio::test]
	async fn test_forward_rejects_place_names() {
		let geocoder = CoordinatesGeocoder;
		assert!(matches!(
			geocoder.forward("Pune").await,
			Err(GeocodingError::NotFound(_))
		));
		assert!(matches!(
			geocoder.reverse(Coordinates::new(0.0, 0.0)).await,
			Err(GeocodingError::Unsupported)
		));
	}
}
