//! Nominatim (OpenStreetMap) geocoder.

use crate::{GeocoderFactory, GeocoderInterface, GeocoderRegistry, GeocodingError};
use async_trait::async_trait;
use serde::Deserialize;
use tiffin_types::{
	ConfigSchema, Coordinates, Field, FieldType, ImplementationRegistry, ResolvedAddress, Schema,
	ValidationError,
};

const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_USER_AGENT: &str = "tiffin-marketplace/0.1";

#[derive(Debug, Deserialize)]
struct SearchHit {
	lat: String,
	lon: String,
}

#[derive(Debug, Default, Deserialize)]
struct AddressParts {
	city: Option<String>,
	town: Option<String>,
	village: Option<String>,
	state: Option<String>,
	postcode: Option<String>,
	country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReverseHit {
	#[serde(default)]
	address: Option<AddressParts>,
	#[serde(default)]
	error: Option<String>,
}

/// Parses the body of a `/search` response.
fn parse_search(query: &str, body: &str) -> Result<Coordinates, GeocodingError> {
	let hits: Vec<SearchHit> =
		serde_json::from_str(body).map_err(|e| GeocodingError::InvalidResponse(e.to_string()))?;
	let hit = hits
		.into_iter()
		.next()
		.ok_or_else(|| GeocodingError::NotFound(query.to_string()))?;

	let lat = hit
		.lat
		.parse::<f64>()
		.map_err(|e| GeocodingError::InvalidResponse(format!("lat '{}': {}", hit.lat, e)))?;
	let lon = hit
		.lon
		.parse::<f64>()
		.map_err(|e| GeocodingError::InvalidResponse(format!("lon '{}': {}", hit.lon, e)))?;
	Ok(Coordinates::new(lat, lon))
}

/// Parses the body of a `/reverse` response.
fn parse_reverse(body: &str) -> Result<ResolvedAddress, GeocodingError> {
	let hit: ReverseHit =
		serde_json::from_str(body).map_err(|e| GeocodingError::InvalidResponse(e.to_string()))?;
	if let Some(error) = hit.error {
		return Err(GeocodingError::NotFound(error));
	}
	let parts = hit.address.unwrap_or_default();
	Ok(ResolvedAddress {
		city: parts.city.or(parts.town).or(parts.village),
		state: parts.state,
		postcode: parts.postcode,
		country: parts.country,
	})
}

/// Geocoder that calls a Nominatim-compatible HTTP API.
pub struct NominatimGeocoder {
	client: reqwest::Client,
	base_url: String,
}

impl NominatimGeocoder {
	pub fn new(base_url: &str, user_agent: &str) -> Result<Self, GeocodingError> {
		let client = reqwest::Client::builder()
			.user_agent(user_agent)
			.pool_idle_timeout(std::time::Duration::from_secs(90))
			.build()
			.map_err(|e| GeocodingError::Configuration(e.to_string()))?;
		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}

	async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String, GeocodingError> {
		let response = self
			.client
			.get(format!("{}{}", self.base_url, path))
			.query(query)
			.send()
			.await
			.map_err(|e| GeocodingError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			return Err(GeocodingError::Network(format!("HTTP {}", status)));
		}
		response
			.text()
			.await
			.map_err(|e| GeocodingError::Network(e.to_string()))
	}
}

#[async_trait]
impl GeocoderInterface for NominatimGeocoder {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NominatimGeocoderSchema)
	}

	async fn forward(&self, query: &str) -> Result<Coordinates, GeocodingError> {
		let body = self
			.get(
				"/search",
				&[
					("q", query.to_string()),
					("format", "jsonv2".into()),
					("limit", "1".into()),
				],
			)
			.await?;
		parse_search(query, &body)
	}

	async fn reverse(&self, coordinates: Coordinates) -> Result<ResolvedAddress, GeocodingError> {
		let body = self
			.get(
				"/reverse",
				&[
					("lat", coordinates.lat.to_string()),
					("lon", coordinates.lon.to_string()),
					("format", "jsonv2".into()),
				],
			)
			.await?;
		parse_reverse(&body)
	}
}

/// Configuration schema for NominatimGeocoder.
pub struct NominatimGeocoderSchema;

impl ConfigSchema for NominatimGeocoderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("base_url", FieldType::String).with_validator(|v| {
					match v.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("base_url must be an http(s) URL".into()),
					}
				}),
				Field::new("user_agent", FieldType::String).with_validator(|v| {
					match v.as_str() {
						Some(s) if s.trim().is_empty() => Err("user_agent cannot be empty".into()),
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a Nominatim geocoder from configuration.
///
/// Configuration parameters:
/// - `base_url`: API root (default: the public OpenStreetMap instance)
/// - `user_agent`: Sent with every request, required by the public instance's usage policy
pub fn create_geocoder(config: &toml::Value) -> Result<Box<dyn GeocoderInterface>, GeocodingError> {
	NominatimGeocoderSchema
		.validate(config)
		.map_err(|e| GeocodingError::Configuration(e.to_string()))?;

	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_BASE_URL);
	let user_agent = config
		.get("user_agent")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_USER_AGENT);

	Ok(Box::new(NominatimGeocoder::new(base_url, user_agent)?))
}

/// Registry for the Nominatim geocoder.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "nominatim";
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
	fn test_parse_search_hit() {
		let body = r#"[{"place_id":1,"lat":"28.6138954","lon":"77.2090057","display_name":"New Delhi"}]"#;
		let coords = parse_search("New Delhi", body).unwrap();
		assert!((coords.lat - 28.6138954).abs() < 1e-9);
		assert!((coords.lon - 77.2090057).abs() < 1e-9);
	}

	#[test]
	fn test_parse_search_empty_and_garbage() {
		assert!(matches!(
			parse_search("Atlantis", "[]"),
			Err(GeocodingError::NotFound(_))
		));
		assert!(matches!(
			parse_search("x", r#"[{"lat":"north","lon":"1"}]"#),
			Err(GeocodingError::InvalidResponse(_))
		));
		assert!(matches!(
			parse_search("x", "<html>rate limited</html>"),
			Err(GeocodingError::InvalidResponse(_))
		));
	}

	#[test]
	fn test_parse_reverse_prefers_city_then_town() {
		let body = r#"{"address":{"town":"Sonipat","state":"Haryana","postcode":"131001","country":"India"}}"#;
		let address = parse_reverse(body).unwrap();
		assert_eq!(address.city.as_deref(), Some("Sonipat"));
		assert_eq!(address.state.as_deref(), Some("Haryana"));

		let body = r#"{"address":{"city":"Delhi","town":"Ignored"}}"#;
		assert_eq!(parse_reverse(body).unwrap().city.as_deref(), Some("Delhi"));

		assert!(matches!(
			parse_reverse(r#"{"error":"Unable to geocode"}"#),
			Err(GeocodingError::NotFound(_))
		));
	}

	#[test]
	fn test_schema_rejects_non_http_url() {
		let config: toml::Value = toml::from_str("base_url = \"ftp://example.org\"").unwrap();
		assert!(NominatimGeocoderSchema.validate(&config).is_err());
	}
}
