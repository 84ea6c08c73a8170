//! Chef and location types used for discovery.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
	pub lat: f64,
	pub lon: f64,
}

impl Coordinates {
	pub fn new(lat: f64, lon: f64) -> Self {
		Self { lat, lon }
	}

	/// Latitude within ±90 and longitude within ±180.
	pub fn is_valid(&self) -> bool {
		self.lat.is_finite()
			&& self.lon.is_finite()
			&& (-90.0..=90.0).contains(&self.lat)
			&& (-180.0..=180.0).contains(&self.lon)
	}

	/// Great-circle distance in kilometres (Haversine formula).
	pub fn distance_km(&self, other: &Coordinates) -> f64 {
		let d_lat = (other.lat - self.lat).to_radians();
		let d_lon = (other.lon - self.lon).to_radians();
		let a = (d_lat / 2.0).sin().powi(2)
			+ self.lat.to_radians().cos()
				* other.lat.to_radians().cos()
				* (d_lon / 2.0).sin().powi(2);
		// Rounding can push `a` just past 1 for antipodal points
		let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();
		EARTH_RADIUS_KM * c
	}
}

/// Address components returned by a reverse lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAddress {
	#[serde(default)]
	pub city: Option<String>,
	#[serde(default)]
	pub state: Option<String>,
	#[serde(default)]
	pub postcode: Option<String>,
	#[serde(default)]
	pub country: Option<String>,
}

/// An approved chef.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chef {
	pub id: String,
	pub name: String,
	/// Free-text location as entered by the chef.
	pub location: String,
	/// Coordinates resolved ahead of time, if any.
	#[serde(default)]
	pub coordinates: Option<Coordinates>,
	#[serde(default)]
	pub cuisines: Vec<String>,
	/// Application this chef was provisioned from.
	#[serde(default)]
	pub application_id: Option<String>,
}

/// How a chef's distance was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
	/// Coordinates stored on the chef record.
	Stored,
	/// Coordinates resolved by a geocoder.
	Geocoded,
	/// Coarse city-name comparison after geocoding failed.
	CityFallback,
}

/// A chef with its distance from the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyChef {
	pub chef: Chef,
	pub distance_km: f64,
	pub method: MatchMethod,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_distance_to_self_is_zero() {
		let delhi = Coordinates::new(28.6139, 77.2090);
		assert!(delhi.distance_km(&delhi).abs() < 1e-9);
	}

	#[test]
	fn test_distance_is_symmetric() {
		let delhi = Coordinates::new(28.6139, 77.2090);
		let mumbai = Coordinates::new(19.0760, 72.8777);
		let there = delhi.distance_km(&mumbai);
		let back = mumbai.distance_km(&delhi);
		assert!((there - back).abs() < 1e-9);
		// Roughly 1150 km as the crow flies
		assert!((1100.0..1200.0).contains(&there));
	}

	#[test]
	fn test_coordinate_validity() {
		assert!(Coordinates::new(28.6, 77.2).is_valid());
		assert!(!Coordinates::new(91.0, 0.0).is_valid());
		assert!(!Coordinates::new(0.0, f64::NAN).is_valid());
	}
}
