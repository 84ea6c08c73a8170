//! Chef discovery endpoint.

use tiffin_core::MarketplaceEngine;
use tiffin_types::{APIError, Coordinates, NearbyQuery, NearbyResponse};

pub async fn nearby(
	engine: &MarketplaceEngine,
	query: NearbyQuery,
) -> Result<NearbyResponse, APIError> {
	let customer = Coordinates::new(query.lat, query.lon);
	if !customer.is_valid() {
		return Err(APIError::bad_request(
			"INVALID_COORDINATES",
			format!("lat/lon out of range: {}, {}", query.lat, query.lon),
		));
	}

	let (customer_city, chefs) = engine
		.nearby_chefs(customer, query.city)
		.await
		.map_err(|e| APIError::internal(e.to_string()))?;

	Ok(NearbyResponse {
		customer_city,
		chefs,
	})
}
