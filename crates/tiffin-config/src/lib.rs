//! Configuration module for the tiffin marketplace.
//!
//! Configuration is read from TOML, with `${VAR}` and `${VAR:-default}`
//! environment substitution, and validated before use.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this marketplace instance.
	pub marketplace: MarketplaceConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Polling synchronizer settings.
	#[serde(default)]
	pub tracking: TrackingConfig,
	/// Nearby chef matching settings.
	#[serde(default)]
	pub nearby: NearbyConfig,
	/// Geocoder chain settings.
	#[serde(default)]
	pub geocoding: GeocodingConfig,
	/// Order and application workflow settings.
	#[serde(default)]
	pub lifecycle: LifecycleConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Identity of this marketplace instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketplaceConfig {
	/// Unique identifier used in logs.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Polling synchronizer settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
	/// Seconds between order re-fetches.
	#[serde(default = "default_poll_interval_seconds")]
	pub poll_interval_seconds: u64,
}

impl Default for TrackingConfig {
	fn default() -> Self {
		Self {
			poll_interval_seconds: default_poll_interval_seconds(),
		}
	}
}

fn default_poll_interval_seconds() -> u64 {
	10
}

/// Nearby chef matching settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NearbyConfig {
	/// Chefs further than this are dropped.
	#[serde(default = "default_radius_km")]
	pub radius_km: f64,
	/// Assumed distance when geocoding fails but the city names match.
	#[serde(default = "default_fallback_match_km")]
	pub fallback_match_km: f64,
	/// Assumed distance when geocoding fails and the city names differ.
	#[serde(default = "default_fallback_miss_km")]
	pub fallback_miss_km: f64,
	/// Upper bound on geocoder lookups in flight for one listing.
	#[serde(default = "default_max_concurrent_lookups")]
	pub max_concurrent_lookups: usize,
}

impl Default for NearbyConfig {
	fn default() -> Self {
		Self {
			radius_km: default_radius_km(),
			fallback_match_km: default_fallback_match_km(),
			fallback_miss_km: default_fallback_miss_km(),
			max_concurrent_lookups: default_max_concurrent_lookups(),
		}
	}
}

fn default_radius_km() -> f64 {
	20.0
}

fn default_fallback_match_km() -> f64 {
	5.0
}

fn default_fallback_miss_km() -> f64 {
	50.0
}

fn default_max_concurrent_lookups() -> usize {
	8
}

/// Geocoder chain settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeocodingConfig {
	/// Resolver names, tried in this order.
	#[serde(default)]
	pub resolvers: Vec<String>,
	/// Per-resolver lookup timeout.
	#[serde(default = "default_geocoding_timeout_seconds")]
	pub timeout_seconds: u64,
	/// Map of geocoder implementation names to their configurations.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

impl Default for GeocodingConfig {
	fn default() -> Self {
		Self {
			resolvers: Vec::new(),
			timeout_seconds: default_geocoding_timeout_seconds(),
			implementations: HashMap::new(),
		}
	}
}

fn default_geocoding_timeout_seconds() -> u64 {
	5
}

/// Order and application workflow settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleConfig {
	/// Upgrade records that predate the delivery ledger when the engine starts.
	#[serde(default = "default_migrate_legacy_on_start")]
	pub migrate_legacy_on_start: bool,
	/// Maximum number of event handlers running at once.
	#[serde(default = "default_handler_concurrency")]
	pub handler_concurrency: usize,
}

impl Default for LifecycleConfig {
	fn default() -> Self {
		Self {
			migrate_legacy_on_start: default_migrate_legacy_on_start(),
			handler_concurrency: default_handler_concurrency(),
		}
	}
}

fn default_migrate_legacy_on_start() -> bool {
	true
}

fn default_handler_concurrency() -> usize {
	100
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration. Permissive when absent.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)));
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.marketplace.id.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Marketplace ID cannot be empty".into(),
			));
		}

		// Storage
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		// Tracking
		if !(1..=3600).contains(&self.tracking.poll_interval_seconds) {
			return Err(ConfigError::Validation(
				"tracking.poll_interval_seconds must be between 1 and 3600".into(),
			));
		}

		self.validate_nearby()?;
		self.validate_geocoding()?;

		if self.lifecycle.handler_concurrency == 0 {
			return Err(ConfigError::Validation(
				"lifecycle.handler_concurrency must be greater than 0".into(),
			));
		}

		if let Some(api) = &self.api {
			if api.timeout_seconds == 0 {
				return Err(ConfigError::Validation(
					"api.timeout_seconds must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}

	fn validate_nearby(&self) -> Result<(), ConfigError> {
		let nearby = &self.nearby;
		let finite_non_negative = |v: f64| v.is_finite() && v >= 0.0;

		if !finite_non_negative(nearby.radius_km) || nearby.radius_km == 0.0 {
			return Err(ConfigError::Validation(
				"nearby.radius_km must be a positive number".into(),
			));
		}
		if !finite_non_negative(nearby.fallback_match_km)
			|| nearby.fallback_match_km > nearby.radius_km
		{
			return Err(ConfigError::Validation(format!(
				"nearby.fallback_match_km must be between 0 and radius_km ({})",
				nearby.radius_km
			)));
		}
		if !nearby.fallback_miss_km.is_finite() || nearby.fallback_miss_km <= nearby.radius_km {
			return Err(ConfigError::Validation(format!(
				"nearby.fallback_miss_km must be greater than radius_km ({})",
				nearby.radius_km
			)));
		}
		if !(1..=64).contains(&nearby.max_concurrent_lookups) {
			return Err(ConfigError::Validation(
				"nearby.max_concurrent_lookups must be between 1 and 64".into(),
			));
		}
		Ok(())
	}

	fn validate_geocoding(&self) -> Result<(), ConfigError> {
		let geocoding = &self.geocoding;
		let mut seen = HashSet::new();

		for name in &geocoding.resolvers {
			if !seen.insert(name.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Geocoding resolver '{}' is listed more than once",
					name
				)));
			}
			if !geocoding.implementations.contains_key(name) {
				return Err(ConfigError::Validation(format!(
					"Geocoding resolver '{}' not found in implementations",
					name
				)));
			}
		}
		if !(1..=60).contains(&geocoding.timeout_seconds) {
			return Err(ConfigError::Validation(
				"geocoding.timeout_seconds must be between 1 and 60".into(),
			));
		}
		Ok(())
	}
}

/// Parses a TOML string, resolving environment variables and validating
/// the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
