//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable module (storage backends, geocoders) exposes a `Registry`
/// struct implementing this trait so the binary can wire implementations by
/// the name used in configuration.
pub trait ImplementationRegistry {
	/// Name used in configuration, e.g. `"memory"` for
	/// `[storage.implementations.memory]` or `"nominatim"` for
	/// `[geocoding.implementations.nominatim]`.
	const NAME: &'static str;

	/// Factory function type provided by the module.
	type Factory;

	/// Returns the factory that builds this implementation from its config table.
	fn factory() -> Self::Factory;
}
