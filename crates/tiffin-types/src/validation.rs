//! Configuration validation utilities.
//!
//! Pluggable implementations describe their TOML table with a [`Schema`] of
//! required and optional [`Field`]s. Nested tables, arrays, numeric bounds and
//! custom validators are supported, and errors carry the dotted field path.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// Error that occurs when a required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// Error that occurs when a field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// Error that occurs when field type is incorrect.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	/// Error that occurs when deserialization fails.
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

/// Type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	/// Float with optional inclusive bounds. Integers are accepted.
	Float { min: Option<f64>, max: Option<f64> },
	Boolean,
	/// Array whose elements all share one type.
	Array(Box<FieldType>),
	/// Nested table validated by its own schema.
	Table(Schema),
}

/// Custom validator run after type checking.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field in a schema.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Attaches a custom validator returning an error message on failure.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		validate_field_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Validation schema for a TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	///
	/// Required fields must be present. Every present field is type checked,
	/// its validator is run, and nested tables are validated recursively.
	/// Unknown keys are ignored.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn type_mismatch(field_name: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field_name.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn out_of_range<T: std::fmt::Display>(
	field_name: &str,
	value: T,
	bound: T,
	min: bool,
) -> ValidationError {
	let relation = if min { "less than minimum" } else { "greater than maximum" };
	ValidationError::InvalidValue {
		field: field_name.to_string(),
		message: format!("Value {} is {} {}", value, relation, bound),
	}
}

fn validate_field_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String => {
			if !value.is_str() {
				return Err(type_mismatch(field_name, "string", value));
			}
		},
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| type_mismatch(field_name, "integer", value))?;
			if let Some(min_val) = min.filter(|m| int_val < *m) {
				return Err(out_of_range(field_name, int_val, min_val, true));
			}
			if let Some(max_val) = max.filter(|m| int_val > *m) {
				return Err(out_of_range(field_name, int_val, max_val, false));
			}
		},
		FieldType::Float { min, max } => {
			let float_val = value
				.as_float()
				.or_else(|| value.as_integer().map(|i| i as f64))
				.ok_or_else(|| type_mismatch(field_name, "float", value))?;
			if let Some(min_val) = min.filter(|m| float_val < *m) {
				return Err(out_of_range(field_name, float_val, min_val, true));
			}
			if let Some(max_val) = max.filter(|m| float_val > *m) {
				return Err(out_of_range(field_name, float_val, max_val, false));
			}
		},
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(type_mismatch(field_name, "boolean", value));
			}
		},
		FieldType::Array(inner_type) => {
			let array = value
				.as_array()
				.ok_or_else(|| type_mismatch(field_name, "array", value))?;
			for (i, item) in array.iter().enumerate() {
				validate_field_type(&format!("{}[{}]", field_name, i), item, inner_type)?;
			}
		},
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| match e {
				ValidationError::MissingField(f) => {
					ValidationError::MissingField(format!("{}.{}", field_name, f))
				},
				ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
					field: format!("{}.{}", field_name, field),
					message,
				},
				ValidationError::TypeMismatch {
					field,
					expected,
					actual,
				} => ValidationError::TypeMismatch {
					field: format!("{}.{}", field_name, field),
					expected,
					actual,
				},
				other => other,
			})?;
		},
	}

	Ok(())
}

/// A configuration schema that can validate TOML values.
///
/// Implemented by every pluggable backend so its table can be checked
/// before the implementation is constructed.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(s: &str) -> toml::Value {
		toml::from_str(s).unwrap()
	}

	#[test]
	fn test_missing_required_field() {
		let schema = Schema::new(vec![Field::new("base_url", FieldType::String)], vec![]);
		let err = schema.validate(&parse("timeout = 3")).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(f) if f == "base_url"));
	}

	#[test]
	fn test_float_bounds_accept_integers() {
		let schema = Schema::new(
			vec![Field::new(
				"radius_km",
				FieldType::Float {
					min: Some(0.0),
					max: Some(100.0),
				},
			)],
			vec![],
		);
		assert!(schema.validate(&parse("radius_km = 20")).is_ok());
		assert!(schema.validate(&parse("radius_km = 12.5")).is_ok());
		assert!(matches!(
			schema.validate(&parse("radius_km = 250.0")),
			Err(ValidationError::InvalidValue { .. })
		));
	}

	#[test]
	fn test_nested_table_reports_path() {
		let inner = Schema::new(
			vec![Field::new("lat", FieldType::Float { min: None, max: None })],
			vec![],
		);
		let schema = Schema::new(vec![Field::new("origin", FieldType::Table(inner))], vec![]);

		let err = schema.validate(&parse("[origin]\nlon = 1.0")).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(f) if f == "origin.lat"));
	}

	#[test]
	fn test_custom_validator() {
		let schema = Schema::new(
			vec![Field::new("user_agent", FieldType::String).with_validator(|v| {
				if v.as_str().is_some_and(|s| s.trim().is_empty()) {
					Err("must not be blank".into())
				} else {
					Ok(())
				}
			})],
			vec![],
		);
		assert!(schema.validate(&parse("user_agent = \"tiffin\"")).is_ok());
		assert!(schema.validate(&parse("user_agent = \" \"")).is_err());
	}
}
