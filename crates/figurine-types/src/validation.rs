//! Configuration validation for pluggable implementations.
//!
//! Stage clients and quality oracles are selected by name from the TOML
//! configuration. Each implementation describes the table it accepts as a
//! [`Schema`]; the factory validates the raw TOML against it before building
//! anything, so a typo in an endpoint or a score outside `[0, 1]` fails at
//! startup instead of mid-order.

use std::fmt::Display;
use thiserror::Error;

/// Errors produced while validating an implementation's configuration table.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: &'static str,
	},
}

impl ValidationError {
	/// Re-roots the failing field under `parent`, giving `parent.field`.
	fn under(self, parent: &str) -> Self {
		let join = |field: String| format!("{}.{}", parent, field);
		match self {
			Self::MissingField(field) => Self::MissingField(join(field)),
			Self::InvalidValue { field, message } => Self::InvalidValue {
				field: join(field),
				message,
			},
			Self::TypeMismatch {
				field,
				expected,
				actual,
			} => Self::TypeMismatch {
				field: join(field),
				expected,
				actual,
			},
		}
	}
}

/// Expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	/// Floating point number with inclusive bounds. Integers are accepted and widened.
	Float { min: Option<f64>, max: Option<f64> },
	Boolean,
	/// Array whose elements all have the inner type.
	Array(Box<FieldType>),
	/// Nested table validated by its own schema.
	Table(Schema),
}

impl FieldType {
	/// Shorthand for a float constrained to `[0, 1]`, the range of every score.
	pub fn unit_interval() -> Self {
		FieldType::Float {
			min: Some(0.0),
			max: Some(1.0),
		}
	}

	fn check(&self, path: &str, value: &toml::Value) -> Result<(), ValidationError> {
		let mismatch = |expected: &'static str| ValidationError::TypeMismatch {
			field: path.to_string(),
			expected,
			actual: value.type_str(),
		};

		match self {
			FieldType::String if value.is_str() => Ok(()),
			FieldType::String => Err(mismatch("string")),
			FieldType::Boolean if value.is_bool() => Ok(()),
			FieldType::Boolean => Err(mismatch("boolean")),
			FieldType::Integer { min, max } => {
				let n = value.as_integer().ok_or_else(|| mismatch("integer"))?;
				within(path, n, *min, *max)
			},
			FieldType::Float { min, max } => {
				let n = value
					.as_float()
					.or_else(|| value.as_integer().map(|i| i as f64))
					.ok_or_else(|| mismatch("float"))?;
				if n.is_nan() {
					return Err(ValidationError::InvalidValue {
						field: path.to_string(),
						message: "Value is not a number".to_string(),
					});
				}
				within(path, n, *min, *max)
			},
			FieldType::Array(element) => {
				let items = value.as_array().ok_or_else(|| mismatch("array"))?;
				items
					.iter()
					.enumerate()
					.try_for_each(|(i, item)| element.check(&format!("{}[{}]", path, i), item))
			},
			FieldType::Table(schema) => schema.validate(value).map_err(|e| e.under(path)),
		}
	}
}

fn within<T>(path: &str, n: T, min: Option<T>, max: Option<T>) -> Result<(), ValidationError>
where
	T: PartialOrd + Display + Copy,
{
	let message = match (min, max) {
		(Some(lo), _) if n < lo => format!("Value {} is less than minimum {}", n, lo),
		(_, Some(hi)) if n > hi => format!("Value {} is greater than maximum {}", n, hi),
		_ => return Ok(()),
	};
	Err(ValidationError::InvalidValue {
		field: path.to_string(),
		message,
	})
}

/// Custom check run after the type check passes. Returns an error message on failure.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field with a type and an optional custom validator.
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

	/// Attaches a custom validator that runs after the type check.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		self.field_type.check(&self.name, value)?;
		match &self.validator {
			Some(validator) => validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			}),
			None => Ok(()),
		}
	}
}

/// Required and optional fields of one configuration table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML table against this schema.
	///
	/// Every required field must be present; optional fields are checked only
	/// when present. Nested tables report failures with a dotted path, for
	/// example `scores.face_similarity`.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let Some(table) = config.as_table() else {
			return Err(ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table",
				actual: config.type_str(),
			});
		};

		for field in &self.required {
			match table.get(&field.name) {
				Some(value) => field.check(value)?,
				None => return Err(ValidationError::MissingField(field.name.clone())),
			}
		}
		self.optional
			.iter()
			.filter_map(|field| table.get(&field.name).map(|value| (field, value)))
			.try_for_each(|(field, value)| field.check(value))
	}
}

/// Validator for one implementation's configuration table.
///
/// Every stage client and quality oracle exposes one through its
/// `config_schema()` method.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
