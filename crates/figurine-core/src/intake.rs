//! Intake validation.
//!
//! Gatekeeps face images before any stage is called. Only the declared
//! filename and the byte count are inspected; decoding the image is left to
//! the stages themselves.

use figurine_config::IntakeConfig;
use figurine_types::IntakeReport;
use thiserror::Error;

/// Reasons an input is refused at intake.
#[derive(Debug, Error, PartialEq)]
pub enum IntakeError {
	#[error("Empty image input")]
	Empty,
	#[error("Image too large: {size} bytes (max: {max} bytes)")]
	TooLarge { size: usize, max: usize },
	#[error("Unsupported file extension '{extension}'. Allowed: [{allowed}]")]
	UnsupportedExtension { extension: String, allowed: String },
}

/// Validation collaborator consulted before the first stage.
pub trait InputValidator: Send + Sync {
	fn validate(&self, data: &[u8], filename: &str) -> Result<IntakeReport, IntakeError>;
}

/// Checks size limits and the filename extension.
#[derive(Debug, Clone)]
pub struct ExtensionValidator {
	max_file_size: usize,
	allowed_extensions: Vec<String>,
}

impl ExtensionValidator {
	pub fn new(max_file_size: usize, allowed_extensions: Vec<String>) -> Self {
		Self {
			max_file_size,
			allowed_extensions: allowed_extensions
				.into_iter()
				.map(|ext| ext.to_ascii_lowercase())
				.collect(),
		}
	}

	pub fn from_config(config: &IntakeConfig) -> Self {
		Self::new(config.max_file_size, config.allowed_extensions.clone())
	}
}

impl Default for ExtensionValidator {
	fn default() -> Self {
		Self::from_config(&IntakeConfig::default())
	}
}

impl InputValidator for ExtensionValidator {
	fn validate(&self, data: &[u8], filename: &str) -> Result<IntakeReport, IntakeError> {
		if data.is_empty() {
			return Err(IntakeError::Empty);
		}
		if data.len() > self.max_file_size {
			return Err(IntakeError::TooLarge {
				size: data.len(),
				max: self.max_file_size,
			});
		}

		let extension = filename
			.rfind('.')
			.map(|idx| filename[idx..].to_ascii_lowercase())
			.unwrap_or_default();
		if !self.allowed_extensions.contains(&extension) {
			return Err(IntakeError::UnsupportedExtension {
				extension,
				allowed: self.allowed_extensions.join(", "),
			});
		}

		let format = match extension.trim_start_matches('.') {
			"jpg" => "jpeg".to_string(),
			other => other.to_string(),
		};

		Ok(IntakeReport {
			filename: filename.to_string(),
			size: data.len(),
			format,
		})
	}
}
