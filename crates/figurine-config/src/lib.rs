//! Configuration for the figurine pipeline.
//!
//! Loads the pipeline definition from TOML: which implementation serves each
//! stage, per-stage deadlines, intake limits, the scoring oracle and the HTTP
//! API. `${VAR}` and `${VAR:-default}` references are resolved from the
//! environment before parsing.
//!
//! A file may pull in others with `include = "stages.toml"` or
//! `include = ["stages.toml", "api.toml"]`, relative to the including file.
//! Each top-level section may be defined in one file only.

mod loader;

use figurine_types::StageName;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep only the message; the default Display dumps the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub pipeline: PipelineConfig,
	#[serde(default)]
	pub intake: IntakeConfig,
	/// Stage settings keyed by stage name (`stylize`, `fuse`).
	pub stages: HashMap<String, StageConfig>,
	pub evaluation: EvaluationConfig,
	pub api: Option<ApiConfig>,
}

/// Identity and concurrency limits of the pipeline instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
	pub id: String,
	/// Upper bound on orders processed at the same time.
	#[serde(default = "default_max_concurrent_orders")]
	pub max_concurrent_orders: usize,
}

fn default_max_concurrent_orders() -> usize {
	100
}

/// Limits applied to face images before any stage is called.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntakeConfig {
	#[serde(default = "default_max_file_size")]
	pub max_file_size: usize,
	#[serde(default = "default_allowed_extensions")]
	pub allowed_extensions: Vec<String>,
}

impl Default for IntakeConfig {
	fn default() -> Self {
		Self {
			max_file_size: default_max_file_size(),
			allowed_extensions: default_allowed_extensions(),
		}
	}
}

fn default_max_file_size() -> usize {
	10 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
	[".jpg", ".jpeg", ".png", ".webp"]
		.iter()
		.map(|ext| ext.to_string())
		.collect()
}

/// Settings for one processing stage.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageConfig {
	/// Which implementation serves this stage.
	pub primary: String,
	/// Deadline for one invocation, in seconds.
	#[serde(default = "default_stage_timeout_seconds")]
	pub timeout_seconds: u64,
	/// Implementation name to raw TOML configuration.
	pub implementations: HashMap<String, toml::Value>,
}

impl StageConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_seconds)
	}

	/// Raw configuration of the primary implementation.
	pub fn primary_config(&self) -> Option<&toml::Value> {
		self.implementations.get(&self.primary)
	}
}

fn default_stage_timeout_seconds() -> u64 {
	30
}

/// Quality scoring oracle selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluationConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Maximum request body size in bytes. Face images travel base64 encoded.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	8000
}

fn default_max_request_size() -> usize {
	16 * 1024 * 1024
}

/// `${NAME}` or `${NAME:-fallback}`.
static ENV_REFERENCE: Lazy<Result<Regex, regex::Error>> =
	Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}"));

/// Largest configuration file accepted, in bytes.
const MAX_CONFIG_BYTES: usize = 1024 * 1024;

/// Expands `${NAME}` references from the environment. `${NAME:-fallback}` uses
/// the fallback when `NAME` is unset; a bare reference to an unset variable is
/// an error.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	if input.len() > MAX_CONFIG_BYTES {
		return Err(ConfigError::Validation(format!(
			"Configuration is {} bytes, limit is {}",
			input.len(),
			MAX_CONFIG_BYTES
		)));
	}

	let pattern = ENV_REFERENCE
		.as_ref()
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut unset: Option<String> = None;
	let expanded = pattern.replace_all(input, |caps: &regex::Captures<'_>| {
		let name = &caps[1];
		match (std::env::var(name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(fallback)) => fallback.as_str().to_string(),
			(Err(_), None) => {
				unset.get_or_insert_with(|| name.to_string());
				String::new()
			},
		}
	});

	match unset {
		Some(name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' is not set and has no default",
			name
		))),
		None => Ok(expanded.into_owned()),
	}
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Settings for a stage. Present for every stage once validated.
	pub fn stage(&self, stage: StageName) -> Option<&StageConfig> {
		self.stages.get(stage.as_str())
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.pipeline.id.is_empty() {
			return Err(ConfigError::Validation("Pipeline ID cannot be empty".into()));
		}
		if self.pipeline.max_concurrent_orders == 0 || self.pipeline.max_concurrent_orders > 10_000
		{
			return Err(ConfigError::Validation(
				"max_concurrent_orders must be between 1 and 10000".into(),
			));
		}

		if self.intake.max_file_size == 0 {
			return Err(ConfigError::Validation(
				"Intake max_file_size must be greater than 0".into(),
			));
		}
		if self.intake.allowed_extensions.is_empty() {
			return Err(ConfigError::Validation(
				"At least one allowed intake extension required".into(),
			));
		}
		if let Some(ext) = self
			.intake
			.allowed_extensions
			.iter()
			.find(|ext| !ext.starts_with('.') || ext.len() < 2)
		{
			return Err(ConfigError::Validation(format!(
				"Intake extension '{}' must start with '.'",
				ext
			)));
		}

		for name in self.stages.keys() {
			if name.parse::<StageName>().is_err() {
				return Err(ConfigError::Validation(format!(
					"Unknown stage '{}' in [stages]",
					name
				)));
			}
		}

		for stage in StageName::ALL {
			let config = self.stage(stage).ok_or_else(|| {
				ConfigError::Validation(format!("Missing [stages.{}] section", stage))
			})?;

			if config.primary.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Stage '{}' primary implementation cannot be empty",
					stage
				)));
			}
			if !config.implementations.contains_key(&config.primary) {
				return Err(ConfigError::Validation(format!(
					"Primary implementation '{}' for stage '{}' not found in implementations",
					config.primary, stage
				)));
			}
			if config.timeout_seconds == 0 || config.timeout_seconds > 600 {
				return Err(ConfigError::Validation(format!(
					"Stage '{}' timeout_seconds must be between 1 and 600",
					stage
				)));
			}
		}

		if self.evaluation.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Evaluation primary implementation cannot be empty".into(),
			));
		}
		if !self
			.evaluation
			.implementations
			.contains_key(&self.evaluation.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary evaluation '{}' not found in implementations",
				self.evaluation.primary
			)));
		}

		if let Some(api) = &self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation("API port cannot be 0".into()));
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string, resolving environment variables
/// first and validating afterwards.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		tracing::debug!(
			component = "config",
			pipeline_id = %config.pipeline.id,
			"Configuration validated"
		);
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	pub(crate) const MINIMAL: &str = r#"
[pipeline]
id = "test-pipeline"

[stages.stylize]
primary = "mock"
[stages.stylize.implementations.mock]

[stages.fuse]
primary = "mock"
timeout_seconds = 45
[stages.fuse.implementations.mock]

[evaluation]
primary = "fixed"
[evaluation.implementations.fixed]
"#;

	#[test]
	fn test_minimal_config_applies_defaults() {
		let config: Config = MINIMAL.parse().unwrap();

		assert_eq!(config.pipeline.id, "test-pipeline");
		assert_eq!(config.pipeline.max_concurrent_orders, 100);
		assert_eq!(config.intake.max_file_size, 10 * 1024 * 1024);
		assert_eq!(config.intake.allowed_extensions.len(), 4);

		let stylize = config.stage(StageName::Stylize).unwrap();
		assert_eq!(stylize.timeout(), Duration::from_secs(30));
		assert!(stylize.primary_config().is_some());
		assert_eq!(
			config.stage(StageName::Fuse).unwrap().timeout_seconds,
			45
		);
		assert!(config.api.is_none());
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("FIGURINE_TEST_HOST", "stylizer.internal");

		let input = "url = \"http://${FIGURINE_TEST_HOST}:${FIGURINE_TEST_PORT:-8001}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "url = \"http://stylizer.internal:8001\"");

		std::env::remove_var("FIGURINE_TEST_HOST");
	}

	#[test]
	fn test_missing_env_var_without_default() {
		let result = resolve_env_vars("key = \"${FIGURINE_DEFINITELY_UNSET_VAR}\"");
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_missing_stage_section() {
		let config = MINIMAL.replace(
			"[stages.fuse]\nprimary = \"mock\"\ntimeout_seconds = 45\n[stages.fuse.implementations.mock]\n",
			"",
		);
		let err = config.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Missing [stages.fuse] section"));
	}

	#[test]
	fn test_unknown_stage_rejected() {
		let config = format!(
			"{}\n[stages.print]\nprimary = \"mock\"\n[stages.print.implementations.mock]\n",
			MINIMAL
		);
		let err = config.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Unknown stage 'print'"));
	}

	#[test]
	fn test_primary_must_be_configured() {
		let config = MINIMAL.replacen("primary = \"mock\"", "primary = \"http\"", 1);
		let err = config.parse::<Config>().unwrap_err();
		assert!(err
			.to_string()
			.contains("Primary implementation 'http' for stage 'stylize'"));
	}

	#[test]
	fn test_timeout_bounds() {
		let config = MINIMAL.replace("timeout_seconds = 45", "timeout_seconds = 0");
		let err = config.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("timeout_seconds must be between 1 and 600"));
	}

	#[test]
	fn test_concurrency_bounds() {
		let config = MINIMAL.replace(
			"id = \"test-pipeline\"",
			"id = \"test-pipeline\"\nmax_concurrent_orders = 0",
		);
		assert!(config.parse::<Config>().is_err());
	}

	#[test]
	fn test_extensions_must_be_dot_prefixed() {
		let config = format!("{}\n[intake]\nallowed_extensions = [\"png\"]\n", MINIMAL);
		let err = config.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("must start with '.'"));
	}

	#[test]
	fn test_api_section() {
		let config = format!(
			"{}\n[api]\nenabled = true\nport = 9100\n",
			MINIMAL
		);
		let config: Config = config.parse().unwrap();
		let api = config.api.unwrap();
		assert!(api.enabled);
		assert_eq!(api.port, 9100);
		assert_eq!(api.host, "127.0.0.1");
	}
}
