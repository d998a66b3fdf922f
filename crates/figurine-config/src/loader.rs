//! Multi-file configuration loading.
//!
//! A file may list other files under `include`, either as one string or an
//! array. Includes may nest. Every top-level section must be defined by exactly
//! one file in the include graph, so fragments are merged without any deep
//! table merging.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use toml::Table;

const INCLUDE_KEY: &str = "include";

/// Walks a configuration file and its includes into one [`Config`].
pub struct ConfigLoader {
	base_path: PathBuf,
	visited: HashSet<PathBuf>,
	owners: BTreeMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			visited: HashSet::new(),
			owners: BTreeMap::new(),
		}
	}

	/// Reads `config_path` (relative to the base path unless absolute), follows
	/// its includes and validates the merged result.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let root = self.locate(&self.base_path.clone(), config_path.as_ref())?;

		let mut merged = Table::new();
		self.collect(root, &mut merged).await?;

		if self.visited.len() > 1 {
			tracing::debug!(
				component = "config",
				files = self.visited.len(),
				sections = merged.len(),
				"Merged configuration fragments"
			);
		}

		let rendered = toml::to_string(&toml::Value::Table(merged))
			.map_err(|e| ConfigError::Parse(format!("Cannot render merged config: {}", e)))?;
		rendered.parse()
	}

	/// Adds the sections of `path` and, depth first, of everything it includes.
	/// Boxed because the walk is recursive.
	fn collect<'a>(
		&'a mut self,
		path: PathBuf,
		merged: &'a mut Table,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ConfigError>> + Send + 'a>>
	{
		Box::pin(async move {
			let mut table = self.read_fragment(&path).await?;
			let includes = match table.remove(INCLUDE_KEY) {
				Some(value) => include_list(&value)?,
				None => Vec::new(),
			};

			for (section, value) in table {
				if let Some(owner) = self.owners.get(&section) {
					return Err(ConfigError::Validation(format!(
						"Duplicate section '{}' defined in both {} and {}",
						section,
						owner.display(),
						path.display()
					)));
				}
				self.owners.insert(section.clone(), path.clone());
				merged.insert(section, value);
			}

			let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
			for include in includes {
				let next = self.locate(&dir, &include)?;
				self.collect(next, merged).await?;
			}
			Ok(())
		})
	}

	async fn read_fragment(&mut self, path: &Path) -> Result<Table, ConfigError> {
		let canonical = path.canonicalize()?;
		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Include cycle: {} was already loaded",
				canonical.display()
			)));
		}

		let raw = tokio::fs::read_to_string(&canonical).await?;
		let expanded = resolve_env_vars(&raw)?;
		Ok(toml::from_str(&expanded)?)
	}

	/// Resolves `path` against `dir` and checks that it exists.
	fn locate(&self, dir: &Path, path: &Path) -> Result<PathBuf, ConfigError> {
		let candidate = if path.is_absolute() {
			path.to_path_buf()
		} else {
			dir.join(path)
		};
		if candidate.is_file() {
			Ok(candidate)
		} else {
			Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", candidate.display()),
			)))
		}
	}
}

fn include_list(value: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match value {
		toml::Value::String(single) => Ok(vec![PathBuf::from(single)]),
		toml::Value::Array(items) => items
			.iter()
			.map(|item| {
				item.as_str().map(PathBuf::from).ok_or_else(|| {
					ConfigError::Validation("`include` entries must be strings".into())
				})
			})
			.collect(),
		_ => Err(ConfigError::Validation(
			"`include` must be a string or an array of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const PIPELINE: &str = r#"
[pipeline]
id = "layered"
max_concurrent_orders = 8
"#;

	const STAGES: &str = r#"
[stages.stylize]
primary = "mock"
[stages.stylize.implementations.mock]

[stages.fuse]
primary = "mock"
[stages.fuse.implementations.mock]
"#;

	const EVALUATION: &str = r#"
[evaluation]
primary = "fixed"
[evaluation.implementations.fixed]
"#;

	fn write(dir: &TempDir, name: &str, content: &str) {
		let path = dir.path().join(name);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).unwrap();
		}
		fs::write(path, content).unwrap();
	}

	#[tokio::test]
	async fn loads_a_standalone_file() {
		let dir = TempDir::new().unwrap();
		write(&dir, "config.toml", &format!("{PIPELINE}{STAGES}{EVALUATION}"));

		let config = ConfigLoader::new(dir.path())
			.load_config("config.toml")
			.await
			.unwrap();
		assert_eq!(config.pipeline.id, "layered");
		assert_eq!(config.pipeline.max_concurrent_orders, 8);
	}

	#[tokio::test]
	async fn merges_array_includes() {
		let dir = TempDir::new().unwrap();
		write(
			&dir,
			"main.toml",
			&format!("include = [\"stages.toml\", \"evaluation.toml\"]\n{PIPELINE}"),
		);
		write(&dir, "stages.toml", STAGES);
		write(&dir, "evaluation.toml", EVALUATION);

		let config = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap();
		assert_eq!(config.evaluation.primary, "fixed");
		assert_eq!(config.stages.len(), 2);
	}

	#[tokio::test]
	async fn nested_includes_resolve_relative_to_their_file() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = \"parts/stages.toml\"\n{PIPELINE}"));
		write(
			&dir,
			"parts/stages.toml",
			&format!("include = \"evaluation.toml\"\n{STAGES}"),
		);
		write(&dir, "parts/evaluation.toml", EVALUATION);

		let path = dir.path().join("main.toml");
		let config = Config::from_file(path.to_str().unwrap()).await.unwrap();
		assert_eq!(config.pipeline.id, "layered");
		assert_eq!(config.evaluation.primary, "fixed");
	}

	#[tokio::test]
	async fn rejects_a_section_defined_twice() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = [\"other.toml\"]\n{PIPELINE}"));
		write(&dir, "other.toml", "[pipeline]\nid = \"second\"\n");

		let err = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err();
		assert!(err.to_string().contains("Duplicate section 'pipeline'"));
	}

	#[tokio::test]
	async fn rejects_include_cycles() {
		let dir = TempDir::new().unwrap();
		write(&dir, "a.toml", &format!("include = \"b.toml\"\n{PIPELINE}"));
		write(&dir, "b.toml", "include = \"a.toml\"\n");

		let err = ConfigLoader::new(dir.path())
			.load_config("a.toml")
			.await
			.unwrap_err();
		assert!(err.to_string().contains("already loaded"));
	}

	#[tokio::test]
	async fn rejects_non_string_include_entries() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = [1]\n{PIPELINE}"));

		let err = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[tokio::test]
	async fn missing_file_is_an_io_error() {
		let dir = TempDir::new().unwrap();
		let result = ConfigLoader::new(dir.path()).load_config("absent.toml").await;
		assert!(matches!(result, Err(ConfigError::Io(_))));
	}
}
