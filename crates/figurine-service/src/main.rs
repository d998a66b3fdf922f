//! Main entry point for the figurine pipeline service.
//!
//! Loads the pipeline configuration, wires the configured stage and oracle
//! implementations and either processes a single image from the command line
//! or serves the HTTP API until interrupted.

use clap::Parser;
use figurine_config::Config;
use figurine_core::PipelineEngine;
use figurine_types::{FaceInput, Order, Preferences, Priority};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod apis;
mod factory_registry;
mod server;

/// Command-line arguments for the figurine service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Process this face image once, print the order as JSON and exit
	#[arg(long)]
	image: Option<PathBuf>,

	/// Target style for one-shot mode
	#[arg(long)]
	style: Option<String>,

	/// Body template for one-shot mode
	#[arg(long)]
	body_template: Option<String>,

	/// Color scheme for one-shot mode
	#[arg(long)]
	color_scheme: Option<String>,

	/// Advisory priority for one-shot mode
	#[arg(long, default_value = "normal")]
	priority: Priority,
}

impl Args {
	fn preferences(&self) -> Preferences {
		let defaults = Preferences::default();
		Preferences {
			style: self.style.clone().unwrap_or(defaults.style),
			body_template: self.body_template.clone().unwrap_or(defaults.body_template),
			color_scheme: self.color_scheme.clone().unwrap_or(defaults.color_scheme),
		}
	}
}

/// Main entry point for the figurine service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the pipeline engine from the configured implementations
/// 5. Runs one order, or serves the API until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	tracing::info!("Started figurine");

	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.pipeline.id);

	let engine = Arc::new(factory_registry::build_pipeline_from_config(config.clone())?);
	engine.initialize().await?;

	if let Some(image) = &args.image {
		let order = run_once(&engine, image, args.preferences(), args.priority).await?;
		println!("{}", serde_json::to_string_pretty(&order)?);
		engine.shutdown().await?;
		return Ok(());
	}

	let Some(api_config) = config.api.clone().filter(|api| api.enabled) else {
		return Err("API is disabled and no --image was given; nothing to do".into());
	};

	server::start_server(api_config, Arc::clone(&engine), async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!("Failed to listen for shutdown signal: {}", e);
		}
	})
	.await?;

	engine.shutdown().await?;
	tracing::info!("Stopped figurine");
	Ok(())
}

/// Reads one face image from disk and drives it through the pipeline.
async fn run_once(
	engine: &PipelineEngine,
	image: &Path,
	preferences: Preferences,
	priority: Priority,
) -> Result<Order, Box<dyn std::error::Error>> {
	let data = tokio::fs::read(image).await?;
	let filename = image
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default();

	let order = Order::new(FaceInput::new(filename, data), preferences, priority);
	Ok(engine.process(order).await?)
}
