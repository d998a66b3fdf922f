//! Orchestration core of the figurine pipeline.
//!
//! Drives a submitted face image through stylization, fusion and quality
//! evaluation while tracking the order through its lifecycle. Unreachable
//! stages are replaced by placeholders; a stage that rejects the input ends
//! the order. Stage timings and outcomes feed a shared metrics collector.

pub mod builder;
pub mod engine;
pub mod fallback;
pub mod intake;
pub mod monitoring;
pub mod state;

pub use builder::{BuilderError, PipelineBuilder, PipelineFactories};
pub use engine::{EngineError, PipelineEngine};
pub use fallback::StageDecision;
pub use figurine_types::IntakeReport;
pub use intake::{ExtensionValidator, InputValidator, IntakeError};
pub use monitoring::{MetricsCollector, MetricsSummary};
pub use state::{OrderStateError, OrderStateMachine};
