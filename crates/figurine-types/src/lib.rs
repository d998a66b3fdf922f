//! Common types module for the figurine pipeline.
//!
//! This module defines the core data types shared by every pipeline component:
//! the order record and its lifecycle states, stage requests and outcomes,
//! quality reports, configuration schemas and API payloads. Keeping them in one
//! crate lets the stage clients, the evaluator and the orchestrator agree on a
//! single vocabulary.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Order record, lifecycle states and timestamps.
pub mod order;
/// Quality scores produced by the evaluator.
pub mod quality;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Stage names, requests, outcomes and recorded results.
pub mod stage;
/// Aggregate statistics over a batch of orders.
pub mod summary;
/// Catalog of body templates available for fusion.
pub mod templates;
/// Utility functions for formatting and serialization.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use api::*;
pub use order::*;
pub use quality::*;
pub use registry::ImplementationRegistry;
pub use stage::*;
pub use summary::OrderSummary;
pub use templates::{body_template, body_templates, BodyTemplate, TemplateDimensions};
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
