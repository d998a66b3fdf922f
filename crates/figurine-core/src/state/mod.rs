//! State management for orders within the pipeline.
//!
//! This module provides the state machine that validates and applies every
//! lifecycle change of an order.

pub mod order;

pub use order::{OrderStateError, OrderStateMachine};
