//! Small helpers shared across the pipeline crates.

pub mod base64_bytes;
pub mod formatting;
pub mod helpers;

pub use formatting::{round_to, truncate_id};
pub use helpers::current_timestamp;
