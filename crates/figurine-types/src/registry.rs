//! Self-registration for pluggable implementations.

/// Ties an implementation to the name it is selected by in configuration.
///
/// Each stage client and quality oracle module exposes a `Registry` struct
/// implementing this trait. The crate-level `get_all_implementations()`
/// collects `(NAME, factory())` pairs, which the service wires into the
/// pipeline builder. For example, `NAME = "http"` is what selects the
/// implementation under `[stages.stylize.implementations.http]`.
pub trait ImplementationRegistry {
	/// Key used in `implementations` tables and `primary` fields.
	const NAME: &'static str;

	/// Factory signature of the implementation family.
	type Factory;

	fn factory() -> Self::Factory;
}
