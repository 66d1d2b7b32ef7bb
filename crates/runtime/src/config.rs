//! Session configuration.
//!
//! ```toml
//! processing-budget-ms = 20
//! implicit-batching = "per-turn"   # or "per-operation"
//! echo-matching = "identity"       # or "order"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::budget::{DEFAULT_PROCESSING_BUDGET, TimeBudget};
use crate::error::ConfigError;
use crate::kernel::EchoMatching;
use crate::scheduler::ImplicitBatching;

/// Tunables for a [`crate::DocumentSession`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SessionConfig {
	/// Time a turn may spend on standalone operations before yielding.
	#[serde(default = "default_budget_ms")]
	pub processing_budget_ms: u64,
	/// Grouping of standalone operations into batches.
	#[serde(default)]
	pub implicit_batching: ImplicitBatching,
	/// How kernels pair echoes with pending operations.
	#[serde(default)]
	pub echo_matching: EchoMatching,
}

fn default_budget_ms() -> u64 {
	DEFAULT_PROCESSING_BUDGET.as_millis() as u64
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			processing_budget_ms: default_budget_ms(),
			implicit_batching: ImplicitBatching::default(),
			echo_matching: EchoMatching::default(),
		}
	}
}

impl SessionConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(source)?;
		config.validate()?;
		Ok(config)
	}

	/// Rejects out-of-range values.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.processing_budget_ms == 0 {
			return Err(ConfigError::Invalid {
				field: "processing-budget-ms",
				reason: "must be greater than zero".into(),
			});
		}
		Ok(())
	}

	/// The configured processing budget.
	pub fn budget(&self) -> TimeBudget {
		TimeBudget::new(Duration::from_millis(self.processing_budget_ms))
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn test_empty_document_uses_defaults() {
		assert_eq!(SessionConfig::from_toml_str("").unwrap(), SessionConfig::default());
		assert_eq!(SessionConfig::default().budget().budget(), DEFAULT_PROCESSING_BUDGET);
	}

	#[test]
	fn test_parse_all_fields() {
		let config = SessionConfig::from_toml_str(
			r#"
			processing-budget-ms = 5
			implicit-batching = "per-operation"
			echo-matching = "order"
			"#,
		)
		.unwrap();
		assert_eq!(
			config,
			SessionConfig {
				processing_budget_ms: 5,
				implicit_batching: ImplicitBatching::PerOperation,
				echo_matching: EchoMatching::Order,
			}
		);
	}

	#[test]
	fn test_zero_budget_is_invalid() {
		let err = SessionConfig::from_toml_str("processing-budget-ms = 0").unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { field: "processing-budget-ms", .. }));
	}

	#[test]
	fn test_unknown_field_is_a_parse_error() {
		let err = SessionConfig::from_toml_str("max-catch-up = 3").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}
}
