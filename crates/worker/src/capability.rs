//! Capability declarations and their registration-time resolution.
//!
//! A language registration declares which editor capabilities its worker
//! serves. The declaration is a tagged choice: take the full default set, or
//! spell out an explicit subset with per-capability options. It is resolved
//! exactly once, at registration, into a [`ResolvedCapabilities`] value that
//! the rest of the runtime consumes; nothing downstream re-interprets the
//! raw configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Completion trigger characters used when a registration does not override
/// them.
pub const DEFAULT_TRIGGER_CHARACTERS: &[&str] = &[":", "$", "@", "(", "."];

/// Debounce applied to diagnostics when a registration does not override it.
pub const DEFAULT_DIAGNOSTIC_DEBOUNCE: Duration = Duration::from_millis(500);

/// The closed set of capabilities a worker can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
	Hover,
	Completion,
	Diagnostics,
	Formatting,
}

impl Capability {
	pub const ALL: [Capability; 4] = [
		Capability::Hover,
		Capability::Completion,
		Capability::Diagnostics,
		Capability::Formatting,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Capability::Hover => "hover",
			Capability::Completion => "completion",
			Capability::Diagnostics => "diagnostics",
			Capability::Formatting => "formatting",
		}
	}
}

impl fmt::Display for Capability {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// How a registration declares its capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum CapabilityConfig {
	/// Serve every capability with default options.
	#[default]
	AllDefaults,
	/// Serve exactly the listed subset.
	Explicit(CapabilitySet),
}

impl CapabilityConfig {
	/// Resolve the declaration into the concrete set used at runtime.
	pub fn resolve(&self) -> ResolvedCapabilities {
		match self {
			CapabilityConfig::AllDefaults => ResolvedCapabilities::all_defaults(),
			CapabilityConfig::Explicit(set) => ResolvedCapabilities {
				hover: set.hover,
				completion: set.completion.as_ref().map(CompletionConfig::resolve),
				diagnostics: set.diagnostics.as_ref().map(DiagnosticsConfig::resolve),
				formatting: set.formatting,
			},
		}
	}
}

/// Explicit capability subset for [`CapabilityConfig::Explicit`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitySet {
	pub hover: bool,
	pub completion: Option<CompletionConfig>,
	pub diagnostics: Option<DiagnosticsConfig>,
	pub formatting: bool,
}

/// Per-registration completion options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
	/// Overrides [`DEFAULT_TRIGGER_CHARACTERS`] when non-empty.
	pub trigger_characters: Vec<String>,
}

impl CompletionConfig {
	fn resolve(&self) -> ResolvedCompletion {
		let trigger_characters = if self.trigger_characters.is_empty() {
			DEFAULT_TRIGGER_CHARACTERS.iter().map(|c| (*c).to_owned()).collect()
		} else {
			self.trigger_characters.clone()
		};
		ResolvedCompletion { trigger_characters }
	}
}

/// Per-registration diagnostics options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
	/// Overrides [`DEFAULT_DIAGNOSTIC_DEBOUNCE`] when set, in milliseconds.
	pub debounce_ms: Option<u64>,
}

impl DiagnosticsConfig {
	fn resolve(&self) -> ResolvedDiagnostics {
		ResolvedDiagnostics {
			debounce: self
				.debounce_ms
				.map(Duration::from_millis)
				.unwrap_or(DEFAULT_DIAGNOSTIC_DEBOUNCE),
		}
	}
}

/// Concrete completion settings after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCompletion {
	pub trigger_characters: Vec<String>,
}

/// Concrete diagnostics settings after resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedDiagnostics {
	pub debounce: Duration,
}

/// The capability set a registration actually serves.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCapabilities {
	pub hover: bool,
	pub completion: Option<ResolvedCompletion>,
	pub diagnostics: Option<ResolvedDiagnostics>,
	pub formatting: bool,
}

impl ResolvedCapabilities {
	pub fn all_defaults() -> Self {
		Self {
			hover: true,
			completion: Some(CompletionConfig::default().resolve()),
			diagnostics: Some(DiagnosticsConfig::default().resolve()),
			formatting: true,
		}
	}

	pub fn none() -> Self {
		Self {
			hover: false,
			completion: None,
			diagnostics: None,
			formatting: false,
		}
	}

	pub fn contains(&self, capability: Capability) -> bool {
		match capability {
			Capability::Hover => self.hover,
			Capability::Completion => self.completion.is_some(),
			Capability::Diagnostics => self.diagnostics.is_some(),
			Capability::Formatting => self.formatting,
		}
	}

	/// Enabled capabilities in declaration order.
	pub fn enabled(&self) -> impl Iterator<Item = Capability> + '_ {
		Capability::ALL.into_iter().filter(|c| self.contains(*c))
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn all_defaults_enables_everything() {
		let resolved = CapabilityConfig::AllDefaults.resolve();
		for capability in Capability::ALL {
			assert!(resolved.contains(capability), "{capability} missing");
		}
		let completion = resolved.completion.unwrap();
		assert_eq!(completion.trigger_characters.len(), DEFAULT_TRIGGER_CHARACTERS.len());
		assert_eq!(resolved.diagnostics.unwrap().debounce, DEFAULT_DIAGNOSTIC_DEBOUNCE);
	}

	#[test]
	fn explicit_subset_resolves_only_what_it_names() {
		let config = CapabilityConfig::Explicit(CapabilitySet {
			hover: true,
			completion: Some(CompletionConfig {
				trigger_characters: vec!["{".to_owned()],
			}),
			diagnostics: None,
			formatting: false,
		});
		let resolved = config.resolve();
		assert!(resolved.hover);
		assert!(!resolved.formatting);
		assert!(resolved.diagnostics.is_none());
		assert_eq!(
			resolved.completion.as_ref().unwrap().trigger_characters,
			vec!["{".to_owned()]
		);
		assert_eq!(
			resolved.enabled().collect::<Vec<_>>(),
			vec![Capability::Hover, Capability::Completion]
		);
	}

	#[test]
	fn empty_trigger_list_falls_back_to_defaults() {
		let config = CapabilityConfig::Explicit(CapabilitySet {
			completion: Some(CompletionConfig::default()),
			..CapabilitySet::default()
		});
		let resolved = config.resolve();
		assert_eq!(
			resolved.completion.unwrap().trigger_characters,
			DEFAULT_TRIGGER_CHARACTERS
				.iter()
				.map(|c| (*c).to_owned())
				.collect::<Vec<_>>()
		);
	}
}
