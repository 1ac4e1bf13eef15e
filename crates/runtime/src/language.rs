//! Language definitions and the registry that indexes them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::loader::AssetLoader;
use petrel_worker::CapabilityConfig;

/// Editor-facing assets for a language, produced by its lazy loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanguageAssets {
	/// Keywords for simple token highlighting.
	pub keywords: Vec<String>,
	pub configuration: LanguageConfiguration,
}

/// Structural editing configuration: comments and bracket pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanguageConfiguration {
	pub line_comment_tokens: Vec<String>,
	pub block_comment: Option<(String, String)>,
	pub brackets: Vec<(char, char)>,
}

/// How a language's worker is started: which module serves it, with what
/// initial options and which capabilities.
#[derive(Clone)]
pub struct WorkerDescriptor {
	pub label: String,
	pub options: Value,
	pub capabilities: CapabilityConfig,
}

impl WorkerDescriptor {
	pub fn new(label: impl Into<String>) -> Self {
		Self {
			label: label.into(),
			options: Value::Null,
			capabilities: CapabilityConfig::default(),
		}
	}

	pub fn options(mut self, options: Value) -> Self {
		self.options = options;
		self
	}

	pub fn capabilities(mut self, capabilities: CapabilityConfig) -> Self {
		self.capabilities = capabilities;
		self
	}
}

/// A registered language: identity, file associations, and its optional
/// lazy assets and worker.
///
/// Definitions are immutable once registered; re-registering the same id
/// replaces the registration wholesale.
#[derive(Clone)]
pub struct LanguageDefinition {
	pub id: String,
	pub extensions: Vec<String>,
	pub aliases: Vec<String>,
	pub assets: Option<AssetLoader>,
	pub worker: Option<WorkerDescriptor>,
}

impl LanguageDefinition {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			extensions: Vec::new(),
			aliases: Vec::new(),
			assets: None,
			worker: None,
		}
	}

	pub fn extensions<I, S>(mut self, extensions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.extensions = extensions.into_iter().map(Into::into).collect();
		self
	}

	pub fn aliases<I, S>(mut self, aliases: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.aliases = aliases.into_iter().map(Into::into).collect();
		self
	}

	pub fn assets(mut self, loader: AssetLoader) -> Self {
		self.assets = Some(loader);
		self
	}

	pub fn worker(mut self, descriptor: WorkerDescriptor) -> Self {
		self.worker = Some(descriptor);
		self
	}
}

impl std::fmt::Debug for LanguageDefinition {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LanguageDefinition")
			.field("id", &self.id)
			.field("extensions", &self.extensions)
			.field("aliases", &self.aliases)
			.field("assets", &self.assets.is_some())
			.field("worker", &self.worker.as_ref().map(|w| w.label.as_str()))
			.finish()
	}
}

/// Thread-safe index of registered languages.
#[derive(Default)]
pub struct LanguageRegistry {
	definitions: RwLock<HashMap<String, Arc<LanguageDefinition>>>,
}

impl LanguageRegistry {
	pub fn insert(&self, definition: Arc<LanguageDefinition>) {
		self.definitions
			.write()
			.insert(definition.id.clone(), definition);
	}

	pub fn get(&self, id: &str) -> Option<Arc<LanguageDefinition>> {
		self.definitions.read().get(id).cloned()
	}

	/// Look a language up by file extension (leading dot ignored).
	pub fn by_extension(&self, extension: &str) -> Option<Arc<LanguageDefinition>> {
		let extension = extension.trim_start_matches('.');
		self.definitions
			.read()
			.values()
			.find(|def| def.extensions.iter().any(|e| e.trim_start_matches('.') == extension))
			.cloned()
	}

	pub fn ids(&self) -> Vec<String> {
		self.definitions.read().keys().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extension_lookup_ignores_leading_dots() {
		let registry = LanguageRegistry::default();
		registry.insert(Arc::new(
			LanguageDefinition::new("graphql").extensions([".graphql", "gql"]),
		));
		assert!(registry.by_extension("graphql").is_some());
		assert!(registry.by_extension(".gql").is_some());
		assert!(registry.by_extension("rs").is_none());
	}
}
