//! Worker options decoded from a registration's options blob.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::{Xxh3, xxh3_64};

/// Glob patterns used for project scans when the options name none.
pub const DEFAULT_FILE_PATTERNS: &[&str] = &["**/*.graphql", "**/*.gql", "**/*.graphqls"];

/// Everything a GraphQL worker can be configured with.
///
/// The blob travels as JSON through the registration and through
/// `set_options`/`update_options`; unknown fields are ignored so older hosts
/// keep working against newer workers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GraphqlWorkerOptions {
	/// Where the schema comes from. Without one, only syntax-level features
	/// are available.
	pub schema: Option<SchemaSource>,
	/// Root directory scanned for fragments, type definitions, and
	/// extensions. Without one there is no file index.
	pub project_root: Option<PathBuf>,
	/// Glob patterns, relative to the root, selecting project files.
	pub file_patterns: Vec<String>,
	/// Fragment definitions supplied outside the editor, as GraphQL source.
	pub external_fragments: Vec<String>,
	/// Directive definitions (SDL) folded into every loaded schema.
	pub custom_directives: Vec<String>,
}

impl GraphqlWorkerOptions {
	/// Decode an options blob. `null` means all defaults.
	pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
		if value.is_null() {
			return Ok(Self::default());
		}
		serde_json::from_value(value.clone())
	}

	/// The configured file patterns, or [`DEFAULT_FILE_PATTERNS`].
	pub fn patterns(&self) -> Vec<String> {
		if self.file_patterns.is_empty() {
			DEFAULT_FILE_PATTERNS.iter().map(|p| (*p).to_owned()).collect()
		} else {
			self.file_patterns.clone()
		}
	}
}

/// Where a schema is loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SchemaSource {
	/// A remote endpoint, introspected over HTTP POST.
	Url {
		url: String,
		/// Extra request headers, e.g. authorization.
		#[serde(default)]
		headers: BTreeMap<String, String>,
	},
	/// Schema definition text supplied inline.
	Sdl { text: String },
}

impl SchemaSource {
	/// Stable cache key for the schema this source produces.
	///
	/// Two URL sources differing only in headers get distinct keys, since
	/// headers can change what the endpoint exposes.
	pub fn cache_key(&self) -> String {
		match self {
			SchemaSource::Url { url, headers } => {
				if headers.is_empty() {
					url.clone()
				} else {
					let mut hasher = Xxh3::new();
					for (name, value) in headers {
						hasher.update(name.as_bytes());
						hasher.update(&[0]);
						hasher.update(value.as_bytes());
						hasher.update(&[0]);
					}
					format!("{url}#{:016x}", hasher.digest())
				}
			}
			SchemaSource::Sdl { text } => {
				format!("sdl:{:016x}", xxh3_64(text.as_bytes()))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn null_blob_means_defaults() {
		let options = GraphqlWorkerOptions::from_value(&serde_json::Value::Null).unwrap();
		assert_eq!(options, GraphqlWorkerOptions::default());
		assert_eq!(options.patterns(), DEFAULT_FILE_PATTERNS);
	}

	#[test]
	fn schema_source_decodes_by_kind_tag() {
		let options = GraphqlWorkerOptions::from_value(&json!({
			"schema": { "kind": "url", "url": "https://api.example/graphql" },
			"filePatterns": ["queries/**/*.graphql"],
		}))
		.unwrap();
		assert_eq!(
			options.schema,
			Some(SchemaSource::Url {
				url: "https://api.example/graphql".to_owned(),
				headers: BTreeMap::new(),
			})
		);
		assert_eq!(options.patterns(), vec!["queries/**/*.graphql".to_owned()]);

		let options = GraphqlWorkerOptions::from_value(&json!({
			"schema": { "kind": "sdl", "text": "type Query { ok: Boolean }" },
		}))
		.unwrap();
		assert!(matches!(options.schema, Some(SchemaSource::Sdl { .. })));
	}

	#[test]
	fn cache_keys_separate_sources() {
		let plain = SchemaSource::Url {
			url: "https://api.example/graphql".to_owned(),
			headers: BTreeMap::new(),
		};
		let authed = SchemaSource::Url {
			url: "https://api.example/graphql".to_owned(),
			headers: BTreeMap::from([("authorization".to_owned(), "Bearer x".to_owned())]),
		};
		let sdl = SchemaSource::Sdl {
			text: "type Query { ok: Boolean }".to_owned(),
		};
		assert_eq!(plain.cache_key(), "https://api.example/graphql");
		assert_ne!(plain.cache_key(), authed.cache_key());
		assert_ne!(plain.cache_key(), sdl.cache_key());
		assert_eq!(sdl.cache_key(), sdl.clone().cache_key());
	}
}
