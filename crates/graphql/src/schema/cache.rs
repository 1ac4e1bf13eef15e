//! Source-keyed schema cache.
//!
//! One entry per schema source, keyed by [`SchemaSource::cache_key`]. An
//! entry is handed out untouched while the extension hash it was built under
//! still matches; a moved hash rebuilds from a fresh load. Failed loads
//! cache nothing, so the next call retries.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::Result;
use crate::config::SchemaSource;
use crate::schema::{Extension, Schema, SchemaLoader, extensions, sdl};

pub struct SchemaCache {
	loader: Arc<dyn SchemaLoader>,
	entries: FxHashMap<String, CacheEntry>,
}

struct CacheEntry {
	schema: Arc<Schema>,
	extension_hash: u64,
}

impl SchemaCache {
	pub fn new(loader: Arc<dyn SchemaLoader>) -> Self {
		Self {
			loader,
			entries: FxHashMap::default(),
		}
	}

	/// The schema for `source`, with `custom_directives` and `extensions`
	/// folded in. Returns the cached instance whenever the extension set is
	/// unchanged by content.
	pub async fn schema(
		&mut self,
		source: &SchemaSource,
		custom_directives: &[String],
		extensions: &[Extension],
	) -> Result<Arc<Schema>> {
		let key = source.cache_key();
		let hash = extensions::extension_hash(extensions);
		if let Some(entry) = self.entries.get(&key)
			&& entry.extension_hash == hash
		{
			return Ok(Arc::clone(&entry.schema));
		}

		let mut schema = self.loader.load(source).await?;
		for snippet in custom_directives {
			for directive in sdl::parse_directive_definitions(snippet) {
				schema.upsert_directive(directive);
			}
		}
		extensions::merge_extensions(&mut schema, extensions);
		debug!(
			key = %key,
			types = schema.types.len(),
			extensions = extensions.len(),
			"built schema cache entry"
		);

		let schema = Arc::new(schema);
		self.entries.insert(
			key,
			CacheEntry {
				schema: Arc::clone(&schema),
				extension_hash: hash,
			},
		);
		Ok(schema)
	}

	/// Drop every entry. The next lookup per source reloads.
	pub fn clear(&mut self) {
		self.entries.clear();
	}
}
