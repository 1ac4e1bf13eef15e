//! Worker-side mirror of the host's open documents.

use rustc_hash::FxHashMap;
use url::Url;

use crate::types::DocumentSnapshot;

/// The documents a worker currently knows about.
///
/// The substrate applies sync/release messages before any capability request
/// runs, so a worker always observes the set as of the request's dispatch.
/// The store never holds a document the host has closed.
#[derive(Debug, Default)]
pub struct DocumentStore {
	documents: FxHashMap<Url, DocumentSnapshot>,
}

impl DocumentStore {
	/// Insert or replace one mirrored document.
	pub fn apply(&mut self, snapshot: DocumentSnapshot) {
		self.documents.insert(snapshot.uri.clone(), snapshot);
	}

	/// Forget a document. Unknown URIs are a no-op.
	pub fn release(&mut self, uri: &Url) {
		self.documents.remove(uri);
	}

	pub fn get(&self, uri: &Url) -> Option<&DocumentSnapshot> {
		self.documents.get(uri)
	}

	pub fn text(&self, uri: &Url) -> Option<&str> {
		self.documents.get(uri).map(|d| d.text.as_str())
	}

	pub fn contains(&self, uri: &Url) -> bool {
		self.documents.contains_key(uri)
	}

	pub fn iter(&self) -> impl Iterator<Item = &DocumentSnapshot> {
		self.documents.values()
	}

	pub fn len(&self) -> usize {
		self.documents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.documents.is_empty()
	}
}
