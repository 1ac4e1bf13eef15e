//! In-memory [`EditorHost`]: the host-side twin of
//! [`petrel_worker::LocalTransport`].
//!
//! Holds models, focus, markers and installed hooks in plain maps, and can
//! drive the hooks the way an editor user would (hover at a position,
//! request completions, format). The runtime's own tests and downstream
//! crates run the full stack against it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use url::Url;

use petrel_worker::{CompletionItem, Hover, Marker, Position, TextEdit};

use crate::editor::{
	CompletionFn, EditorHost, FormattingFn, HookId, HoverFn, ModelEvent, ProviderHook, TextModel,
};

/// One open document.
pub struct MemoryModel {
	uri: Url,
	language_id: RwLock<String>,
	text: RwLock<String>,
	version: watch::Sender<i32>,
}

impl MemoryModel {
	fn new(uri: Url, language_id: impl Into<String>, text: impl Into<String>) -> Arc<Self> {
		let (version, _) = watch::channel(1);
		Arc::new(Self {
			uri,
			language_id: RwLock::new(language_id.into()),
			text: RwLock::new(text.into()),
			version,
		})
	}

	fn set_text(&self, text: impl Into<String>) {
		*self.text.write() = text.into();
		self.version.send_modify(|v| *v += 1);
	}

	fn set_language(&self, language_id: impl Into<String>) {
		*self.language_id.write() = language_id.into();
	}
}

impl TextModel for MemoryModel {
	fn uri(&self) -> Url {
		self.uri.clone()
	}

	fn language_id(&self) -> String {
		self.language_id.read().clone()
	}

	fn version(&self) -> i32 {
		*self.version.borrow()
	}

	fn text(&self) -> String {
		self.text.read().clone()
	}

	fn watch_version(&self) -> watch::Receiver<i32> {
		self.version.subscribe()
	}
}

struct InstalledHook {
	language_id: String,
	hook: ProviderHook,
}

/// In-memory editor host.
pub struct MemoryHost {
	models: RwLock<HashMap<Url, Arc<MemoryModel>>>,
	focused: RwLock<Option<Url>>,
	events: broadcast::Sender<ModelEvent>,
	markers: RwLock<HashMap<(Url, String), Vec<Marker>>>,
	hooks: RwLock<HashMap<HookId, InstalledHook>>,
	next_hook_id: AtomicU64,
}

impl MemoryHost {
	pub fn new() -> Arc<Self> {
		let (events, _) = broadcast::channel(64);
		Arc::new(Self {
			models: RwLock::new(HashMap::new()),
			focused: RwLock::new(None),
			events,
			markers: RwLock::new(HashMap::new()),
			hooks: RwLock::new(HashMap::new()),
			next_hook_id: AtomicU64::new(0),
		})
	}

	/// Open (or replace) a model.
	pub fn open(
		&self,
		uri: Url,
		language_id: impl Into<String>,
		text: impl Into<String>,
	) -> Arc<MemoryModel> {
		let model = MemoryModel::new(uri.clone(), language_id, text);
		self.models.write().insert(uri.clone(), Arc::clone(&model));
		let _ = self.events.send(ModelEvent::Opened(uri));
		model
	}

	pub fn close(&self, uri: &Url) {
		let removed = self.models.write().remove(uri).is_some();
		if !removed {
			return;
		}
		{
			let mut focused = self.focused.write();
			if focused.as_ref() == Some(uri) {
				*focused = None;
			}
		}
		let _ = self.events.send(ModelEvent::Closed(uri.clone()));
	}

	pub fn focus(&self, uri: &Url) {
		*self.focused.write() = Some(uri.clone());
		let _ = self.events.send(ModelEvent::FocusChanged(Some(uri.clone())));
	}

	/// Replace a model's text, bumping its version.
	pub fn edit(&self, uri: &Url, text: impl Into<String>) {
		if let Some(model) = self.models.read().get(uri) {
			model.set_text(text);
		}
	}

	pub fn set_language(&self, uri: &Url, language_id: impl Into<String>) {
		let language_id = language_id.into();
		if let Some(model) = self.models.read().get(uri) {
			model.set_language(language_id.clone());
		}
		let _ = self.events.send(ModelEvent::LanguageChanged {
			uri: uri.clone(),
			language_id,
		});
	}

	/// Markers currently published for `(uri, owner)`.
	pub fn markers(&self, uri: &Url, owner: &str) -> Vec<Marker> {
		self.markers
			.read()
			.get(&(uri.clone(), owner.to_owned()))
			.cloned()
			.unwrap_or_default()
	}

	/// Number of hooks installed for a language.
	pub fn provider_count(&self, language_id: &str) -> usize {
		self.hooks
			.read()
			.values()
			.filter(|h| h.language_id == language_id)
			.count()
	}

	/// Trigger characters of the installed completion hook, if any.
	pub fn completion_triggers(&self, language_id: &str) -> Option<Vec<String>> {
		self.hooks.read().values().find_map(|h| {
			if h.language_id != language_id {
				return None;
			}
			match &h.hook {
				ProviderHook::Completion {
					trigger_characters, ..
				} => Some(trigger_characters.clone()),
				_ => None,
			}
		})
	}

	fn hover_hook_for(&self, uri: &Url) -> Option<HoverFn> {
		let language_id = self.models.read().get(uri)?.language_id();
		self.hooks.read().values().find_map(|h| {
			if h.language_id != language_id {
				return None;
			}
			match &h.hook {
				ProviderHook::Hover(f) => Some(Arc::clone(f)),
				_ => None,
			}
		})
	}

	fn completion_hook_for(&self, uri: &Url) -> Option<CompletionFn> {
		let language_id = self.models.read().get(uri)?.language_id();
		self.hooks.read().values().find_map(|h| {
			if h.language_id != language_id {
				return None;
			}
			match &h.hook {
				ProviderHook::Completion { provide, .. } => Some(Arc::clone(provide)),
				_ => None,
			}
		})
	}

	fn formatting_hook_for(&self, uri: &Url) -> Option<FormattingFn> {
		let language_id = self.models.read().get(uri)?.language_id();
		self.hooks.read().values().find_map(|h| {
			if h.language_id != language_id {
				return None;
			}
			match &h.hook {
				ProviderHook::Formatting(f) => Some(Arc::clone(f)),
				_ => None,
			}
		})
	}

	/// Invoke the hover hook the way the editor would.
	pub async fn hover(&self, uri: &Url, position: Position) -> Option<Hover> {
		let hook = self.hover_hook_for(uri)?;
		hook(uri.clone(), position).await
	}

	/// Invoke the completion hook the way the editor would.
	pub async fn complete(&self, uri: &Url, position: Position) -> Vec<CompletionItem> {
		let Some(hook) = self.completion_hook_for(uri) else {
			return Vec::new();
		};
		hook(uri.clone(), position).await
	}

	/// Invoke the formatting hook the way the editor would.
	pub async fn format(&self, uri: &Url) -> Vec<TextEdit> {
		let Some(hook) = self.formatting_hook_for(uri) else {
			return Vec::new();
		};
		hook(uri.clone()).await
	}
}

impl EditorHost for MemoryHost {
	fn model(&self, uri: &Url) -> Option<Arc<dyn TextModel>> {
		self.models
			.read()
			.get(uri)
			.map(|m| Arc::clone(m) as Arc<dyn TextModel>)
	}

	fn models(&self) -> Vec<Arc<dyn TextModel>> {
		self.models
			.read()
			.values()
			.map(|m| Arc::clone(m) as Arc<dyn TextModel>)
			.collect()
	}

	fn focused(&self) -> Option<Url> {
		self.focused.read().clone()
	}

	fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
		self.events.subscribe()
	}

	fn set_markers(&self, uri: &Url, owner: &str, markers: Vec<Marker>) {
		let key = (uri.clone(), owner.to_owned());
		let mut map = self.markers.write();
		if markers.is_empty() {
			map.remove(&key);
		} else {
			map.insert(key, markers);
		}
	}

	fn install_provider(&self, language_id: &str, provider: ProviderHook) -> HookId {
		let id = HookId(self.next_hook_id.fetch_add(1, Ordering::Relaxed));
		self.hooks.write().insert(
			id,
			InstalledHook {
				language_id: language_id.to_owned(),
				hook: provider,
			},
		);
		id
	}

	fn remove_provider(&self, id: HookId) {
		self.hooks.write().remove(&id);
	}
}

#[cfg(test)]
mod tests {
	use futures::FutureExt;

	use super::*;

	fn uri(s: &str) -> Url {
		Url::parse(s).unwrap()
	}

	#[tokio::test]
	async fn hooks_route_by_model_language() {
		let host = MemoryHost::new();
		host.open(uri("inmemory://model/1"), "graphql", "query { a }");
		host.open(uri("inmemory://model/2"), "json", "{}");

		host.install_provider(
			"graphql",
			ProviderHook::Hover(Arc::new(|u, _| {
				async move {
					Some(Hover {
						contents: format!("hovered {u}"),
						range: None,
					})
				}
				.boxed()
			})),
		);

		let hit = host.hover(&uri("inmemory://model/1"), Position::default()).await;
		assert!(hit.is_some());
		let miss = host.hover(&uri("inmemory://model/2"), Position::default()).await;
		assert!(miss.is_none());
	}

	#[tokio::test]
	async fn edits_tick_the_version_watch() {
		let host = MemoryHost::new();
		let model = host.open(uri("inmemory://model/1"), "graphql", "a");
		let mut versions = model.watch_version();
		assert_eq!(*versions.borrow_and_update(), 1);

		host.edit(&uri("inmemory://model/1"), "ab");
		versions.changed().await.unwrap();
		assert_eq!(*versions.borrow_and_update(), 2);
	}

	#[test]
	fn closing_clears_focus() {
		let host = MemoryHost::new();
		host.open(uri("inmemory://model/1"), "graphql", "");
		host.focus(&uri("inmemory://model/1"));
		assert!(host.focused().is_some());
		host.close(&uri("inmemory://model/1"));
		assert!(host.focused().is_none());
	}
}
