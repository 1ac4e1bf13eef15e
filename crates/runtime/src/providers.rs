//! Installs capability hooks into the editor and dispatches them to
//! workers.
//!
//! One hook per enabled capability per language. A hook resolves the
//! model's URI, obtains a synced worker from the lifecycle, and issues a
//! single generic provide request. Failures stop here: they are logged and
//! mapped to the capability's neutral value, never surfaced to the editor.
//! Diagnostics get no hook; they run on the standing scheduler instead.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error};
use url::Url;

use petrel_worker::{
	Capability, CompletionItem, Hover, Position, ResolvedCapabilities, TextEdit,
};

use crate::Result;
use crate::diagnostics::DiagnosticsScheduler;
use crate::editor::{EditorHost, HookId, ProviderHook};
use crate::lifecycle::WorkerLifecycle;

/// Everything installed for one language registration.
struct ProviderSet {
	hooks: Vec<HookId>,
	diagnostics: Option<DiagnosticsScheduler>,
}

impl ProviderSet {
	fn dispose(self, host: &dyn EditorHost) {
		for id in self.hooks {
			host.remove_provider(id);
		}
		if let Some(diagnostics) = self.diagnostics {
			diagnostics.dispose();
		}
	}
}

/// Owns the hook sets installed into the host, one per language id.
pub struct ProviderRegistry {
	host: Arc<dyn EditorHost>,
	installed: Mutex<HashMap<String, ProviderSet>>,
}

impl ProviderRegistry {
	pub fn new(host: Arc<dyn EditorHost>) -> Self {
		Self {
			host,
			installed: Mutex::new(HashMap::new()),
		}
	}

	/// Install hooks for every capability in `capabilities`.
	///
	/// Idempotent per language: any previous set is removed first, so
	/// re-registration never duplicates callbacks.
	pub fn install(&self, lifecycle: Arc<WorkerLifecycle>, capabilities: &ResolvedCapabilities) {
		let language = lifecycle.language_id().to_owned();

		let mut installed = self.installed.lock();
		if let Some(previous) = installed.remove(&language) {
			debug!(language = %language, "replacing installed provider set");
			previous.dispose(&*self.host);
		}

		let mut hooks = Vec::new();
		if capabilities.hover {
			hooks.push(
				self.host
					.install_provider(&language, hover_hook(Arc::clone(&lifecycle))),
			);
		}
		if let Some(completion) = &capabilities.completion {
			hooks.push(self.host.install_provider(
				&language,
				completion_hook(
					Arc::clone(&lifecycle),
					completion.trigger_characters.clone(),
				),
			));
		}
		if capabilities.formatting {
			hooks.push(
				self.host
					.install_provider(&language, formatting_hook(Arc::clone(&lifecycle))),
			);
		}

		let diagnostics = capabilities.diagnostics.map(|config| {
			DiagnosticsScheduler::spawn(
				Arc::clone(&lifecycle),
				Arc::clone(&self.host),
				config.debounce,
			)
		});

		installed.insert(language, ProviderSet { hooks, diagnostics });
	}

	/// Remove the hook set for one language, if installed.
	pub fn dispose_language(&self, language_id: &str) {
		let set = self.installed.lock().remove(language_id);
		if let Some(set) = set {
			set.dispose(&*self.host);
		}
	}

	/// Remove every installed hook set.
	pub fn dispose_all(&self) {
		let sets: Vec<ProviderSet> = {
			let mut installed = self.installed.lock();
			installed.drain().map(|(_, set)| set).collect()
		};
		for set in sets {
			set.dispose(&*self.host);
		}
	}
}

fn hover_hook(lifecycle: Arc<WorkerLifecycle>) -> ProviderHook {
	ProviderHook::Hover(Arc::new(move |uri, position| {
		let lifecycle = Arc::clone(&lifecycle);
		async move {
			match hover(&lifecycle, &uri, position).await {
				Ok(answer) => answer,
				Err(error) => {
					error!(label = %lifecycle.label(), uri = %uri, error = %error, "hover provider failed");
					None
				}
			}
		}
		.boxed()
	}))
}

fn completion_hook(lifecycle: Arc<WorkerLifecycle>, trigger_characters: Vec<String>) -> ProviderHook {
	ProviderHook::Completion {
		trigger_characters,
		provide: Arc::new(move |uri, position| {
			let lifecycle = Arc::clone(&lifecycle);
			async move {
				match complete(&lifecycle, &uri, position).await {
					Ok(items) => items,
					Err(error) => {
						error!(label = %lifecycle.label(), uri = %uri, error = %error, "completion provider failed");
						Vec::new()
					}
				}
			}
			.boxed()
		}),
	}
}

fn formatting_hook(lifecycle: Arc<WorkerLifecycle>) -> ProviderHook {
	ProviderHook::Formatting(Arc::new(move |uri| {
		let lifecycle = Arc::clone(&lifecycle);
		async move {
			match format(&lifecycle, &uri).await {
				Ok(edits) => edits,
				Err(error) => {
					error!(label = %lifecycle.label(), uri = %uri, error = %error, "formatting provider failed");
					Vec::new()
				}
			}
		}
		.boxed()
	}))
}

async fn hover(
	lifecycle: &WorkerLifecycle,
	uri: &Url,
	position: Position,
) -> Result<Option<Hover>> {
	let client = lifecycle.synced_worker(std::slice::from_ref(uri)).await?;
	let args = vec![serde_json::to_value(position).map_err(petrel_worker::Error::from)?];
	Ok(client.provide_as(Capability::Hover, uri, args).await?)
}

async fn complete(
	lifecycle: &WorkerLifecycle,
	uri: &Url,
	position: Position,
) -> Result<Vec<CompletionItem>> {
	let client = lifecycle.synced_worker(std::slice::from_ref(uri)).await?;
	let args = vec![serde_json::to_value(position).map_err(petrel_worker::Error::from)?];
	let items = client
		.provide_as(Capability::Completion, uri, args)
		.await?
		.unwrap_or_default();
	Ok(items)
}

async fn format(lifecycle: &WorkerLifecycle, uri: &Url) -> Result<Vec<TextEdit>> {
	let client = lifecycle.synced_worker(std::slice::from_ref(uri)).await?;
	let edits = client
		.provide_as(Capability::Formatting, uri, Vec::new())
		.await?
		.unwrap_or_default();
	Ok(edits)
}
