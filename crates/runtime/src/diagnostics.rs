//! Standing diagnostics scheduler.
//!
//! Diagnostics are not request/response like the other capabilities: the
//! runtime listens to edits, debounces them, and validates the focused
//! model, publishing markers keyed by language id. Unfocused models are
//! skipped, not queued. An in-flight validation is never cancelled; the
//! next completed run supersedes its markers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use url::Url;

use petrel_worker::{Capability, Marker};

use crate::Result;
use crate::editor::{EditorHost, ModelEvent, TextModel};
use crate::lifecycle::WorkerLifecycle;

/// Handle to one language's running scheduler.
pub struct DiagnosticsScheduler {
	cancel: CancellationToken,
}

impl DiagnosticsScheduler {
	/// Start the scheduler for `lifecycle`'s language.
	pub fn spawn(
		lifecycle: Arc<WorkerLifecycle>,
		host: Arc<dyn EditorHost>,
		debounce: Duration,
	) -> Self {
		let cancel = CancellationToken::new();
		tokio::spawn(run_scheduler(lifecycle, host, debounce, cancel.clone()));
		Self { cancel }
	}

	/// Stop the scheduler and its per-model watchers.
	pub fn dispose(&self) {
		self.cancel.cancel();
	}
}

impl Drop for DiagnosticsScheduler {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

async fn run_scheduler(
	lifecycle: Arc<WorkerLifecycle>,
	host: Arc<dyn EditorHost>,
	debounce: Duration,
	cancel: CancellationToken,
) {
	let language = lifecycle.language_id().to_owned();
	let mut events = host.subscribe();
	let mut watchers: HashMap<Url, CancellationToken> = HashMap::new();

	// Models already open when the scheduler starts.
	for model in host.models() {
		if model.language_id() == language {
			spawn_watcher(&mut watchers, &lifecycle, &host, model, debounce, &cancel);
		}
	}

	loop {
		let event = tokio::select! {
			_ = cancel.cancelled() => break,
			event = events.recv() => event,
		};
		match event {
			Ok(ModelEvent::Opened(uri)) => {
				if let Some(model) = host.model(&uri)
					&& model.language_id() == language
				{
					spawn_watcher(&mut watchers, &lifecycle, &host, model, debounce, &cancel);
				}
			}
			Ok(ModelEvent::Closed(uri)) => {
				if let Some(token) = watchers.remove(&uri) {
					token.cancel();
					host.set_markers(&uri, &language, Vec::new());
				}
			}
			Ok(ModelEvent::LanguageChanged { uri, language_id }) => {
				if language_id == language {
					if let Some(model) = host.model(&uri) {
						spawn_watcher(&mut watchers, &lifecycle, &host, model, debounce, &cancel);
					}
				} else if let Some(token) = watchers.remove(&uri) {
					token.cancel();
					host.set_markers(&uri, &language, Vec::new());
				}
			}
			Ok(ModelEvent::FocusChanged(_)) => {}
			Err(broadcast::error::RecvError::Lagged(skipped)) => {
				warn!(language = %language, skipped, "model events lagged; resyncing watchers");
				resync_watchers(&mut watchers, &lifecycle, &host, &language, debounce, &cancel);
			}
			Err(broadcast::error::RecvError::Closed) => break,
		}
	}

	for (uri, token) in watchers {
		token.cancel();
		host.set_markers(&uri, &language, Vec::new());
	}
}

fn spawn_watcher(
	watchers: &mut HashMap<Url, CancellationToken>,
	lifecycle: &Arc<WorkerLifecycle>,
	host: &Arc<dyn EditorHost>,
	model: Arc<dyn TextModel>,
	debounce: Duration,
	parent: &CancellationToken,
) {
	let uri = model.uri();
	if let Some(previous) = watchers.remove(&uri) {
		previous.cancel();
	}
	let token = parent.child_token();
	watchers.insert(uri, token.clone());
	tokio::spawn(watch_model(
		Arc::clone(lifecycle),
		Arc::clone(host),
		model,
		debounce,
		token,
	));
}

fn resync_watchers(
	watchers: &mut HashMap<Url, CancellationToken>,
	lifecycle: &Arc<WorkerLifecycle>,
	host: &Arc<dyn EditorHost>,
	language: &str,
	debounce: Duration,
	parent: &CancellationToken,
) {
	let open: HashMap<Url, Arc<dyn TextModel>> = host
		.models()
		.into_iter()
		.filter(|m| m.language_id() == language)
		.map(|m| (m.uri(), m))
		.collect();

	let stale: Vec<Url> = watchers
		.keys()
		.filter(|uri| !open.contains_key(*uri))
		.cloned()
		.collect();
	for uri in stale {
		if let Some(token) = watchers.remove(&uri) {
			token.cancel();
			host.set_markers(&uri, language, Vec::new());
		}
	}
	for (uri, model) in open {
		if !watchers.contains_key(&uri) {
			spawn_watcher(watchers, lifecycle, host, model, debounce, parent);
		}
	}
}

/// One model's edit loop: wait for a tick (edit or registration epoch),
/// absorb further edits until quiet for `debounce`, then validate if the
/// model holds focus.
async fn watch_model(
	lifecycle: Arc<WorkerLifecycle>,
	host: Arc<dyn EditorHost>,
	model: Arc<dyn TextModel>,
	debounce: Duration,
	cancel: CancellationToken,
) {
	let language = lifecycle.language_id().to_owned();
	let uri = model.uri();
	let mut versions = model.watch_version();
	let mut epoch = lifecycle.subscribe_epoch();

	// First pass on attach; edits from here on are debounced.
	maybe_validate(&lifecycle, &*host, &uri, &language).await;

	loop {
		tokio::select! {
			_ = cancel.cancelled() => return,
			changed = versions.changed() => {
				if changed.is_err() {
					return;
				}
			}
			changed = epoch.changed() => {
				if changed.is_err() {
					return;
				}
			}
		}

		loop {
			tokio::select! {
				_ = cancel.cancelled() => return,
				_ = tokio::time::sleep(debounce) => break,
				changed = versions.changed() => {
					if changed.is_err() {
						return;
					}
				}
			}
		}

		maybe_validate(&lifecycle, &*host, &uri, &language).await;
	}
}

async fn maybe_validate(
	lifecycle: &WorkerLifecycle,
	host: &dyn EditorHost,
	uri: &Url,
	language: &str,
) {
	if host.focused().as_ref() != Some(uri) {
		return;
	}
	match diagnostics(lifecycle, uri).await {
		Ok(markers) => host.set_markers(uri, language, markers),
		Err(error) => {
			// Markers from the previous run stay; the next completed run
			// replaces them.
			error!(uri = %uri, error = %error, "diagnostics run failed");
		}
	}
}

async fn diagnostics(lifecycle: &WorkerLifecycle, uri: &Url) -> Result<Vec<Marker>> {
	let client = lifecycle.synced_worker(std::slice::from_ref(uri)).await?;
	let markers = client
		.provide_as(Capability::Diagnostics, uri, Vec::new())
		.await?
		.unwrap_or_default();
	Ok(markers)
}
