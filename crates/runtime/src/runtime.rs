//! The runtime facade: language registration and worker access.
//!
//! Registration is validated before any state changes: a worker declaration
//! whose capabilities the module does not serve is rejected outright, so a
//! broken registration never installs half a provider set. Registration is
//! also idempotent per language. Re-registering replaces the previous
//! lifecycle and hooks instead of stacking new ones next to them.
//!
//! Nothing starts at registration time. Assets load on first demand through
//! their [`AssetCell`], and the worker starts on the first synced-worker
//! request.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::info;
use url::Url;

use petrel_worker::{Error as WorkerError, WorkerClient, WorkerTransport};

use crate::editor::EditorHost;
use crate::language::{LanguageAssets, LanguageDefinition, LanguageRegistry};
use crate::lifecycle::{WorkerLifecycle, WorkerTuning};
use crate::loader::{AssetCell, LoaderRegistry};
use crate::providers::ProviderRegistry;
use crate::{Error, Result};

/// Process-scoped root of the language layer.
///
/// Owns the registries and one [`WorkerLifecycle`] per registered worker
/// label. Independent runtimes share nothing.
pub struct Runtime {
	host: Arc<dyn EditorHost>,
	transport: Arc<dyn WorkerTransport>,
	languages: LanguageRegistry,
	loaders: LoaderRegistry,
	lifecycles: RwLock<HashMap<String, Arc<WorkerLifecycle>>>,
	by_language: RwLock<HashMap<String, String>>,
	providers: ProviderRegistry,
	tuning: WorkerTuning,
}

impl Runtime {
	pub fn new(host: Arc<dyn EditorHost>, transport: Arc<dyn WorkerTransport>) -> Self {
		Self::with_tuning(host, transport, WorkerTuning::default())
	}

	pub fn with_tuning(
		host: Arc<dyn EditorHost>,
		transport: Arc<dyn WorkerTransport>,
		tuning: WorkerTuning,
	) -> Self {
		Self {
			host: Arc::clone(&host),
			transport,
			languages: LanguageRegistry::default(),
			loaders: LoaderRegistry::default(),
			lifecycles: RwLock::new(HashMap::new()),
			by_language: RwLock::new(HashMap::new()),
			providers: ProviderRegistry::new(host),
			tuning,
		}
	}

	pub fn host(&self) -> &Arc<dyn EditorHost> {
		&self.host
	}

	pub fn transport(&self) -> &Arc<dyn WorkerTransport> {
		&self.transport
	}

	pub fn languages(&self) -> &LanguageRegistry {
		&self.languages
	}

	/// Register (or replace) a language.
	///
	/// When the definition carries a worker, its declared capabilities are
	/// checked against the module behind the label first; a capability the
	/// module cannot serve fails the whole registration and leaves the
	/// runtime untouched. Neither assets nor the worker are started here.
	pub async fn register(&self, definition: LanguageDefinition) -> Result<()> {
		let definition = Arc::new(definition);

		let worker = match &definition.worker {
			Some(descriptor) => {
				let capabilities = descriptor.capabilities.resolve();
				let declared = self
					.transport
					.declared_capabilities(&descriptor.label)
					.ok_or_else(|| WorkerError::UnknownLabel(descriptor.label.clone()))?;
				for capability in capabilities.enabled() {
					if !declared.contains(&capability) {
						return Err(Error::UnsupportedCapability {
							label: descriptor.label.clone(),
							capability,
						});
					}
				}
				Some((descriptor, capabilities))
			}
			None => None,
		};

		if let Some(loader) = &definition.assets {
			self.loaders.get_or_create(&definition.id, Arc::clone(loader));
		}
		self.languages.insert(Arc::clone(&definition));
		self.remove_worker_for(&definition.id).await;

		let Some((descriptor, capabilities)) = worker else {
			return Ok(());
		};

		// A label reused from an earlier registration gives up its old
		// lifecycle too.
		if let Some(previous) = self.take_lifecycle(&descriptor.label) {
			previous.dispose().await;
		}

		let lifecycle = WorkerLifecycle::new(
			descriptor.label.clone(),
			definition.id.clone(),
			descriptor.options.clone(),
			self.tuning,
			Arc::clone(&self.transport),
			Arc::clone(&self.host),
		);
		self.providers.install(Arc::clone(&lifecycle), &capabilities);
		self.lifecycles
			.write()
			.insert(descriptor.label.clone(), lifecycle);
		self.by_language
			.write()
			.insert(definition.id.clone(), descriptor.label.clone());
		info!(language = %definition.id, label = %descriptor.label, "registered language worker");
		Ok(())
	}

	/// A synced worker for `label`, with `uris` mirrored and current.
	pub async fn worker(&self, label: &str, uris: &[Url]) -> Result<WorkerClient> {
		let lifecycle = self.worker_lifecycle(label)?;
		lifecycle.synced_worker(uris).await
	}

	/// A synced worker resolved through the language id.
	pub async fn language_worker(&self, language_id: &str, uris: &[Url]) -> Result<WorkerClient> {
		let label = self.by_language.read().get(language_id).cloned();
		match label {
			Some(label) => self.worker(&label, uris).await,
			None if self.languages.get(language_id).is_some() => {
				Err(Error::NoWorker(language_id.to_owned()))
			}
			None => Err(Error::UnknownLanguage(language_id.to_owned())),
		}
	}

	/// The lifecycle behind `label`, for epoch subscriptions and inspection.
	pub fn worker_lifecycle(&self, label: &str) -> Result<Arc<WorkerLifecycle>> {
		self.lifecycles
			.read()
			.get(label)
			.cloned()
			.ok_or_else(|| Error::UnknownLabel(label.to_owned()))
	}

	/// Replace the options blob for `label`, stopping its warm worker.
	pub async fn set_options(&self, label: &str, options: Value) -> Result<()> {
		self.worker_lifecycle(label)?.set_options(options).await;
		Ok(())
	}

	/// Shallow-merge `patch` over the options for `label`.
	pub async fn update_options(&self, label: &str, patch: Value) -> Result<()> {
		self.worker_lifecycle(label)?.update_options(patch).await;
		Ok(())
	}

	/// The asset cell for `language_id`, if the registration carries one.
	pub fn assets(&self, language_id: &str) -> Option<Arc<AssetCell>> {
		self.loaders.get(language_id)
	}

	/// Load (triggering the import if needed) a language's assets.
	///
	/// A language registered without a lazy loader answers with empty
	/// assets; an unregistered language is an error.
	pub async fn load_assets(&self, language_id: &str) -> Result<Arc<LanguageAssets>> {
		if let Some(cell) = self.loaders.get(language_id) {
			return Ok(cell.load().await?);
		}
		if self.languages.get(language_id).is_some() {
			return Ok(Arc::new(LanguageAssets::default()));
		}
		Err(Error::UnknownLanguage(language_id.to_owned()))
	}

	/// Tear everything down: hooks out of the host, workers stopped,
	/// lifecycles disposed. The runtime stays usable for new registrations.
	pub async fn shutdown(&self) {
		self.providers.dispose_all();
		let lifecycles: Vec<Arc<WorkerLifecycle>> = {
			self.lifecycles.write().drain().map(|(_, l)| l).collect()
		};
		for lifecycle in lifecycles {
			lifecycle.dispose().await;
		}
		self.by_language.write().clear();
	}

	async fn remove_worker_for(&self, language_id: &str) {
		let label = self.by_language.write().remove(language_id);
		let Some(label) = label else {
			return;
		};
		self.providers.dispose_language(language_id);
		if let Some(lifecycle) = self.take_lifecycle(&label) {
			lifecycle.dispose().await;
		}
	}

	fn take_lifecycle(&self, label: &str) -> Option<Arc<WorkerLifecycle>> {
		self.lifecycles.write().remove(label)
	}
}
