//! Lazy, single-flight loading of language assets.
//!
//! Each language gets one [`AssetCell`]. The first `load()` spawns the
//! deferred import exactly once; every other caller, before or after,
//! shares the same outcome through a watch channel. Failure is terminal:
//! the cell parks in [`LoadState::Failed`] and keeps answering with the
//! original error instead of re-importing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::language::LanguageAssets;

/// The deferred import: produces a language's assets on first demand.
pub type AssetLoader =
	Arc<dyn Fn() -> BoxFuture<'static, Result<LanguageAssets, LoadError>> + Send + Sync>;

/// Why a language's assets failed to load.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to load assets for `{language}`: {reason}")]
pub struct LoadError {
	pub language: String,
	pub reason: String,
}

impl LoadError {
	pub fn new(language: impl Into<String>, reason: impl Into<String>) -> Self {
		Self {
			language: language.into(),
			reason: reason.into(),
		}
	}
}

/// Where a cell is in its life.
#[derive(Debug, Clone, Default)]
pub enum LoadState {
	#[default]
	Unstarted,
	Loading,
	Loaded(Arc<LanguageAssets>),
	Failed(Arc<LoadError>),
}

impl LoadState {
	pub fn is_terminal(&self) -> bool {
		matches!(self, LoadState::Loaded(_) | LoadState::Failed(_))
	}
}

/// Single-flight holder for one language's assets.
pub struct AssetCell {
	language: String,
	loader: AssetLoader,
	state: watch::Sender<LoadState>,
	started: AtomicBool,
}

impl AssetCell {
	pub fn new(language: impl Into<String>, loader: AssetLoader) -> Arc<Self> {
		let (state, _) = watch::channel(LoadState::Unstarted);
		Arc::new(Self {
			language: language.into(),
			loader,
			state,
			started: AtomicBool::new(false),
		})
	}

	pub fn language(&self) -> &str {
		&self.language
	}

	/// Current state, without influencing it.
	pub fn state(&self) -> LoadState {
		self.state.borrow().clone()
	}

	/// Kick off the import if nobody has yet. Returns immediately.
	pub fn trigger(self: &Arc<Self>) {
		if self.started.swap(true, Ordering::SeqCst) {
			return;
		}
		self.state.send_replace(LoadState::Loading);
		debug!(language = %self.language, "loading language assets");

		let cell = Arc::clone(self);
		tokio::spawn(async move {
			let next = match (cell.loader)().await {
				Ok(assets) => LoadState::Loaded(Arc::new(assets)),
				Err(err) => {
					error!(language = %cell.language, error = %err, "language asset load failed");
					LoadState::Failed(Arc::new(err))
				}
			};
			cell.state.send_replace(next);
		});
	}

	/// Trigger the import if needed and await its outcome.
	pub async fn load(self: &Arc<Self>) -> Result<Arc<LanguageAssets>, Arc<LoadError>> {
		self.trigger();
		self.when_loaded().await
	}

	/// Await the terminal state without triggering the import. Safe to call
	/// before loading starts; it simply waits.
	pub async fn when_loaded(&self) -> Result<Arc<LanguageAssets>, Arc<LoadError>> {
		let mut rx = self.state.subscribe();
		loop {
			let current = rx.borrow_and_update().clone();
			match current {
				LoadState::Loaded(assets) => return Ok(assets),
				LoadState::Failed(err) => return Err(err),
				LoadState::Unstarted | LoadState::Loading => {}
			}
			// The sender lives in `self`, so this only yields until the
			// next state change.
			if rx.changed().await.is_err() {
				return Err(Arc::new(LoadError::new(
					&self.language,
					"loader state channel closed",
				)));
			}
		}
	}
}

impl std::fmt::Debug for AssetCell {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AssetCell")
			.field("language", &self.language)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}

/// Per-runtime index of asset cells, one per language id.
#[derive(Default)]
pub struct LoaderRegistry {
	cells: RwLock<HashMap<String, Arc<AssetCell>>>,
}

impl LoaderRegistry {
	/// Return the existing cell for `language`, failed or not, or create one
	/// with `loader`. A failed cell keeps its failure; callers wanting a
	/// retry need a fresh registry.
	pub fn get_or_create(&self, language: &str, loader: AssetLoader) -> Arc<AssetCell> {
		if let Some(cell) = self.cells.read().get(language) {
			return Arc::clone(cell);
		}
		let mut cells = self.cells.write();
		Arc::clone(
			cells
				.entry(language.to_owned())
				.or_insert_with(|| AssetCell::new(language, loader)),
		)
	}

	pub fn get(&self, language: &str) -> Option<Arc<AssetCell>> {
		self.cells.read().get(language).cloned()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;
	use std::time::Duration;

	use futures::FutureExt;
	use pretty_assertions::assert_eq;

	use super::*;

	fn counting_loader(
		counter: Arc<AtomicUsize>,
		outcome: Result<LanguageAssets, LoadError>,
	) -> AssetLoader {
		Arc::new(move || {
			let counter = Arc::clone(&counter);
			let outcome = outcome.clone();
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				tokio::task::yield_now().await;
				outcome
			}
			.boxed()
		})
	}

	#[tokio::test]
	async fn concurrent_loads_import_once() {
		let counter = Arc::new(AtomicUsize::new(0));
		let cell = AssetCell::new(
			"graphql",
			counting_loader(Arc::clone(&counter), Ok(LanguageAssets::default())),
		);

		let (a, b, c) = tokio::join!(cell.load(), cell.load(), cell.load());
		assert!(a.is_ok() && b.is_ok() && c.is_ok());
		assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn failure_is_sticky() {
		let counter = Arc::new(AtomicUsize::new(0));
		let cell = AssetCell::new(
			"graphql",
			counting_loader(
				Arc::clone(&counter),
				Err(LoadError::new("graphql", "import exploded")),
			),
		);

		let first = cell.load().await.unwrap_err();
		let second = cell.load().await.unwrap_err();
		assert_eq!(first.reason, "import exploded");
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(counter.load(Ordering::SeqCst), 1);
		assert!(matches!(cell.state(), LoadState::Failed(_)));
	}

	#[tokio::test(start_paused = true)]
	async fn when_loaded_waits_without_triggering() {
		let counter = Arc::new(AtomicUsize::new(0));
		let cell = AssetCell::new(
			"graphql",
			counting_loader(Arc::clone(&counter), Ok(LanguageAssets::default())),
		);

		let waited =
			tokio::time::timeout(Duration::from_millis(200), cell.when_loaded()).await;
		assert!(waited.is_err(), "when_loaded must not start the import");
		assert_eq!(counter.load(Ordering::SeqCst), 0);
		assert!(matches!(cell.state(), LoadState::Unstarted));

		let pending = {
			let cell = Arc::clone(&cell);
			tokio::spawn(async move { cell.when_loaded().await })
		};
		cell.trigger();
		let assets = pending.await.unwrap().unwrap();
		assert_eq!(*assets, LanguageAssets::default());
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn registry_returns_the_same_cell_even_after_failure() {
		let registry = LoaderRegistry::default();
		let counter = Arc::new(AtomicUsize::new(0));
		let loader = counting_loader(
			Arc::clone(&counter),
			Err(LoadError::new("graphql", "boom")),
		);

		let first = registry.get_or_create("graphql", Arc::clone(&loader));
		let _ = first.load().await;
		let second = registry.get_or_create("graphql", loader);
		assert!(Arc::ptr_eq(&first, &second));
		assert!(matches!(second.state(), LoadState::Failed(_)));
	}
}
