//! Host-side language runtime.
//!
//! A [`Runtime`] owns every piece of per-process state the language layer
//! needs: the language registry, the lazy asset loaders, one worker
//! lifecycle per registered worker label, and the provider hooks installed
//! into the editor. Nothing in this crate lives in module-level statics;
//! independent runtimes coexist freely, which is also how the tests run.
//!
//! The runtime talks outward through two seams: an [`EditorHost`] (document
//! models, focus, markers, capability hooks) and a
//! [`WorkerTransport`](petrel_worker::WorkerTransport) (worker instances).
//! In-memory implementations of both exist ([`memory::MemoryHost`] here,
//! [`petrel_worker::LocalTransport`] there), so the whole stack runs
//! self-contained.

pub mod diagnostics;
pub mod editor;
pub mod language;
pub mod lifecycle;
pub mod loader;
pub mod memory;
pub mod providers;
pub mod runtime;

use std::sync::Arc;

pub use editor::{EditorHost, HookId, ModelEvent, ProviderHook, TextModel};
pub use language::{LanguageAssets, LanguageConfiguration, LanguageDefinition, WorkerDescriptor};
pub use lifecycle::{WorkerLifecycle, WorkerTuning};
pub use loader::{AssetCell, AssetLoader, LoadError, LoadState};
pub use petrel_worker::{
	Capability, CapabilityConfig, CapabilitySet, ResolvedCapabilities, WorkerClient, WorkerId,
};
pub use runtime::Runtime;

/// Errors raised by the runtime layer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// No language with this id has been registered.
	#[error("no language registered with id `{0}`")]
	UnknownLanguage(String),

	/// The language exists but carries no worker descriptor.
	#[error("language `{0}` has no worker registration")]
	NoWorker(String),

	/// No worker registration with this label.
	#[error("no worker registration with label `{0}`")]
	UnknownLabel(String),

	/// A registration declared a capability its worker module cannot serve.
	#[error("registration `{label}` declares `{capability}` but the worker module does not serve it")]
	UnsupportedCapability {
		label: String,
		capability: Capability,
	},

	/// The registration has been disposed.
	#[error("worker registration `{0}` is disposed")]
	Disposed(String),

	/// Language assets failed to load; the failure is sticky per cell.
	#[error("language asset load failed: {0}")]
	AssetLoad(Arc<LoadError>),

	/// An error from the worker substrate.
	#[error(transparent)]
	Worker(#[from] petrel_worker::Error),
}

impl From<Arc<LoadError>> for Error {
	fn from(error: Arc<LoadError>) -> Self {
		Error::AssetLoad(error)
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
