//! The editor seam: what the runtime needs from its embedding editor.
//!
//! The runtime never renders anything and never owns document text. It
//! observes models through [`TextModel`], reacts to lifecycle events, and
//! pushes two things back: capability hooks (installed per language) and
//! diagnostic markers. Everything else about the editor is out of scope.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, watch};
use url::Url;

use petrel_worker::{CompletionItem, DocumentSnapshot, Hover, Marker, Position, TextEdit};

/// A read-only view of one open document.
pub trait TextModel: Send + Sync {
	fn uri(&self) -> Url;
	fn language_id(&self) -> String;
	/// Monotonic per-model edit counter.
	fn version(&self) -> i32;
	fn text(&self) -> String;
	/// Watch of [`version`](Self::version); ticks on every edit.
	fn watch_version(&self) -> watch::Receiver<i32>;

	/// Owned snapshot of the model as of now.
	fn snapshot(&self) -> DocumentSnapshot {
		DocumentSnapshot::new(self.uri(), self.language_id(), self.version(), self.text())
	}
}

/// Model lifecycle events broadcast by the host.
#[derive(Debug, Clone)]
pub enum ModelEvent {
	Opened(Url),
	Closed(Url),
	/// The model now speaks `language_id`.
	LanguageChanged { uri: Url, language_id: String },
	FocusChanged(Option<Url>),
}

/// Identity of one installed provider hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(pub u64);

/// Async callback signatures the editor invokes on user interaction.
///
/// Failure never escapes a hook: the runtime maps errors to each
/// capability's neutral value (`None`, or an empty list) before the editor
/// sees them.
pub type HoverFn = Arc<dyn Fn(Url, Position) -> BoxFuture<'static, Option<Hover>> + Send + Sync>;
pub type CompletionFn =
	Arc<dyn Fn(Url, Position) -> BoxFuture<'static, Vec<CompletionItem>> + Send + Sync>;
pub type FormattingFn = Arc<dyn Fn(Url) -> BoxFuture<'static, Vec<TextEdit>> + Send + Sync>;

/// One capability hook handed to the editor.
#[derive(Clone)]
pub enum ProviderHook {
	Hover(HoverFn),
	Completion {
		trigger_characters: Vec<String>,
		provide: CompletionFn,
	},
	Formatting(FormattingFn),
}

impl ProviderHook {
	/// Short name for logging.
	pub fn kind(&self) -> &'static str {
		match self {
			ProviderHook::Hover(_) => "hover",
			ProviderHook::Completion { .. } => "completion",
			ProviderHook::Formatting(_) => "formatting",
		}
	}
}

impl std::fmt::Debug for ProviderHook {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("ProviderHook").field(&self.kind()).finish()
	}
}

/// The embedding editor, as seen from the runtime.
pub trait EditorHost: Send + Sync {
	fn model(&self, uri: &Url) -> Option<Arc<dyn TextModel>>;
	fn models(&self) -> Vec<Arc<dyn TextModel>>;
	/// The model currently holding focus, if any.
	fn focused(&self) -> Option<Url>;
	/// Subscribe to model lifecycle events.
	fn subscribe(&self) -> broadcast::Receiver<ModelEvent>;

	/// Replace the markers owned by `owner` on `uri`.
	fn set_markers(&self, uri: &Url, owner: &str, markers: Vec<Marker>);

	/// Install a capability hook for models of `language_id`.
	fn install_provider(&self, language_id: &str, provider: ProviderHook) -> HookId;
	/// Remove a previously installed hook. Unknown ids are a no-op.
	fn remove_provider(&self, id: HookId);
}
