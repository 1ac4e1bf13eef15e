//! The trait a language backend implements, and the factory that builds it.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::capability::Capability;
use crate::protocol::WorkerFault;
use crate::store::DocumentStore;

/// A language analysis backend running behind a transport.
///
/// Implementations are single-threaded from their own point of view: the
/// substrate delivers one request at a time, with the document mirror
/// already updated. Failures are returned as [`WorkerFault`]s; the worker
/// stays alive afterwards.
#[async_trait]
pub trait Worker: Send + 'static {
	/// The capabilities this worker implements. Requests naming anything
	/// else are answered with `null` by the substrate, not routed here.
	fn capabilities(&self) -> &[Capability];

	/// Serve one capability request for `uri`.
	///
	/// `args` carries capability-specific parameters (a position for hover
	/// and completion, nothing for diagnostics and formatting). The answer
	/// is the capability's payload, or `Value::Null` for "no answer".
	async fn provide(
		&mut self,
		documents: &DocumentStore,
		capability: Capability,
		uri: &Url,
		args: &[Value],
	) -> Result<Value, WorkerFault>;

	/// Invoke a named operation outside the provider set.
	async fn call(
		&mut self,
		documents: &DocumentStore,
		method: &str,
		args: &[Value],
	) -> Result<Value, WorkerFault> {
		let _ = (documents, args);
		Err(WorkerFault::new(format!("unknown operation `{method}`")))
	}
}

/// Builds [`Worker`] instances for one label (module identifier).
///
/// The factory also declares, ahead of any instantiation, which
/// capabilities its workers serve; registration checks declared
/// capabilities against this list and fails fast on a mismatch.
pub trait WorkerFactory: Send + Sync + 'static {
	/// The label this factory serves.
	fn label(&self) -> &str;

	/// Capabilities every worker built by this factory implements.
	fn capabilities(&self) -> &[Capability];

	/// Build a fresh worker with the registration's current options blob.
	fn create(&self, options: &Value) -> Result<Box<dyn Worker>, WorkerFault>;
}
