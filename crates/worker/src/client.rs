//! Typed handle for talking to one worker instance.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::Result;
use crate::capability::Capability;
use crate::protocol::WorkerRequest;
use crate::transport::{WorkerId, WorkerTransport};
use crate::types::DocumentSnapshot;

/// A cheap, cloneable proxy to one live worker.
///
/// Holds the worker's identity and the transport; every method is one
/// request/response round-trip with the handle's timeout applied.
#[derive(Clone)]
pub struct WorkerClient {
	id: WorkerId,
	label: Arc<str>,
	transport: Arc<dyn WorkerTransport>,
	timeout: Option<Duration>,
}

impl WorkerClient {
	pub fn new(
		id: WorkerId,
		label: impl Into<Arc<str>>,
		transport: Arc<dyn WorkerTransport>,
		timeout: Option<Duration>,
	) -> Self {
		Self {
			id,
			label: label.into(),
			transport,
			timeout,
		}
	}

	/// Identity of the instance behind this handle.
	pub fn id(&self) -> WorkerId {
		self.id
	}

	pub fn label(&self) -> &str {
		&self.label
	}

	/// Serve one capability for `uri`, returning the raw payload.
	pub async fn provide(
		&self,
		capability: Capability,
		uri: &Url,
		args: Vec<Value>,
	) -> Result<Value> {
		self.request(WorkerRequest::Provide {
			capability,
			uri: uri.clone(),
			args,
		})
		.await
	}

	/// Like [`provide`](Self::provide), decoding the payload. `null` maps to
	/// `None`.
	pub async fn provide_as<T: DeserializeOwned>(
		&self,
		capability: Capability,
		uri: &Url,
		args: Vec<Value>,
	) -> Result<Option<T>> {
		let value = self.provide(capability, uri, args).await?;
		decode(value)
	}

	/// Invoke a named worker operation.
	pub async fn call(&self, method: impl Into<String>, args: Vec<Value>) -> Result<Value> {
		self.request(WorkerRequest::Call {
			method: method.into(),
			args,
		})
		.await
	}

	/// Like [`call`](Self::call), decoding the payload. `null` maps to
	/// `None`.
	pub async fn call_as<T: DeserializeOwned>(
		&self,
		method: impl Into<String>,
		args: Vec<Value>,
	) -> Result<Option<T>> {
		let value = self.call(method, args).await?;
		decode(value)
	}

	/// Mirror snapshots into the worker.
	pub async fn sync_documents(&self, documents: Vec<DocumentSnapshot>) -> Result<()> {
		self.request(WorkerRequest::SyncDocuments { documents }).await?;
		Ok(())
	}

	/// Drop mirrored documents from the worker.
	pub async fn release_documents(&self, uris: Vec<Url>) -> Result<()> {
		self.request(WorkerRequest::ReleaseDocuments { uris }).await?;
		Ok(())
	}

	async fn request(&self, request: WorkerRequest) -> Result<Value> {
		self.transport.request(self.id, request, self.timeout).await
	}
}

impl fmt::Debug for WorkerClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WorkerClient")
			.field("id", &self.id)
			.field("label", &self.label)
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<Option<T>> {
	if value.is_null() {
		return Ok(None);
	}
	Ok(Some(serde_json::from_value(value)?))
}
