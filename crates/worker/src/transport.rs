//! The transport contract between the host runtime and workers.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::capability::Capability;
use crate::protocol::WorkerRequest;

/// Identity of one worker instance.
///
/// The slot is stable per label; the generation increments on every
/// (re)start, so a restarted worker is distinguishable from the instance it
/// replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId {
	pub slot: u32,
	pub generation: u32,
}

impl fmt::Display for WorkerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.slot, self.generation)
	}
}

/// What to start: a module identifier plus its initial options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
	pub label: String,
	#[serde(default)]
	pub options: Value,
}

impl WorkerSpec {
	pub fn new(label: impl Into<String>, options: Value) -> Self {
		Self {
			label: label.into(),
			options,
		}
	}
}

/// Starts, routes to, and stops worker instances.
///
/// Implementations own the instance table; callers hold only [`WorkerId`]s.
/// Requests are correlated to responses by the transport itself, so any
/// number of logical requests may be outstanding while the underlying
/// message stream stays serial per worker.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
	/// Start a worker for `spec` and return its id.
	async fn start(&self, spec: WorkerSpec) -> Result<WorkerId>;

	/// Dispatch one request and await its answer.
	///
	/// With a timeout, [`Error::RequestTimeout`](crate::Error::RequestTimeout)
	/// is returned once the deadline passes; the worker keeps running.
	async fn request(
		&self,
		id: WorkerId,
		request: WorkerRequest,
		timeout: Option<Duration>,
	) -> Result<Value>;

	/// Stop a worker. Idempotent; unknown ids are a no-op.
	async fn stop(&self, id: WorkerId) -> Result<()>;

	/// Capabilities the module behind `label` declares, or `None` when the
	/// label is unknown. Lets callers reject a capability mismatch before any
	/// worker is started.
	fn declared_capabilities(&self, label: &str) -> Option<Vec<Capability>>;

	/// Ids of the currently live workers.
	fn live(&self) -> Vec<WorkerId>;
}
