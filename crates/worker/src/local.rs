//! In-process transport running each worker as an isolated tokio task.
//!
//! Workers built here share no state with the host: requests travel as
//! owned messages over a per-worker channel and are answered through
//! per-request oneshot channels. The task handles one request at a time, so
//! the message stream stays serial per worker while any number of logical
//! requests are outstanding.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::capability::Capability;
use crate::protocol::{RequestEnvelope, ResponseEnvelope, WorkerFault, WorkerRequest};
use crate::store::DocumentStore;
use crate::transport::{WorkerId, WorkerSpec, WorkerTransport};
use crate::worker::{Worker, WorkerFactory};
use crate::{Error, Result};

/// One request staged for a worker task, with its reply channel.
struct PendingRequest {
	envelope: RequestEnvelope,
	response_tx: oneshot::Sender<ResponseEnvelope>,
}

/// State for a running worker task.
struct WorkerTask {
	request_tx: mpsc::UnboundedSender<PendingRequest>,
	join: JoinHandle<()>,
}

/// Slot bookkeeping per label: the slot is stable, the generation bumps on
/// every start.
struct SlotState {
	slot: u32,
	next_generation: u32,
}

/// In-process [`WorkerTransport`] backed by tokio tasks.
pub struct LocalTransport {
	factories: RwLock<HashMap<String, Arc<dyn WorkerFactory>>>,
	workers: RwLock<HashMap<WorkerId, WorkerTask>>,
	slots: Mutex<HashMap<String, SlotState>>,
	next_slot: AtomicU32,
	next_request_id: AtomicU64,
}

impl LocalTransport {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Register the factory serving `factory.label()`. Replaces any previous
	/// factory with the same label; running workers are unaffected.
	pub fn register_factory(&self, factory: Arc<dyn WorkerFactory>) {
		self.factories
			.write()
			.insert(factory.label().to_owned(), factory);
	}

	fn factory(&self, label: &str) -> Result<Arc<dyn WorkerFactory>> {
		self.factories
			.read()
			.get(label)
			.cloned()
			.ok_or_else(|| Error::UnknownLabel(label.to_owned()))
	}

	fn allocate_id(&self, label: &str) -> WorkerId {
		let mut slots = self.slots.lock();
		let state = slots.entry(label.to_owned()).or_insert_with(|| SlotState {
			slot: self.next_slot.fetch_add(1, Ordering::Relaxed),
			next_generation: 0,
		});
		let generation = state.next_generation;
		state.next_generation += 1;
		WorkerId {
			slot: state.slot,
			generation,
		}
	}
}

impl Default for LocalTransport {
	fn default() -> Self {
		Self {
			factories: RwLock::new(HashMap::new()),
			workers: RwLock::new(HashMap::new()),
			slots: Mutex::new(HashMap::new()),
			next_slot: AtomicU32::new(0),
			next_request_id: AtomicU64::new(0),
		}
	}
}

#[async_trait]
impl WorkerTransport for LocalTransport {
	async fn start(&self, spec: WorkerSpec) -> Result<WorkerId> {
		let factory = self.factory(&spec.label)?;
		let worker = factory.create(&spec.options).map_err(|fault| Error::Spawn {
			label: spec.label.clone(),
			reason: fault.message,
		})?;

		let id = self.allocate_id(&spec.label);
		tracing::info!(worker = %id, label = %spec.label, "starting local worker");

		let (request_tx, request_rx) = mpsc::unbounded_channel::<PendingRequest>();
		let join = tokio::spawn(run_worker(id, spec.label, worker, request_rx));
		self.workers.write().insert(id, WorkerTask { request_tx, join });

		Ok(id)
	}

	async fn request(
		&self,
		id: WorkerId,
		request: WorkerRequest,
		timeout: Option<Duration>,
	) -> Result<Value> {
		let kind = request.kind();
		let envelope = RequestEnvelope {
			id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
			request,
		};
		let (response_tx, response_rx) = oneshot::channel();

		{
			let workers = self.workers.read();
			let task = workers.get(&id).ok_or(Error::Stopped)?;
			task.request_tx
				.send(PendingRequest {
					envelope,
					response_tx,
				})
				.map_err(|_| Error::Stopped)?;
		}

		let timeout_duration = timeout.unwrap_or(Duration::from_secs(30));
		match tokio::time::timeout(timeout_duration, response_rx).await {
			Ok(Ok(response)) => response.result.map_err(Error::Fault),
			// The task ended (or panicked) before answering.
			Ok(Err(_)) => Err(Error::Stopped),
			Err(_) => {
				warn!(worker = %id, request = kind, "worker request timed out");
				Err(Error::RequestTimeout(timeout_duration))
			}
		}
	}

	async fn stop(&self, id: WorkerId) -> Result<()> {
		let task = {
			let mut workers = self.workers.write();
			workers.remove(&id)
		};

		let Some(task) = task else {
			return Ok(()); // idempotent
		};

		// Dropping the sender lets the loop drain and end; abort if it
		// doesn't wind down in time.
		let WorkerTask {
			request_tx,
			mut join,
		} = task;
		drop(request_tx);
		if tokio::time::timeout(Duration::from_secs(2), &mut join)
			.await
			.is_err()
		{
			join.abort();
		}

		Ok(())
	}

	fn declared_capabilities(&self, label: &str) -> Option<Vec<Capability>> {
		self.factories
			.read()
			.get(label)
			.map(|factory| factory.capabilities().to_vec())
	}

	fn live(&self) -> Vec<WorkerId> {
		let mut ids: Vec<_> = self.workers.read().keys().copied().collect();
		ids.sort_unstable();
		ids
	}
}

/// The worker task: applies document traffic, routes capability requests,
/// and answers every envelope exactly once.
async fn run_worker(
	id: WorkerId,
	label: String,
	mut worker: Box<dyn Worker>,
	mut request_rx: mpsc::UnboundedReceiver<PendingRequest>,
) {
	let mut documents = DocumentStore::default();
	while let Some(PendingRequest {
		envelope,
		response_tx,
	}) = request_rx.recv().await
	{
		let RequestEnvelope {
			id: request_id,
			request,
		} = envelope;
		let result = handle_request(id, &mut *worker, &mut documents, request).await;
		if let Err(fault) = &result {
			debug!(worker = %id, request = request_id, error = %fault, "worker request faulted");
		}
		let _ = response_tx.send(ResponseEnvelope {
			id: request_id,
			result,
		});
	}
	debug!(worker = %id, label = %label, "worker loop ended");
}

async fn handle_request(
	id: WorkerId,
	worker: &mut dyn Worker,
	documents: &mut DocumentStore,
	request: WorkerRequest,
) -> Result<Value, WorkerFault> {
	match request {
		WorkerRequest::SyncDocuments { documents: snapshots } => {
			for snapshot in snapshots {
				documents.apply(snapshot);
			}
			Ok(Value::Null)
		}
		WorkerRequest::ReleaseDocuments { uris } => {
			for uri in &uris {
				documents.release(uri);
			}
			Ok(Value::Null)
		}
		WorkerRequest::Provide {
			capability,
			uri,
			args,
		} => {
			if !worker.capabilities().contains(&capability) {
				warn!(worker = %id, capability = %capability, "no provider for capability");
				return Ok(Value::Null);
			}
			worker.provide(documents, capability, &uri, &args).await
		}
		WorkerRequest::Call { method, args } => worker.call(documents, &method, &args).await,
	}
}
