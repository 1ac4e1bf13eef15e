//! Per-label worker lifecycle: start on demand, reuse while warm, evict
//! when idle, restart eagerly after reconfiguration.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use petrel_worker::{
	Error as WorkerError, WorkerClient, WorkerId, WorkerSpec, WorkerTransport,
};

use crate::editor::{EditorHost, ModelEvent};
use crate::{Error, Result};

/// How often the idle sweeper looks at the worker.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// How long a worker may sit unused before eviction.
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(120);

/// Lifecycle timing knobs. Tests shrink these under paused time.
#[derive(Debug, Clone, Copy)]
pub struct WorkerTuning {
	pub sweep_interval: Duration,
	pub idle_threshold: Duration,
	/// Per-request deadline; `None` uses the transport default.
	pub request_timeout: Option<Duration>,
}

impl Default for WorkerTuning {
	fn default() -> Self {
		Self {
			sweep_interval: SWEEP_INTERVAL,
			idle_threshold: IDLE_THRESHOLD,
			request_timeout: None,
		}
	}
}

/// The warm worker plus what has been mirrored into it.
struct LiveWorker {
	client: WorkerClient,
	/// URI → last synced version.
	synced: HashMap<Url, i32>,
	last_used: Instant,
}

/// Runtime state for one worker registration.
///
/// At most one worker is live per lifecycle. Callers go through
/// [`synced_worker`](Self::synced_worker), which starts the worker if
/// needed, pushes stale document snapshots first, and returns a request
/// handle; the slot lock serializes creation so concurrent callers share
/// one start. Creation failures cache nothing; every call is an
/// independent attempt.
pub struct WorkerLifecycle {
	label: String,
	language_id: String,
	options: ArcSwap<Value>,
	epoch: watch::Sender<u64>,
	tuning: WorkerTuning,
	transport: Arc<dyn WorkerTransport>,
	host: Arc<dyn EditorHost>,
	slot: Mutex<Option<LiveWorker>>,
	shutdown: CancellationToken,
	disposed: AtomicBool,
}

impl WorkerLifecycle {
	pub fn new(
		label: impl Into<String>,
		language_id: impl Into<String>,
		options: Value,
		tuning: WorkerTuning,
		transport: Arc<dyn WorkerTransport>,
		host: Arc<dyn EditorHost>,
	) -> Arc<Self> {
		let (epoch, _) = watch::channel(0);
		let lifecycle = Arc::new(Self {
			label: label.into(),
			language_id: language_id.into(),
			options: ArcSwap::from_pointee(options),
			epoch,
			tuning,
			transport,
			host,
			slot: Mutex::new(None),
			shutdown: CancellationToken::new(),
			disposed: AtomicBool::new(false),
		});
		lifecycle.spawn_sweeper();
		lifecycle.spawn_release_listener();
		lifecycle
	}

	pub fn label(&self) -> &str {
		&self.label
	}

	pub fn language_id(&self) -> &str {
		&self.language_id
	}

	/// Current options blob (copy-on-write; swapped whole on mutation).
	pub fn options(&self) -> Arc<Value> {
		self.options.load_full()
	}

	/// Ticks once per options/config mutation.
	pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
		self.epoch.subscribe()
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	/// Identity of the warm worker, if one is live.
	pub async fn current_worker(&self) -> Option<WorkerId> {
		self.slot.lock().await.as_ref().map(|live| live.client.id())
	}

	/// Ensure a live worker with `uris` mirrored and current, and return a
	/// request handle to it.
	///
	/// URIs whose model is no longer open are skipped; the release listener
	/// keeps the mirror from referencing closed documents.
	pub async fn synced_worker(&self, uris: &[Url]) -> Result<WorkerClient> {
		if self.is_disposed() {
			return Err(Error::Disposed(self.label.clone()));
		}

		let mut slot = self.slot.lock().await;
		if slot.is_none() {
			let options = Value::clone(&self.options.load());
			let spec = WorkerSpec::new(self.label.clone(), options);
			let id = self.transport.start(spec).await?;
			info!(label = %self.label, worker = %id, "started worker");
			let client = WorkerClient::new(
				id,
				self.label.as_str(),
				Arc::clone(&self.transport),
				self.tuning.request_timeout,
			);
			*slot = Some(LiveWorker {
				client,
				synced: HashMap::new(),
				last_used: Instant::now(),
			});
		}
		let Some(live) = slot.as_mut() else {
			return Err(Error::Disposed(self.label.clone()));
		};

		let mut pending = Vec::new();
		for uri in uris {
			let Some(model) = self.host.model(uri) else {
				continue;
			};
			let snapshot = model.snapshot();
			if live.synced.get(uri).copied() != Some(snapshot.version) {
				pending.push(snapshot);
			}
		}

		let sync_result = if pending.is_empty() {
			Ok(())
		} else {
			live.client.sync_documents(pending.clone()).await
		};
		match sync_result {
			Ok(()) => {
				for snapshot in pending {
					live.synced.insert(snapshot.uri.clone(), snapshot.version);
				}
				live.last_used = Instant::now();
				Ok(live.client.clone())
			}
			Err(error) => {
				// A dead task means the warm handle is useless; clear it so
				// the next call restarts instead of failing forever.
				if matches!(error, WorkerError::Stopped) {
					slot.take();
				}
				Err(error.into())
			}
		}
	}

	/// Stop the warm worker, if any. The next [`synced_worker`] call starts
	/// a fresh instance.
	pub async fn stop_worker(&self) {
		let live = { self.slot.lock().await.take() };
		if let Some(live) = live {
			info!(label = %self.label, worker = %live.client.id(), "stopping worker");
			if let Err(error) = self.transport.stop(live.client.id()).await {
				warn!(label = %self.label, error = %error, "failed to stop worker");
			}
		}
	}

	/// Replace the options blob wholesale and restart eagerly.
	pub async fn set_options(&self, options: Value) {
		self.options.store(Arc::new(options));
		self.epoch.send_modify(|e| *e += 1);
		self.stop_worker().await;
	}

	/// Shallow-merge `patch` over the current options (top-level keys) and
	/// swap the merged blob in; non-object patches replace outright.
	pub async fn update_options(&self, patch: Value) {
		let merged = merge_options(Value::clone(&self.options.load()), patch);
		self.set_options(merged).await;
	}

	/// Tear the lifecycle down: cancel the sweeper, stop the worker. Later
	/// calls fail with [`Error::Disposed`].
	pub async fn dispose(&self) {
		if self.disposed.swap(true, Ordering::SeqCst) {
			return;
		}
		self.shutdown.cancel();
		self.stop_worker().await;
	}

	fn spawn_sweeper(self: &Arc<Self>) {
		let weak = Arc::downgrade(self);
		let cancel = self.shutdown.clone();
		let period = self.tuning.sweep_interval;
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			ticker.tick().await; // the immediate first tick
			loop {
				tokio::select! {
					_ = cancel.cancelled() => break,
					_ = ticker.tick() => {}
				}
				let Some(lifecycle) = weak.upgrade() else { break };
				lifecycle.sweep_idle().await;
			}
		});
	}

	async fn sweep_idle(&self) {
		let idle = {
			let mut slot = self.slot.lock().await;
			let expired = slot
				.as_ref()
				.is_some_and(|live| live.last_used.elapsed() >= self.tuning.idle_threshold);
			if expired { slot.take() } else { None }
		};
		if let Some(live) = idle {
			info!(
				label = %self.label,
				worker = %live.client.id(),
				idle_threshold = ?self.tuning.idle_threshold,
				"evicting idle worker"
			);
			if let Err(error) = self.transport.stop(live.client.id()).await {
				warn!(label = %self.label, error = %error, "failed to stop idle worker");
			}
		}
	}

	fn spawn_release_listener(self: &Arc<Self>) {
		let weak = Arc::downgrade(self);
		let cancel = self.shutdown.clone();
		let mut events = self.host.subscribe();
		tokio::spawn(async move {
			loop {
				let event = tokio::select! {
					_ = cancel.cancelled() => break,
					event = events.recv() => event,
				};
				let Some(lifecycle) = weak.upgrade() else { break };
				match event {
					Ok(ModelEvent::Closed(uri)) => lifecycle.release_resource(&uri).await,
					Ok(ModelEvent::LanguageChanged { uri, language_id })
						if language_id != lifecycle.language_id =>
					{
						lifecycle.release_resource(&uri).await;
					}
					Ok(_) => {}
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!(label = %lifecycle.label, skipped, "model events lagged; resyncing mirror");
						lifecycle.resync_open_set().await;
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		});
	}

	async fn release_resource(&self, uri: &Url) {
		let client = {
			let mut slot = self.slot.lock().await;
			let Some(live) = slot.as_mut() else { return };
			if live.synced.remove(uri).is_none() {
				return;
			}
			live.client.clone()
		};
		if let Err(error) = client.release_documents(vec![uri.clone()]).await {
			debug!(label = %self.label, uri = %uri, error = %error, "failed to release document");
		}
	}

	/// Drop mirror entries for models the host no longer has open. Used
	/// after an event-stream lag, when individual close events may have
	/// been missed.
	async fn resync_open_set(&self) {
		let open: HashSet<Url> = self.host.models().iter().map(|m| m.uri()).collect();
		let (client, stale) = {
			let mut slot = self.slot.lock().await;
			let Some(live) = slot.as_mut() else { return };
			let stale: Vec<Url> = live
				.synced
				.keys()
				.filter(|uri| !open.contains(*uri))
				.cloned()
				.collect();
			for uri in &stale {
				live.synced.remove(uri);
			}
			(live.client.clone(), stale)
		};
		if !stale.is_empty()
			&& let Err(error) = client.release_documents(stale).await
		{
			debug!(label = %self.label, error = %error, "failed to release stale documents");
		}
	}
}

impl Drop for WorkerLifecycle {
	fn drop(&mut self) {
		if self.is_disposed() {
			return;
		}
		// Dropped without dispose(): cancel the tasks and stop any orphan
		// worker from a spawned cleanup, since drop cannot await.
		self.shutdown.cancel();
		if let Ok(mut slot) = self.slot.try_lock()
			&& let Some(live) = slot.take()
		{
			let transport = Arc::clone(&self.transport);
			let label = self.label.clone();
			tokio::spawn(async move {
				if let Err(error) = transport.stop(live.client.id()).await {
					warn!(label = %label, error = %error, "failed to stop orphan worker");
				}
			});
		}
	}
}

impl std::fmt::Debug for WorkerLifecycle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WorkerLifecycle")
			.field("label", &self.label)
			.field("language_id", &self.language_id)
			.field("disposed", &self.is_disposed())
			.finish_non_exhaustive()
	}
}

fn merge_options(mut base: Value, patch: Value) -> Value {
	match (&mut base, patch) {
		(Value::Object(base_map), Value::Object(patch_map)) => {
			for (key, value) in patch_map {
				base_map.insert(key, value);
			}
			base
		}
		(_, patch) => patch,
	}
}

#[cfg(test)]
mod tests {
	use async_trait::async_trait;
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use petrel_worker::{
		Capability, DocumentStore, LocalTransport, Worker, WorkerFactory, WorkerFault,
	};

	use super::*;
	use crate::memory::MemoryHost;

	struct ProbeWorker {
		options: Value,
	}

	#[async_trait]
	impl Worker for ProbeWorker {
		fn capabilities(&self) -> &[Capability] {
			&[Capability::Hover]
		}

		async fn provide(
			&mut self,
			_documents: &DocumentStore,
			_capability: Capability,
			_uri: &Url,
			_args: &[Value],
		) -> Result<Value, WorkerFault> {
			Ok(Value::Null)
		}

		async fn call(
			&mut self,
			documents: &DocumentStore,
			method: &str,
			args: &[Value],
		) -> Result<Value, WorkerFault> {
			match method {
				"options" => Ok(self.options.clone()),
				"documentCount" => Ok(json!(documents.len())),
				"text" => {
					let uri = args
						.first()
						.and_then(Value::as_str)
						.and_then(|s| Url::parse(s).ok())
						.ok_or_else(|| WorkerFault::new("missing uri argument"))?;
					Ok(documents
						.text(&uri)
						.map(|t| json!(t))
						.unwrap_or(Value::Null))
				}
				_ => Err(WorkerFault::new(format!("unknown operation `{method}`"))),
			}
		}
	}

	struct ProbeFactory;

	impl WorkerFactory for ProbeFactory {
		fn label(&self) -> &str {
			"probe"
		}

		fn capabilities(&self) -> &[Capability] {
			&[Capability::Hover]
		}

		fn create(&self, options: &Value) -> Result<Box<dyn Worker>, WorkerFault> {
			Ok(Box::new(ProbeWorker {
				options: options.clone(),
			}))
		}
	}

	fn fixture(tuning: WorkerTuning) -> (Arc<MemoryHost>, Arc<WorkerLifecycle>) {
		let host = MemoryHost::new();
		let transport = LocalTransport::new();
		transport.register_factory(Arc::new(ProbeFactory));
		let lifecycle = WorkerLifecycle::new(
			"probe",
			"graphql",
			json!({ "generationTag": 0 }),
			tuning,
			transport,
			Arc::clone(&host) as Arc<dyn EditorHost>,
		);
		(host, lifecycle)
	}

	fn uri(s: &str) -> Url {
		Url::parse(s).unwrap()
	}

	#[tokio::test]
	async fn warm_worker_is_reused() {
		let (_host, lifecycle) = fixture(WorkerTuning::default());
		let a = lifecycle.synced_worker(&[]).await.unwrap();
		let b = lifecycle.synced_worker(&[]).await.unwrap();
		assert_eq!(a.id(), b.id());
	}

	#[tokio::test(start_paused = true)]
	async fn idle_worker_is_evicted_and_replaced() {
		let tuning = WorkerTuning {
			sweep_interval: Duration::from_secs(1),
			idle_threshold: Duration::from_secs(3),
			request_timeout: None,
		};
		let (_host, lifecycle) = fixture(tuning);
		let first = lifecycle.synced_worker(&[]).await.unwrap();

		tokio::time::sleep(Duration::from_secs(10)).await;
		assert_eq!(lifecycle.current_worker().await, None);

		let second = lifecycle.synced_worker(&[]).await.unwrap();
		assert_eq!(second.id().slot, first.id().slot);
		assert!(second.id().generation > first.id().generation);
	}

	#[tokio::test(start_paused = true)]
	async fn recent_use_defers_eviction() {
		let tuning = WorkerTuning {
			sweep_interval: Duration::from_secs(1),
			idle_threshold: Duration::from_secs(30),
			request_timeout: None,
		};
		let (_host, lifecycle) = fixture(tuning);
		let first = lifecycle.synced_worker(&[]).await.unwrap();

		tokio::time::sleep(Duration::from_secs(10)).await;
		let second = lifecycle.synced_worker(&[]).await.unwrap();
		assert_eq!(first.id(), second.id());
	}

	#[tokio::test]
	async fn set_options_restarts_the_worker_with_the_new_blob() {
		let (_host, lifecycle) = fixture(WorkerTuning::default());
		let mut epoch = lifecycle.subscribe_epoch();
		let first = lifecycle.synced_worker(&[]).await.unwrap();

		lifecycle.set_options(json!({ "generationTag": 1 })).await;
		assert_eq!(lifecycle.current_worker().await, None);
		epoch.changed().await.unwrap();

		let second = lifecycle.synced_worker(&[]).await.unwrap();
		assert!(second.id().generation > first.id().generation);
		let options = second.call("options", Vec::new()).await.unwrap();
		assert_eq!(options["generationTag"], 1);
	}

	#[tokio::test]
	async fn update_options_merges_top_level_keys() {
		let (_host, lifecycle) = fixture(WorkerTuning::default());
		lifecycle
			.set_options(json!({ "a": 1, "b": { "keep": true } }))
			.await;
		lifecycle.update_options(json!({ "a": 2, "c": 3 })).await;
		let options = lifecycle.options();
		assert_eq!(*options, json!({ "a": 2, "b": { "keep": true }, "c": 3 }));
	}

	#[tokio::test]
	async fn sync_pushes_snapshots_and_edits_resync() {
		let (host, lifecycle) = fixture(WorkerTuning::default());
		let doc = uri("inmemory://model/1");
		host.open(doc.clone(), "graphql", "query { a }");

		let client = lifecycle.synced_worker(std::slice::from_ref(&doc)).await.unwrap();
		let text = client.call("text", vec![json!(doc.as_str())]).await.unwrap();
		assert_eq!(text, json!("query { a }"));

		host.edit(&doc, "query { ab }");
		let client = lifecycle.synced_worker(std::slice::from_ref(&doc)).await.unwrap();
		let text = client.call("text", vec![json!(doc.as_str())]).await.unwrap();
		assert_eq!(text, json!("query { ab }"));
	}

	#[tokio::test]
	async fn closing_a_model_releases_its_mirror() {
		let (host, lifecycle) = fixture(WorkerTuning::default());
		let doc = uri("inmemory://model/1");
		host.open(doc.clone(), "graphql", "query { a }");

		let client = lifecycle.synced_worker(std::slice::from_ref(&doc)).await.unwrap();
		host.close(&doc);

		// The release travels through the event listener task.
		let mut released = false;
		for _ in 0..50 {
			let count = client.call("documentCount", Vec::new()).await.unwrap();
			if count == json!(0) {
				released = true;
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert!(released, "mirror still holds the closed document");
	}

	#[tokio::test]
	async fn dispose_is_terminal() {
		let (_host, lifecycle) = fixture(WorkerTuning::default());
		lifecycle.synced_worker(&[]).await.unwrap();
		lifecycle.dispose().await;
		assert_eq!(lifecycle.current_worker().await, None);
		let err = lifecycle.synced_worker(&[]).await.unwrap_err();
		assert!(matches!(err, Error::Disposed(_)));
	}
}
