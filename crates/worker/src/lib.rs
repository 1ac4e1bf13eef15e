//! Worker substrate for the petrel runtime.
//!
//! Language analysis runs off the host's hot path in *workers*: isolated
//! tasks (or, behind other [`WorkerTransport`] implementations, processes)
//! that hold a mirror of the open documents and answer capability requests
//! such as hover, completion, diagnostics and formatting. The host and a
//! worker share no mutable state; everything crossing the boundary is an
//! owned, serializable message, and responses are correlated to requests by
//! the transport.
//!
//! This crate defines the boundary itself: the wire types, the [`Worker`]
//! trait implemented by language backends, the [`WorkerTransport`] contract,
//! and the in-process [`LocalTransport`] used by default.

pub mod capability;
pub mod client;
pub mod local;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod types;
pub mod worker;

use std::time::Duration;

pub use capability::{
	Capability, CapabilityConfig, CapabilitySet, CompletionConfig, DiagnosticsConfig,
	ResolvedCapabilities, ResolvedCompletion, ResolvedDiagnostics,
};
pub use client::WorkerClient;
pub use local::LocalTransport;
pub use protocol::{RequestEnvelope, ResponseEnvelope, WorkerFault, WorkerRequest};
pub use store::DocumentStore;
pub use transport::{WorkerId, WorkerSpec, WorkerTransport};
pub use types::{
	CompletionItem, CompletionItemKind, DocumentSnapshot, Hover, Marker, MarkerSeverity, Position,
	Range, TextEdit,
};
pub use worker::{Worker, WorkerFactory};

/// Errors raised by the worker substrate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The worker is gone: stopped, evicted, or its task ended.
	#[error("worker stopped")]
	Stopped,

	/// No factory/module is registered for the requested label.
	#[error("no worker module registered for label `{0}`")]
	UnknownLabel(String),

	/// Worker construction failed.
	#[error("failed to spawn worker `{label}`: {reason}")]
	Spawn { label: String, reason: String },

	/// The request did not complete within its deadline.
	#[error("worker request timed out after {0:?}")]
	RequestTimeout(Duration),

	/// The worker answered with a fault of its own.
	#[error(transparent)]
	Fault(#[from] WorkerFault),

	/// A payload could not be decoded into the requested type.
	#[error("malformed worker payload: {0}")]
	Codec(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
