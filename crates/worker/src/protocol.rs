//! Request/response envelopes crossing the worker boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::capability::Capability;
use crate::types::DocumentSnapshot;

/// A message the host sends into a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkerRequest {
	/// Serve one capability for one document.
	Provide {
		capability: Capability,
		uri: Url,
		#[serde(default)]
		args: Vec<Value>,
	},
	/// Invoke a named operation outside the provider set.
	Call {
		method: String,
		#[serde(default)]
		args: Vec<Value>,
	},
	/// Mirror document snapshots into the worker (insert or replace).
	SyncDocuments { documents: Vec<DocumentSnapshot> },
	/// Drop mirrored documents the host no longer has open.
	ReleaseDocuments { uris: Vec<Url> },
}

impl WorkerRequest {
	/// Short name for logging.
	pub fn kind(&self) -> &'static str {
		match self {
			WorkerRequest::Provide { .. } => "provide",
			WorkerRequest::Call { .. } => "call",
			WorkerRequest::SyncDocuments { .. } => "syncDocuments",
			WorkerRequest::ReleaseDocuments { .. } => "releaseDocuments",
		}
	}
}

/// A [`WorkerRequest`] with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
	pub id: u64,
	pub request: WorkerRequest,
}

/// The worker's answer to one envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
	pub id: u64,
	pub result: Result<Value, WorkerFault>,
}

/// An error produced inside a worker and reported to the caller.
///
/// Faults are data, not panics: a worker that fails a request stays alive
/// and keeps serving subsequent requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct WorkerFault {
	pub message: String,
}

impl WorkerFault {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn provide_request_round_trips_as_tagged_json() {
		let request = WorkerRequest::Provide {
			capability: Capability::Hover,
			uri: Url::parse("inmemory://model/1").unwrap(),
			args: vec![serde_json::json!({ "line": 0, "character": 3 })],
		};
		let encoded = serde_json::to_value(&request).unwrap();
		assert_eq!(encoded["kind"], "provide");
		assert_eq!(encoded["capability"], "hover");
		let decoded: WorkerRequest = serde_json::from_value(encoded).unwrap();
		assert_eq!(decoded, request);
	}

	#[test]
	fn fault_carries_its_message() {
		let fault = WorkerFault::new("schema fetch failed");
		assert_eq!(fault.to_string(), "schema fetch failed");
	}
}
