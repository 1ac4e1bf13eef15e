//! GraphQL language worker.
//!
//! Implements the full capability set for GraphQL documents: hover and
//! completion against an introspected or SDL-supplied schema, scheduled
//! validation, and canonical re-printing. A project root can be indexed for
//! cross-file fragments, type definitions, and schema extensions; the
//! extensions feed back into the cached schema.
//!
//! The crate is transport-agnostic. [`GraphqlWorkerFactory`] plugs into any
//! `petrel_worker` transport; the worker itself never touches the host.

pub mod completion;
pub mod config;
pub mod deps;
pub mod diagnostics;
pub mod documents;
pub mod format;
pub mod hover;
pub mod index;
pub mod schema;
pub mod text;
pub mod worker;

use petrel_worker::WorkerFault;

pub use config::{GraphqlWorkerOptions, SchemaSource};
pub use deps::Dependency;
pub use index::ProjectIndex;
pub use schema::{HttpSchemaLoader, Schema, SchemaCache, SchemaLoader};
pub use worker::{GraphqlWorker, GraphqlWorkerFactory};

/// Failures specific to the GraphQL worker.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The schema endpoint could not be reached or answered non-success.
	#[error("schema fetch failed: {0}")]
	SchemaFetch(String),
	/// The endpoint answered, but not with a usable introspection result.
	#[error("introspection failed: {0}")]
	Introspection(String),
	/// The options blob, a file pattern, or inline schema text is unusable.
	#[error("invalid worker options: {0}")]
	InvalidOptions(String),
	/// Project scan I/O failure.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for WorkerFault {
	fn from(error: Error) -> Self {
		WorkerFault::new(error.to_string())
	}
}
