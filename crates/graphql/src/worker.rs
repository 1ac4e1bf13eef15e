//! The GraphQL worker module.
//!
//! [`GraphqlWorkerFactory`] registers under the label `graphql` and serves
//! every capability. Each worker instance owns its schema cache, its project
//! file index, and the external fragments parsed from its options, so a
//! restart (options change, idle stop) drops all derived state at once.
//!
//! The index is scanned once, on the first request after start. A scan
//! failure is logged and leaves features running without file context until
//! the next start. Synced documents that live under the project root are
//! re-bucketed into the index whenever their version moves.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use petrel_worker::{Capability, DocumentStore, Position, Worker, WorkerFactory, WorkerFault};

use crate::completion;
use crate::config::GraphqlWorkerOptions;
use crate::deps::{self, Dependency, parse_external_fragments};
use crate::diagnostics;
use crate::documents::parse_document;
use crate::format;
use crate::hover;
use crate::index::{FragmentInfo, ProjectIndex};
use crate::schema::{HttpSchemaLoader, Schema, SchemaCache, SchemaLoader, collect_extensions};

/// Factory for GraphQL workers. The loader is shared across instances; the
/// cache built on top of it is per-worker.
pub struct GraphqlWorkerFactory {
	loader: Arc<dyn SchemaLoader>,
}

impl GraphqlWorkerFactory {
	pub fn new(loader: Arc<dyn SchemaLoader>) -> Self {
		Self { loader }
	}

	/// Factory backed by the HTTP introspection loader.
	pub fn http() -> crate::Result<Self> {
		Ok(Self::new(Arc::new(HttpSchemaLoader::new()?)))
	}
}

impl WorkerFactory for GraphqlWorkerFactory {
	fn label(&self) -> &str {
		"graphql"
	}

	fn capabilities(&self) -> &[Capability] {
		&Capability::ALL
	}

	fn create(&self, options: &Value) -> Result<Box<dyn Worker>, WorkerFault> {
		let options = GraphqlWorkerOptions::from_value(options)
			.map_err(|error| WorkerFault::new(format!("invalid graphql worker options: {error}")))?;
		let external = parse_external_fragments(&options.external_fragments);
		Ok(Box::new(GraphqlWorker {
			options,
			cache: SchemaCache::new(Arc::clone(&self.loader)),
			index: None,
			index_scanned: false,
			external,
			seen_versions: FxHashMap::default(),
		}))
	}
}

/// One worker instance: options, schema cache, and project index.
pub struct GraphqlWorker {
	options: GraphqlWorkerOptions,
	cache: SchemaCache,
	index: Option<ProjectIndex>,
	index_scanned: bool,
	external: Vec<FragmentInfo>,
	seen_versions: FxHashMap<Url, i32>,
}

impl GraphqlWorker {
	/// The schema for this worker's source, rebuilt when the extension set
	/// (project files plus synced documents) has changed.
	async fn schema(&mut self, documents: &DocumentStore) -> Result<Arc<Schema>, WorkerFault> {
		let Some(source) = &self.options.schema else {
			return Err(WorkerFault::new("no schema source configured"));
		};
		let mut extensions = match &self.index {
			Some(index) => index.extensions(),
			None => Vec::new(),
		};
		for snapshot in documents.iter() {
			extensions.extend(collect_extensions(&snapshot.text));
		}
		self.cache
			.schema(source, &self.options.custom_directives, &extensions)
			.await
			.map_err(WorkerFault::from)
	}

	async fn refresh_index(&mut self, documents: &DocumentStore) {
		if !self.index_scanned {
			self.index_scanned = true;
			if let Some(root) = self.options.project_root.clone() {
				match ProjectIndex::scan(&root, &self.options.patterns()).await {
					Ok(index) => {
						info!(
							root = %root.display(),
							fragments = index.fragment_count(),
							types = index.type_count(),
							"project scan complete"
						);
						self.index = Some(index);
					}
					// No retry until the next worker start.
					Err(error) => warn!(
						root = %root.display(),
						error = %error,
						"project scan failed, features run without the file index"
					),
				}
			}
		}

		let Some(index) = self.index.as_mut() else {
			return;
		};
		for snapshot in documents.iter() {
			let Ok(path) = snapshot.uri.to_file_path() else {
				continue;
			};
			if !path.starts_with(index.root()) {
				continue;
			}
			if self.seen_versions.get(&snapshot.uri) == Some(&snapshot.version) {
				continue;
			}
			index.apply_file(path, &snapshot.text);
			self.seen_versions.insert(snapshot.uri.clone(), snapshot.version);
		}
	}
}

#[async_trait]
impl Worker for GraphqlWorker {
	fn capabilities(&self) -> &[Capability] {
		&Capability::ALL
	}

	async fn provide(
		&mut self,
		documents: &DocumentStore,
		capability: Capability,
		uri: &Url,
		args: &[Value],
	) -> Result<Value, WorkerFault> {
		let Some(snapshot) = documents.get(uri) else {
			return Err(WorkerFault::new(format!("document `{uri}` is not synced")));
		};
		let text = snapshot.text.as_str();
		self.refresh_index(documents).await;

		match capability {
			Capability::Hover => {
				let position = position_arg(args)?;
				let schema = self.schema(documents).await?;
				encode(hover::hover(&schema, text, position))
			}
			Capability::Completion => {
				let position = position_arg(args)?;
				let schema = self.schema(documents).await?;
				encode(completion::completions(
					&schema,
					text,
					position,
					self.index.as_ref(),
					&self.external,
				))
			}
			Capability::Diagnostics => {
				let schema = match self.schema(documents).await {
					Ok(schema) => Some(schema),
					Err(fault) => {
						debug!(error = %fault, "validating without a schema");
						None
					}
				};
				encode(diagnostics::diagnostics(
					text,
					schema.as_deref(),
					self.index.as_ref(),
					&self.external,
				))
			}
			Capability::Formatting => encode(format::format(text)),
		}
	}

	async fn call(
		&mut self,
		documents: &DocumentStore,
		method: &str,
		args: &[Value],
	) -> Result<Value, WorkerFault> {
		match method {
			"getSchema" => {
				self.refresh_index(documents).await;
				let schema = self.schema(documents).await?;
				Ok(json!({
					"queryType": schema.query_type,
					"mutationType": schema.mutation_type,
					"subscriptionType": schema.subscription_type,
					"typeCount": schema.types.len(),
					"directiveCount": schema.directives.len(),
				}))
			}
			"getAst" => {
				let uri = uri_arg(args)?;
				let Some(text) = documents.text(&uri) else {
					return Err(WorkerFault::new(format!("document `{uri}` is not synced")));
				};
				let parsed = parse_document(text);
				let definitions: Vec<Value> = parsed
					.definitions
					.iter()
					.map(|d| json!({ "kind": d.kind.as_str(), "name": d.name }))
					.collect();
				Ok(json!({
					"definitions": definitions,
					"errorCount": parsed.errors.len(),
				}))
			}
			"dependencies" => {
				self.refresh_index(documents).await;
				let uri = uri_arg(args)?;
				let Some(text) = documents.text(&uri) else {
					return Err(WorkerFault::new(format!("document `{uri}` is not synced")));
				};
				let out: Vec<Value> = deps::dependencies(text, self.index.as_ref(), &self.external)
					.iter()
					.map(|dep| match dep {
						Dependency::Fragment(f) => json!({
							"kind": "fragment",
							"name": f.name,
							"file": f.file,
							"text": f.text,
						}),
						Dependency::Type(t) => json!({
							"kind": "type",
							"name": t.name,
							"file": t.file,
							"text": t.text,
						}),
					})
					.collect();
				Ok(json!(out))
			}
			_ => Err(WorkerFault::new(format!("unknown operation `{method}`"))),
		}
	}
}

fn position_arg(args: &[Value]) -> Result<Position, WorkerFault> {
	let value = args
		.first()
		.ok_or_else(|| WorkerFault::new("missing position argument"))?;
	serde_json::from_value(value.clone())
		.map_err(|error| WorkerFault::new(format!("invalid position argument: {error}")))
}

fn uri_arg(args: &[Value]) -> Result<Url, WorkerFault> {
	let value = args
		.first()
		.and_then(Value::as_str)
		.ok_or_else(|| WorkerFault::new("missing uri argument"))?;
	Url::parse(value).map_err(|error| WorkerFault::new(format!("invalid uri argument: {error}")))
}

fn encode<T: Serialize>(value: T) -> Result<Value, WorkerFault> {
	serde_json::to_value(value)
		.map_err(|error| WorkerFault::new(format!("encoding failed: {error}")))
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use tempfile::tempdir;

	use petrel_worker::{
		CompletionItem, DocumentSnapshot, Error as TransportError, Hover, LocalTransport, Marker,
		MarkerSeverity, TextEdit, WorkerId, WorkerRequest, WorkerSpec, WorkerTransport,
	};

	use super::*;
	use crate::Error;
	use crate::config::SchemaSource;
	use crate::schema::schema_from_sdl;

	const DEMO_SDL: &str = "type Query { user(id: ID!): User viewer: User }\n\
		type User { id: ID! name: String email: String @deprecated(reason: \"use contact\") friends: [User] }";

	struct StaticLoader;

	#[async_trait]
	impl SchemaLoader for StaticLoader {
		async fn load(&self, _source: &SchemaSource) -> crate::Result<Schema> {
			schema_from_sdl(DEMO_SDL)
		}
	}

	/// Answers with the demo schema unless the source points at the broken
	/// endpoint.
	struct RoutingLoader;

	#[async_trait]
	impl SchemaLoader for RoutingLoader {
		async fn load(&self, source: &SchemaSource) -> crate::Result<Schema> {
			match source {
				SchemaSource::Url { url, .. } if url.contains("bad.invalid") => {
					Err(Error::SchemaFetch(format!("endpoint `{url}` unreachable")))
				}
				_ => schema_from_sdl(DEMO_SDL),
			}
		}
	}

	fn transport() -> Arc<LocalTransport> {
		let transport = LocalTransport::new();
		transport.register_factory(Arc::new(GraphqlWorkerFactory::new(Arc::new(StaticLoader))));
		transport
	}

	fn sdl_options() -> Value {
		json!({ "schema": { "kind": "sdl", "text": "unused" } })
	}

	fn doc_uri() -> Url {
		Url::parse("inmemory://model/query.graphql").unwrap()
	}

	async fn start(transport: &LocalTransport, options: Value, text: &str) -> WorkerId {
		let id = transport
			.start(WorkerSpec::new("graphql", options))
			.await
			.unwrap();
		sync(transport, id, doc_uri(), text).await;
		id
	}

	async fn sync(transport: &LocalTransport, id: WorkerId, uri: Url, text: &str) {
		transport
			.request(
				id,
				WorkerRequest::SyncDocuments {
					documents: vec![DocumentSnapshot::new(uri, "graphql", 1, text)],
				},
				None,
			)
			.await
			.unwrap();
	}

	async fn provide(
		transport: &LocalTransport,
		id: WorkerId,
		capability: Capability,
		uri: Url,
		args: Vec<Value>,
	) -> Value {
		transport
			.request(id, WorkerRequest::Provide { capability, uri, args }, None)
			.await
			.unwrap()
	}

	async fn call(transport: &LocalTransport, id: WorkerId, method: &str, args: Vec<Value>) -> Value {
		transport
			.request(
				id,
				WorkerRequest::Call {
					method: method.to_owned(),
					args,
				},
				None,
			)
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn hover_answers_for_schema_fields() {
		let transport = transport();
		let id = start(&transport, sdl_options(), "query { viewer { name } }").await;
		let answer = provide(
			&transport,
			id,
			Capability::Hover,
			doc_uri(),
			vec![json!(Position::new(0, 9))],
		)
		.await;
		let hover: Hover = serde_json::from_value(answer).unwrap();
		assert!(hover.contents.contains("viewer: User"));
	}

	#[tokio::test]
	async fn completion_lists_sibling_fields() {
		let transport = transport();
		let id = start(&transport, sdl_options(), "query { viewer { n } }").await;
		let answer = provide(
			&transport,
			id,
			Capability::Completion,
			doc_uri(),
			vec![json!(Position::new(0, 17))],
		)
		.await;
		let items: Vec<CompletionItem> = serde_json::from_value(answer).unwrap();
		assert!(items.iter().any(|i| i.label == "name"));
		assert!(items.iter().any(|i| i.label == "friends"));
		assert!(items.iter().any(|i| i.label == "__typename"));
	}

	#[tokio::test]
	async fn diagnostics_flag_unknown_and_deprecated_fields() {
		let transport = transport();
		let id = start(&transport, sdl_options(), "query { viewer { bogus email } }").await;
		let answer = provide(&transport, id, Capability::Diagnostics, doc_uri(), Vec::new()).await;
		let markers: Vec<Marker> = serde_json::from_value(answer).unwrap();
		assert_eq!(markers.len(), 2);
		assert_eq!(markers[0].severity, MarkerSeverity::Error);
		assert!(markers[0].message.contains("Cannot query field `bogus`"));
		assert_eq!(markers[1].severity, MarkerSeverity::Warning);
		assert!(markers[1].message.contains("deprecated"));
	}

	#[tokio::test]
	async fn formatting_normalizes_compact_documents() {
		let transport = transport();
		let id = start(&transport, sdl_options(), "query{viewer{id}}").await;
		let answer = provide(&transport, id, Capability::Formatting, doc_uri(), Vec::new()).await;
		let edits: Vec<TextEdit> = serde_json::from_value(answer).unwrap();
		assert_eq!(edits.len(), 1);
		assert_eq!(edits[0].new_text, "query {\n  viewer {\n    id\n  }\n}\n");
	}

	#[tokio::test]
	async fn unsynced_documents_fault() {
		let transport = transport();
		let id = start(&transport, sdl_options(), "query { viewer { id } }").await;
		let err = transport
			.request(
				id,
				WorkerRequest::Provide {
					capability: Capability::Hover,
					uri: Url::parse("inmemory://model/other.graphql").unwrap(),
					args: vec![json!(Position::new(0, 0))],
				},
				None,
			)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			TransportError::Fault(fault) if fault.message.contains("not synced")
		));
	}

	#[tokio::test]
	async fn invalid_options_fail_the_start() {
		let transport = transport();
		let err = transport
			.start(WorkerSpec::new("graphql", json!({ "schema": 42 })))
			.await
			.unwrap_err();
		assert!(matches!(err, TransportError::Spawn { .. }));
	}

	#[tokio::test]
	async fn missing_schema_still_reports_syntax() {
		let transport = transport();
		let id = start(&transport, Value::Null, "query { viewer { id } }").await;
		let broken = Url::parse("inmemory://model/broken.graphql").unwrap();
		sync(&transport, id, broken.clone(), "query {").await;

		let answer = provide(&transport, id, Capability::Diagnostics, doc_uri(), Vec::new()).await;
		let markers: Vec<Marker> = serde_json::from_value(answer).unwrap();
		assert_eq!(markers, Vec::new());

		let answer = provide(&transport, id, Capability::Diagnostics, broken, Vec::new()).await;
		let markers: Vec<Marker> = serde_json::from_value(answer).unwrap();
		assert!(!markers.is_empty());
		assert!(markers.iter().all(|m| m.severity == MarkerSeverity::Error));
	}

	#[tokio::test]
	async fn call_surface_reports_schema_ast_and_dependencies() {
		let transport = transport();
		let options = json!({
			"schema": { "kind": "sdl", "text": "unused" },
			"externalFragments": ["fragment Extra on User { id }"],
		});
		let id = start(
			&transport,
			options,
			"query Load { viewer { ...Extra } }\n\nfragment Local on User { name }",
		)
		.await;

		let summary = call(&transport, id, "getSchema", Vec::new()).await;
		assert_eq!(summary["queryType"], json!("Query"));
		assert_eq!(summary["typeCount"], json!(7));

		let ast = call(&transport, id, "getAst", vec![json!(doc_uri().as_str())]).await;
		assert_eq!(ast["errorCount"], json!(0));
		assert_eq!(ast["definitions"][0]["kind"], json!("query"));
		assert_eq!(ast["definitions"][0]["name"], json!("Load"));
		assert_eq!(ast["definitions"][1]["kind"], json!("fragment"));

		let deps = call(&transport, id, "dependencies", vec![json!(doc_uri().as_str())]).await;
		assert_eq!(deps[0]["kind"], json!("fragment"));
		assert_eq!(deps[0]["name"], json!("Extra"));

		let err = transport
			.request(
				id,
				WorkerRequest::Call {
					method: "mystery".to_owned(),
					args: Vec::new(),
				},
				None,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, TransportError::Fault(_)));
	}

	#[tokio::test]
	async fn project_files_feed_spread_resolution() {
		let dir = tempdir().unwrap();
		std::fs::write(
			dir.path().join("parts.graphql"),
			"fragment Parts on User { id name }",
		)
		.unwrap();

		let transport = transport();
		let options = json!({
			"schema": { "kind": "sdl", "text": "unused" },
			"projectRoot": dir.path(),
		});
		let id = start(&transport, options, "query { viewer { ...Parts } }").await;

		let answer = provide(&transport, id, Capability::Diagnostics, doc_uri(), Vec::new()).await;
		let markers: Vec<Marker> = serde_json::from_value(answer).unwrap();
		assert_eq!(markers, Vec::new());

		let deps = call(&transport, id, "dependencies", vec![json!(doc_uri().as_str())]).await;
		assert_eq!(deps[0]["name"], json!("Parts"));
	}

	#[tokio::test]
	async fn schema_recovery_after_endpoint_fix() {
		use petrel_runtime::memory::MemoryHost;
		use petrel_runtime::{LanguageDefinition, Runtime, WorkerDescriptor};
		use petrel_worker::{CapabilityConfig, CapabilitySet, CompletionConfig};

		let host = MemoryHost::new();
		let transport = LocalTransport::new();
		transport.register_factory(Arc::new(GraphqlWorkerFactory::new(Arc::new(RoutingLoader))));
		let runtime = Runtime::new(host.clone(), transport.clone());

		runtime
			.register(
				LanguageDefinition::new("graphql")
					.extensions([".graphql", ".gql"])
					.worker(
						WorkerDescriptor::new("graphql")
							.options(json!({
								"schema": { "kind": "url", "url": "https://bad.invalid/graphql" }
							}))
							.capabilities(CapabilityConfig::Explicit(CapabilitySet {
								hover: true,
								completion: Some(CompletionConfig::default()),
								..CapabilitySet::default()
							})),
					),
			)
			.await
			.unwrap();

		let doc = Url::parse("inmemory://model/q.graphql").unwrap();
		host.open(doc.clone(), "graphql", "query { user { id } }");

		// While the endpoint is down the worker faults and the hover hook
		// answers with nothing.
		assert!(host.hover(&doc, Position::new(0, 9)).await.is_none());

		runtime
			.set_options("graphql", json!({ "schema": { "kind": "sdl", "text": "unused" } }))
			.await
			.unwrap();

		// The replacement worker sees the working source; completion inside
		// the `user` selection lists the sibling fields of `id`.
		let items = host.complete(&doc, Position::new(0, 16)).await;
		assert!(items.iter().any(|i| i.label == "name"));
		assert!(items.iter().any(|i| i.label == "email"));
	}
}
