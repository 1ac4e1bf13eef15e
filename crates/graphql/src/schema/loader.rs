//! Schema acquisition from a configured source.
//!
//! [`SchemaLoader`] is the seam tests and embedders swap out; the shipped
//! implementation posts the introspection query over HTTP. SDL sources never
//! touch the network.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::SchemaSource;
use crate::schema::{Schema, extensions, introspection, sdl};
use crate::{Error, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_LIMIT: usize = 400;

/// Produces the base schema for a source.
#[async_trait]
pub trait SchemaLoader: Send + Sync {
	async fn load(&self, source: &SchemaSource) -> Result<Schema>;
}

/// The reqwest-backed loader used in production.
pub struct HttpSchemaLoader {
	http: reqwest::Client,
}

impl HttpSchemaLoader {
	pub fn new() -> Result<Self> {
		let http = reqwest::Client::builder()
			.timeout(HTTP_TIMEOUT)
			.build()
			.map_err(|e| Error::SchemaFetch(format!("failed to build http client: {e}")))?;
		Ok(Self { http })
	}
}

#[async_trait]
impl SchemaLoader for HttpSchemaLoader {
	async fn load(&self, source: &SchemaSource) -> Result<Schema> {
		match source {
			SchemaSource::Sdl { text } => {
				let mut schema = sdl::schema_from_sdl(text)?;
				// `extend` blocks inside the source apply to itself.
				extensions::merge_extensions(&mut schema, &extensions::collect_extensions(text));
				Ok(schema)
			}
			SchemaSource::Url { url, headers } => {
				debug!(url = %url, "introspecting schema endpoint");
				let payload = json!({
					"query": introspection::INTROSPECTION_QUERY,
					"operationName": "IntrospectionQuery",
				});
				let mut request = self.http.post(url).json(&payload);
				for (name, value) in headers {
					request = request.header(name, value);
				}
				let response = request.send().await.map_err(|e| {
					if e.is_timeout() {
						Error::SchemaFetch(format!("request to {url} timed out"))
					} else {
						Error::SchemaFetch(format!("request to {url} failed: {e}"))
					}
				})?;
				let status = response.status();
				let body = response.text().await.map_err(|e| {
					Error::SchemaFetch(format!("failed to read response from {url}: {e}"))
				})?;
				if !status.is_success() {
					return Err(Error::SchemaFetch(format!(
						"{url} answered HTTP {status}: {}",
						truncate_for_error(&body)
					)));
				}
				introspection::decode_introspection(&body)
			}
		}
	}
}

fn truncate_for_error(body: &str) -> &str {
	let end = body
		.char_indices()
		.take_while(|(i, _)| *i < ERROR_BODY_LIMIT)
		.last()
		.map(|(i, c)| i + c.len_utf8())
		.unwrap_or(0);
	&body[..end]
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[tokio::test]
	async fn sdl_sources_build_without_network() {
		let loader = HttpSchemaLoader::new().unwrap();
		let source = SchemaSource::Sdl {
			text: "type Query { ok: Boolean }\nextend type Query { also: Int }".to_owned(),
		};
		let schema = loader.load(&source).await.unwrap();
		let root = schema.query_root().unwrap();
		assert!(root.field("ok").is_some());
		assert_eq!(root.field("also").unwrap().ty.to_string(), "Int");
	}

	#[tokio::test]
	async fn unreachable_endpoints_fail_with_fetch_errors() {
		let loader = HttpSchemaLoader::new().unwrap();
		let source = SchemaSource::Url {
			// .invalid never resolves (RFC 2606).
			url: "http://introspection.invalid/graphql".to_owned(),
			headers: Default::default(),
		};
		let error = loader.load(&source).await.unwrap_err();
		assert!(matches!(error, Error::SchemaFetch(_)));
	}

	#[test]
	fn error_bodies_are_truncated_on_char_boundaries() {
		let body = "é".repeat(ERROR_BODY_LIMIT);
		let truncated = truncate_for_error(&body);
		assert!(truncated.len() <= ERROR_BODY_LIMIT + 1);
		assert!(body.starts_with(truncated));
		assert_eq!(truncate_for_error("short"), "short");
	}
}
