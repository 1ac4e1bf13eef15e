//! Introspection response decoding.
//!
//! [`INTROSPECTION_QUERY`] is the request the HTTP loader posts; the decoder
//! turns the standard response shape into a [`Schema`]. Deprecated members
//! are always requested so hover and completion can flag them.

use serde::Deserialize;
use tracing::debug;

use crate::schema::{
	DirectiveDef, EnumValueDef, FieldDef, InputValueDef, Schema, TypeDef, TypeKind, TypeRef,
};
use crate::{Error, Result};

/// The full introspection query, deprecation included. Type references are
/// unwrapped to seven levels, enough for any practical wrapper nesting.
pub const INTROSPECTION_QUERY: &str = r#"query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types { ...FullType }
    directives {
      name
      description
      args { ...InputValue }
    }
  }
}

fragment FullType on __Type {
  kind
  name
  description
  fields(includeDeprecated: true) {
    name
    description
    args { ...InputValue }
    type { ...TypeRef }
    isDeprecated
    deprecationReason
  }
  inputFields { ...InputValue }
  interfaces { ...TypeRef }
  enumValues(includeDeprecated: true) {
    name
    description
    isDeprecated
    deprecationReason
  }
  possibleTypes { ...TypeRef }
}

fragment InputValue on __InputValue {
  name
  description
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType { kind name }
            }
          }
        }
      }
    }
  }
}
"#;

/// Decode a raw introspection response body into a schema.
pub fn decode_introspection(body: &str) -> Result<Schema> {
	let response: IntrospectionResponse = serde_json::from_str(body)
		.map_err(|e| Error::Introspection(format!("response is not valid JSON: {e}")))?;
	if !response.errors.is_empty() {
		let messages = response
			.errors
			.iter()
			.map(|e| e.message.as_str())
			.collect::<Vec<_>>()
			.join("; ");
		return Err(Error::Introspection(format!(
			"endpoint answered with errors: {messages}"
		)));
	}
	let data = response
		.data
		.ok_or_else(|| Error::Introspection("response carried no data".to_owned()))?;
	schema_from_introspection(data.schema)
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
	#[serde(default)]
	data: Option<IntrospectionData>,
	#[serde(default)]
	errors: Vec<ResponseError>,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
	message: String,
}

#[derive(Debug, Deserialize)]
struct IntrospectionData {
	#[serde(rename = "__schema")]
	schema: IntrospectionSchema,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionSchema {
	query_type: Option<NamedRef>,
	mutation_type: Option<NamedRef>,
	subscription_type: Option<NamedRef>,
	#[serde(default)]
	types: Vec<IntrospectionType>,
	#[serde(default)]
	directives: Vec<IntrospectionDirective>,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
	name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionType {
	kind: String,
	name: Option<String>,
	description: Option<String>,
	fields: Option<Vec<IntrospectionField>>,
	input_fields: Option<Vec<IntrospectionInputValue>>,
	interfaces: Option<Vec<IntrospectionTypeRef>>,
	enum_values: Option<Vec<IntrospectionEnumValue>>,
	possible_types: Option<Vec<IntrospectionTypeRef>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionField {
	name: String,
	description: Option<String>,
	#[serde(default)]
	args: Vec<IntrospectionInputValue>,
	#[serde(rename = "type")]
	ty: IntrospectionTypeRef,
	#[serde(default)]
	is_deprecated: bool,
	deprecation_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionInputValue {
	name: String,
	description: Option<String>,
	#[serde(rename = "type")]
	ty: IntrospectionTypeRef,
	default_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionEnumValue {
	name: String,
	description: Option<String>,
	#[serde(default)]
	is_deprecated: bool,
	deprecation_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionTypeRef {
	kind: String,
	name: Option<String>,
	of_type: Option<Box<IntrospectionTypeRef>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionDirective {
	name: String,
	description: Option<String>,
	#[serde(default)]
	args: Vec<IntrospectionInputValue>,
}

fn schema_from_introspection(raw: IntrospectionSchema) -> Result<Schema> {
	let mut schema = Schema {
		query_type: raw.query_type.and_then(|t| t.name),
		mutation_type: raw.mutation_type.and_then(|t| t.name),
		subscription_type: raw.subscription_type.and_then(|t| t.name),
		..Schema::default()
	};

	for ty in raw.types {
		let Some(name) = ty.name else { continue };
		let kind = match ty.kind.as_str() {
			"OBJECT" => TypeKind::Object,
			"INTERFACE" => TypeKind::Interface,
			"UNION" => TypeKind::Union,
			"ENUM" => TypeKind::Enum,
			"SCALAR" => TypeKind::Scalar,
			"INPUT_OBJECT" => TypeKind::InputObject,
			other => {
				debug!(name = %name, kind = other, "skipping type of unknown kind");
				continue;
			}
		};
		let def = TypeDef {
			name: name.clone(),
			kind,
			description: ty.description,
			fields: ty
				.fields
				.unwrap_or_default()
				.into_iter()
				.map(convert_field)
				.collect::<Result<_>>()?,
			input_fields: ty
				.input_fields
				.unwrap_or_default()
				.into_iter()
				.map(convert_input_value)
				.collect::<Result<_>>()?,
			enum_values: ty
				.enum_values
				.unwrap_or_default()
				.into_iter()
				.map(|v| EnumValueDef {
					name: v.name,
					description: v.description,
					deprecated: v.is_deprecated,
					deprecation_reason: v.deprecation_reason,
				})
				.collect(),
			interfaces: named_refs(ty.interfaces),
			members: named_refs(ty.possible_types),
		};
		schema.types.insert(name, def);
	}

	for directive in raw.directives {
		let args = directive
			.args
			.into_iter()
			.map(convert_input_value)
			.collect::<Result<_>>()?;
		schema.upsert_directive(DirectiveDef {
			name: directive.name,
			description: directive.description,
			args,
		});
	}

	Ok(schema)
}

fn convert_field(field: IntrospectionField) -> Result<FieldDef> {
	Ok(FieldDef {
		name: field.name,
		description: field.description,
		ty: convert_type_ref(&field.ty)?,
		args: field
			.args
			.into_iter()
			.map(convert_input_value)
			.collect::<Result<_>>()?,
		deprecated: field.is_deprecated,
		deprecation_reason: field.deprecation_reason,
	})
}

fn convert_input_value(value: IntrospectionInputValue) -> Result<InputValueDef> {
	Ok(InputValueDef {
		name: value.name,
		description: value.description,
		ty: convert_type_ref(&value.ty)?,
		default_value: value.default_value,
	})
}

fn convert_type_ref(raw: &IntrospectionTypeRef) -> Result<TypeRef> {
	match raw.kind.as_str() {
		"NON_NULL" => {
			let inner = raw.of_type.as_deref().ok_or_else(|| {
				Error::Introspection("NON_NULL type reference without ofType".to_owned())
			})?;
			Ok(TypeRef::NonNull(Box::new(convert_type_ref(inner)?)))
		}
		"LIST" => {
			let inner = raw.of_type.as_deref().ok_or_else(|| {
				Error::Introspection("LIST type reference without ofType".to_owned())
			})?;
			Ok(TypeRef::List(Box::new(convert_type_ref(inner)?)))
		}
		_ => {
			let name = raw.name.clone().ok_or_else(|| {
				Error::Introspection("named type reference without a name".to_owned())
			})?;
			Ok(TypeRef::Named(name))
		}
	}
}

fn named_refs(refs: Option<Vec<IntrospectionTypeRef>>) -> Vec<String> {
	refs.unwrap_or_default()
		.into_iter()
		.filter_map(|r| r.name)
		.collect()
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	fn sample_response() -> String {
		json!({
			"data": {
				"__schema": {
					"queryType": { "name": "Query" },
					"mutationType": null,
					"subscriptionType": null,
					"types": [
						{
							"kind": "OBJECT",
							"name": "Query",
							"description": "Entry points.",
							"fields": [
								{
									"name": "user",
									"description": null,
									"args": [
										{
											"name": "id",
											"description": null,
											"type": {
												"kind": "NON_NULL",
												"name": null,
												"ofType": { "kind": "SCALAR", "name": "ID" }
											},
											"defaultValue": null
										}
									],
									"type": { "kind": "OBJECT", "name": "User" },
									"isDeprecated": false,
									"deprecationReason": null
								}
							]
						},
						{
							"kind": "OBJECT",
							"name": "User",
							"fields": [
								{
									"name": "emails",
									"type": {
										"kind": "NON_NULL",
										"name": null,
										"ofType": {
											"kind": "LIST",
											"name": null,
											"ofType": { "kind": "SCALAR", "name": "String" }
										}
									},
									"isDeprecated": true,
									"deprecationReason": "use contact"
								}
							]
						},
						{ "kind": "SCALAR", "name": "ID" },
						{ "kind": "SCALAR", "name": "String" }
					],
					"directives": [
						{ "name": "include", "args": [] }
					]
				}
			}
		})
		.to_string()
	}

	#[test]
	fn decodes_the_standard_shape() {
		let schema = decode_introspection(&sample_response()).unwrap();
		assert_eq!(schema.query_type.as_deref(), Some("Query"));

		let user_field = schema.query_root().unwrap().field("user").unwrap();
		assert_eq!(user_field.ty.to_string(), "User");
		assert_eq!(user_field.args[0].ty.to_string(), "ID!");

		let emails = schema.type_def("User").unwrap().field("emails").unwrap();
		assert_eq!(emails.ty.to_string(), "[String]!");
		assert!(emails.deprecated);
		assert_eq!(emails.deprecation_reason.as_deref(), Some("use contact"));

		assert!(schema.directives.iter().any(|d| d.name == "include"));
	}

	#[test]
	fn response_errors_fail_the_decode() {
		let body = json!({
			"data": null,
			"errors": [{ "message": "introspection is disabled" }]
		})
		.to_string();
		let error = decode_introspection(&body).unwrap_err();
		assert!(matches!(error, Error::Introspection(_)));
		assert!(error.to_string().contains("introspection is disabled"));
	}

	#[test]
	fn missing_data_fails_the_decode() {
		let error = decode_introspection("{}").unwrap_err();
		assert!(error.to_string().contains("no data"));
	}
}
