//! Schema construction from SDL text.
//!
//! The converters here are also what the extension merger uses, so fields
//! and values parsed from an `extend type` block come out identical to ones
//! parsed from a base definition.

use apollo_parser::Parser;
use apollo_parser::cst::{self, CstNode};

use crate::schema::{
	DirectiveDef, EnumValueDef, FieldDef, InputValueDef, OperationKind, Schema, TypeDef, TypeKind,
	TypeRef,
};
use crate::{Error, Result};

/// Scalars every schema carries without declaring them.
pub const BUILTIN_SCALARS: &[&str] = &["Int", "Float", "String", "Boolean", "ID"];

/// Build a schema from SDL. Extension-kind definitions in the text are
/// skipped here; they travel through the extension merge path instead.
pub fn schema_from_sdl(text: &str) -> Result<Schema> {
	let tree = Parser::new(text).parse();
	let error_count = tree.errors().count();
	if error_count > 0 {
		let first = tree
			.errors()
			.next()
			.map(|e| e.message().to_owned())
			.unwrap_or_default();
		return Err(Error::InvalidOptions(format!(
			"schema text has {error_count} syntax error(s), first: {first}"
		)));
	}

	let mut schema = Schema::default();
	let mut explicit_roots = false;
	for definition in tree.document().definitions() {
		match definition {
			cst::Definition::SchemaDefinition(def) => {
				explicit_roots = true;
				for root in def.root_operation_type_definitions() {
					let Some(name) = root.named_type().and_then(|t| t.name()) else {
						continue;
					};
					let name = name.text().to_string();
					match operation_kind_of(root.operation_type()) {
						Some(OperationKind::Query) => schema.query_type = Some(name),
						Some(OperationKind::Mutation) => schema.mutation_type = Some(name),
						Some(OperationKind::Subscription) => {
							schema.subscription_type = Some(name);
						}
						None => {}
					}
				}
			}
			cst::Definition::ObjectTypeDefinition(def) => {
				if let Some(ty) = object_type(&def) {
					schema.types.insert(ty.name.clone(), ty);
				}
			}
			cst::Definition::InterfaceTypeDefinition(def) => {
				if let Some(ty) = interface_type(&def) {
					schema.types.insert(ty.name.clone(), ty);
				}
			}
			cst::Definition::UnionTypeDefinition(def) => {
				if let Some(ty) = union_type(&def) {
					schema.types.insert(ty.name.clone(), ty);
				}
			}
			cst::Definition::EnumTypeDefinition(def) => {
				if let Some(ty) = enum_type(&def) {
					schema.types.insert(ty.name.clone(), ty);
				}
			}
			cst::Definition::ScalarTypeDefinition(def) => {
				if let Some(ty) = scalar_type(&def) {
					schema.types.insert(ty.name.clone(), ty);
				}
			}
			cst::Definition::InputObjectTypeDefinition(def) => {
				if let Some(ty) = input_object_type(&def) {
					schema.types.insert(ty.name.clone(), ty);
				}
			}
			cst::Definition::DirectiveDefinition(def) => {
				if let Some(directive) = directive_def(&def) {
					schema.upsert_directive(directive);
				}
			}
			_ => {}
		}
	}

	// Without a `schema { ... }` block, conventional root names apply.
	if !explicit_roots {
		if schema.types.contains_key("Query") {
			schema.query_type = Some("Query".to_owned());
		}
		if schema.types.contains_key("Mutation") {
			schema.mutation_type = Some("Mutation".to_owned());
		}
		if schema.types.contains_key("Subscription") {
			schema.subscription_type = Some("Subscription".to_owned());
		}
	}

	for scalar in BUILTIN_SCALARS {
		schema
			.types
			.entry((*scalar).to_owned())
			.or_insert_with(|| TypeDef::new(*scalar, TypeKind::Scalar));
	}

	Ok(schema)
}

/// Directive definitions parsed out of standalone SDL snippets. Snippets
/// with syntax errors contribute nothing.
pub(crate) fn parse_directive_definitions(text: &str) -> Vec<DirectiveDef> {
	let tree = Parser::new(text).parse();
	if tree.errors().next().is_some() {
		return Vec::new();
	}
	tree.document()
		.definitions()
		.filter_map(|definition| match definition {
			cst::Definition::DirectiveDefinition(def) => directive_def(&def),
			_ => None,
		})
		.collect()
}

fn object_type(def: &cst::ObjectTypeDefinition) -> Option<TypeDef> {
	let mut ty = TypeDef::new(def.name()?.text().to_string(), TypeKind::Object);
	ty.description = description_text(def.description());
	ty.interfaces = interface_names(def.implements_interfaces());
	ty.fields = def
		.fields_definition()
		.map(|f| field_defs(&f))
		.unwrap_or_default();
	Some(ty)
}

fn interface_type(def: &cst::InterfaceTypeDefinition) -> Option<TypeDef> {
	let mut ty = TypeDef::new(def.name()?.text().to_string(), TypeKind::Interface);
	ty.description = description_text(def.description());
	ty.interfaces = interface_names(def.implements_interfaces());
	ty.fields = def
		.fields_definition()
		.map(|f| field_defs(&f))
		.unwrap_or_default();
	Some(ty)
}

fn union_type(def: &cst::UnionTypeDefinition) -> Option<TypeDef> {
	let mut ty = TypeDef::new(def.name()?.text().to_string(), TypeKind::Union);
	ty.description = description_text(def.description());
	ty.members = member_names(def.union_member_types());
	Some(ty)
}

fn enum_type(def: &cst::EnumTypeDefinition) -> Option<TypeDef> {
	let mut ty = TypeDef::new(def.name()?.text().to_string(), TypeKind::Enum);
	ty.description = description_text(def.description());
	ty.enum_values = def
		.enum_values_definition()
		.map(|v| enum_value_defs(&v))
		.unwrap_or_default();
	Some(ty)
}

fn scalar_type(def: &cst::ScalarTypeDefinition) -> Option<TypeDef> {
	let mut ty = TypeDef::new(def.name()?.text().to_string(), TypeKind::Scalar);
	ty.description = description_text(def.description());
	Some(ty)
}

fn input_object_type(def: &cst::InputObjectTypeDefinition) -> Option<TypeDef> {
	let mut ty = TypeDef::new(def.name()?.text().to_string(), TypeKind::InputObject);
	ty.description = description_text(def.description());
	ty.input_fields = def
		.input_fields_definition()
		.map(|f| input_value_defs(f.input_value_definitions()))
		.unwrap_or_default();
	Some(ty)
}

pub(crate) fn directive_def(def: &cst::DirectiveDefinition) -> Option<DirectiveDef> {
	Some(DirectiveDef {
		name: def.name()?.text().to_string(),
		description: description_text(def.description()),
		args: def
			.arguments_definition()
			.map(|a| input_value_defs(a.input_value_definitions()))
			.unwrap_or_default(),
	})
}

pub(crate) fn field_defs(fields: &cst::FieldsDefinition) -> Vec<FieldDef> {
	fields
		.field_definitions()
		.filter_map(|field| {
			let name = field.name()?.text().to_string();
			let ty = type_ref(&field.ty()?)?;
			let (deprecated, deprecation_reason) = deprecation(field.directives());
			Some(FieldDef {
				name,
				description: description_text(field.description()),
				ty,
				args: field
					.arguments_definition()
					.map(|a| input_value_defs(a.input_value_definitions()))
					.unwrap_or_default(),
				deprecated,
				deprecation_reason,
			})
		})
		.collect()
}

pub(crate) fn input_value_defs(
	values: impl Iterator<Item = cst::InputValueDefinition>,
) -> Vec<InputValueDef> {
	values
		.filter_map(|value| {
			Some(InputValueDef {
				name: value.name()?.text().to_string(),
				description: description_text(value.description()),
				ty: type_ref(&value.ty()?)?,
				default_value: value
					.default_value()
					.and_then(|d| d.value())
					.map(|v| v.syntax().text().to_string().trim().to_owned()),
			})
		})
		.collect()
}

pub(crate) fn enum_value_defs(values: &cst::EnumValuesDefinition) -> Vec<EnumValueDef> {
	values
		.enum_value_definitions()
		.filter_map(|value| {
			let name = value.enum_value()?.name()?.text().to_string();
			let (deprecated, deprecation_reason) = deprecation(value.directives());
			Some(EnumValueDef {
				name,
				description: description_text(value.description()),
				deprecated,
				deprecation_reason,
			})
		})
		.collect()
}

pub(crate) fn type_ref(ty: &cst::Type) -> Option<TypeRef> {
	match ty {
		cst::Type::NamedType(named) => Some(TypeRef::Named(named.name()?.text().to_string())),
		cst::Type::ListType(list) => Some(TypeRef::List(Box::new(type_ref(&list.ty()?)?))),
		cst::Type::NonNullType(non_null) => {
			let inner = if let Some(named) = non_null.named_type() {
				TypeRef::Named(named.name()?.text().to_string())
			} else if let Some(list) = non_null.list_type() {
				TypeRef::List(Box::new(type_ref(&list.ty()?)?))
			} else {
				return None;
			};
			Some(TypeRef::NonNull(Box::new(inner)))
		}
	}
}

pub(crate) fn operation_kind_of(op: Option<cst::OperationType>) -> Option<OperationKind> {
	let op = op?;
	if op.query_token().is_some() {
		Some(OperationKind::Query)
	} else if op.mutation_token().is_some() {
		Some(OperationKind::Mutation)
	} else if op.subscription_token().is_some() {
		Some(OperationKind::Subscription)
	} else {
		None
	}
}

pub(crate) fn description_text(description: Option<cst::Description>) -> Option<String> {
	let raw = description?.syntax().text().to_string();
	let stripped = strip_string_quotes(raw.trim());
	if stripped.is_empty() { None } else { Some(stripped) }
}

/// @deprecated presence and reason, from a definition's directive list.
pub(crate) fn deprecation(directives: Option<cst::Directives>) -> (bool, Option<String>) {
	let Some(directives) = directives else {
		return (false, None);
	};
	for directive in directives.directives() {
		let Some(name) = directive.name() else {
			continue;
		};
		if &*name.text() != "deprecated" {
			continue;
		}
		let reason = directive.arguments().and_then(|args| {
			args.arguments().find_map(|argument| {
				let arg_name = argument.name()?;
				if &*arg_name.text() != "reason" {
					return None;
				}
				let raw = argument.value()?.syntax().text().to_string();
				Some(strip_string_quotes(raw.trim()))
			})
		});
		return (true, reason);
	}
	(false, None)
}

fn strip_string_quotes(raw: &str) -> String {
	let inner = raw
		.strip_prefix("\"\"\"")
		.and_then(|r| r.strip_suffix("\"\"\""))
		.or_else(|| raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')))
		.unwrap_or(raw);
	inner.trim().to_owned()
}

fn interface_names(implements: Option<cst::ImplementsInterfaces>) -> Vec<String> {
	implements
		.map(|i| {
			i.named_types()
				.filter_map(|t| Some(t.name()?.text().to_string()))
				.collect()
		})
		.unwrap_or_default()
}

fn member_names(members: Option<cst::UnionMemberTypes>) -> Vec<String> {
	members
		.map(|m| {
			m.named_types()
				.filter_map(|t| Some(t.name()?.text().to_string()))
				.collect()
		})
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	const SDL: &str = r#"
"The account of a person."
type User implements Node {
	id: ID!
	"Display name."
	name: String
	email: String @deprecated(reason: "use contact")
	friends(first: Int = 10): [User!]
}

interface Node { id: ID! }
union Actor = User | Bot
type Bot { id: ID! handler: String }
enum Role { ADMIN MEMBER GUEST @deprecated }
input UserFilter { role: Role nameLike: String }
scalar DateTime
directive @uppercase on FIELD

type Query { user(id: ID!): User actors: [Actor] }
"#;

	#[test]
	fn builds_the_full_type_map() {
		let schema = schema_from_sdl(SDL).unwrap();
		assert_eq!(schema.query_type.as_deref(), Some("Query"));
		assert_eq!(schema.mutation_type, None);

		let user = schema.type_def("User").unwrap();
		assert_eq!(user.kind, TypeKind::Object);
		assert_eq!(user.description.as_deref(), Some("The account of a person."));
		assert_eq!(user.interfaces, vec!["Node".to_owned()]);

		let friends = user.field("friends").unwrap();
		assert_eq!(friends.ty.to_string(), "[User!]");
		assert_eq!(friends.args[0].name, "first");
		assert_eq!(friends.args[0].default_value.as_deref(), Some("10"));

		let email = user.field("email").unwrap();
		assert!(email.deprecated);
		assert_eq!(email.deprecation_reason.as_deref(), Some("use contact"));

		let actor = schema.type_def("Actor").unwrap();
		assert_eq!(actor.members, vec!["User".to_owned(), "Bot".to_owned()]);

		let role = schema.type_def("Role").unwrap();
		assert_eq!(role.enum_values.len(), 3);
		assert!(role.enum_values[2].deprecated);
		assert_eq!(role.enum_values[2].deprecation_reason, None);

		let filter = schema.type_def("UserFilter").unwrap();
		assert_eq!(filter.input_fields.len(), 2);

		assert!(schema.directives.iter().any(|d| d.name == "uppercase"));
	}

	#[test]
	fn builtin_scalars_are_navigable() {
		let schema = schema_from_sdl("type Query { ok: Boolean }").unwrap();
		assert_eq!(schema.type_def("Boolean").unwrap().kind, TypeKind::Scalar);
		assert_eq!(schema.type_def("String").unwrap().kind, TypeKind::Scalar);
	}

	#[test]
	fn explicit_schema_block_overrides_conventional_roots() {
		let schema = schema_from_sdl(
			"schema { query: Root }\n\
			 type Root { ping: String }\n\
			 type Query { decoy: String }",
		)
		.unwrap();
		assert_eq!(schema.query_type.as_deref(), Some("Root"));
	}

	#[test]
	fn malformed_sdl_is_rejected() {
		let error = schema_from_sdl("type Query {{{").unwrap_err();
		assert!(matches!(error, Error::InvalidOptions(_)));
	}
}
