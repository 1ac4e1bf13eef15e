//! Type extensions gathered from open documents and project files.
//!
//! Extensions are identified by content, not by origin: the cache compares a
//! hash over the sorted set, so reordering files or re-parsing unchanged text
//! never invalidates a schema, while any textual change does.

use apollo_parser::Parser;
use apollo_parser::cst::{self, CstNode};
use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

use crate::schema::{FieldDef, Schema, TypeDef, sdl};

/// One extension-kind definition: an `extend` block or a directive
/// definition found outside the schema source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
	/// The extended type's name, or the defined directive's name.
	pub name: String,
	/// The definition's source text.
	pub text: String,
}

/// Extension-kind definitions in `source`, in document order. Source that
/// fails to parse contributes nothing.
pub fn collect_extensions(source: &str) -> Vec<Extension> {
	let tree = Parser::new(source).parse();
	if tree.errors().next().is_some() {
		return Vec::new();
	}
	let mut out = Vec::new();
	for definition in tree.document().definitions() {
		let name = match &definition {
			cst::Definition::ObjectTypeExtension(ext) => ext.name(),
			cst::Definition::InterfaceTypeExtension(ext) => ext.name(),
			cst::Definition::UnionTypeExtension(ext) => ext.name(),
			cst::Definition::EnumTypeExtension(ext) => ext.name(),
			cst::Definition::ScalarTypeExtension(ext) => ext.name(),
			cst::Definition::InputObjectTypeExtension(ext) => ext.name(),
			cst::Definition::DirectiveDefinition(def) => def.name(),
			_ => continue,
		};
		let Some(name) = name else { continue };
		out.push(Extension {
			name: name.text().to_string(),
			text: definition.syntax().text().to_string().trim().to_owned(),
		});
	}
	out
}

/// Order-independent content hash over a set of extensions.
pub fn extension_hash(extensions: &[Extension]) -> u64 {
	let mut sorted: Vec<&Extension> = extensions.iter().collect();
	sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.text.cmp(&b.text)));
	let mut hasher = Xxh3::new();
	for extension in sorted {
		hasher.update(extension.name.as_bytes());
		hasher.update(&[0]);
		hasher.update(extension.text.as_bytes());
		hasher.update(&[0]);
	}
	hasher.digest()
}

/// Fold `extensions` into `schema`, in the same sorted order the hash uses.
///
/// Members that already exist on the target are skipped, so merging is
/// idempotent. Extensions naming a type the schema does not define are
/// dropped with a debug log.
pub fn merge_extensions(schema: &mut Schema, extensions: &[Extension]) {
	let mut sorted: Vec<&Extension> = extensions.iter().collect();
	sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.text.cmp(&b.text)));
	for extension in sorted {
		merge_one(schema, extension);
	}
}

fn merge_one(schema: &mut Schema, extension: &Extension) {
	let tree = Parser::new(&extension.text).parse();
	if tree.errors().next().is_some() {
		debug!(name = %extension.name, "extension text no longer parses, skipping");
		return;
	}
	for definition in tree.document().definitions() {
		match definition {
			cst::Definition::ObjectTypeExtension(ext) => {
				let fields = ext
					.fields_definition()
					.map(|f| sdl::field_defs(&f))
					.unwrap_or_default();
				let interfaces = ext
					.implements_interfaces()
					.map(|i| {
						i.named_types()
							.filter_map(|t| Some(t.name()?.text().to_string()))
							.collect()
					})
					.unwrap_or_default();
				extend_fields(schema, &extension.name, fields, interfaces);
			}
			cst::Definition::InterfaceTypeExtension(ext) => {
				let fields = ext
					.fields_definition()
					.map(|f| sdl::field_defs(&f))
					.unwrap_or_default();
				extend_fields(schema, &extension.name, fields, Vec::new());
			}
			cst::Definition::UnionTypeExtension(ext) => {
				let members: Vec<String> = ext
					.union_member_types()
					.map(|m| {
						m.named_types()
							.filter_map(|t| Some(t.name()?.text().to_string()))
							.collect()
					})
					.unwrap_or_default();
				let Some(target) = lookup(schema, &extension.name) else { return };
				for member in members {
					if !target.members.contains(&member) {
						target.members.push(member);
					}
				}
			}
			cst::Definition::EnumTypeExtension(ext) => {
				let values = ext
					.enum_values_definition()
					.map(|v| sdl::enum_value_defs(&v))
					.unwrap_or_default();
				let Some(target) = lookup(schema, &extension.name) else { return };
				for value in values {
					if !target.enum_values.iter().any(|v| v.name == value.name) {
						target.enum_values.push(value);
					}
				}
			}
			cst::Definition::InputObjectTypeExtension(ext) => {
				let fields = ext
					.input_fields_definition()
					.map(|f| sdl::input_value_defs(f.input_value_definitions()))
					.unwrap_or_default();
				let Some(target) = lookup(schema, &extension.name) else { return };
				for field in fields {
					if !target.input_fields.iter().any(|f| f.name == field.name) {
						target.input_fields.push(field);
					}
				}
			}
			cst::Definition::ScalarTypeExtension(_) => {
				// Directive-only extensions carry nothing the model records.
			}
			cst::Definition::DirectiveDefinition(def) => {
				if let Some(directive) = sdl::directive_def(&def) {
					schema.upsert_directive(directive);
				}
			}
			_ => {}
		}
	}
}

fn extend_fields(schema: &mut Schema, name: &str, fields: Vec<FieldDef>, interfaces: Vec<String>) {
	let Some(target) = lookup(schema, name) else { return };
	for field in fields {
		if target.field(&field.name).is_none() {
			target.fields.push(field);
		}
	}
	for interface in interfaces {
		if !target.interfaces.contains(&interface) {
			target.interfaces.push(interface);
		}
	}
}

fn lookup<'s>(schema: &'s mut Schema, name: &str) -> Option<&'s mut TypeDef> {
	let found = schema.types.get_mut(name);
	if found.is_none() {
		debug!(name = %name, "extension targets a type the schema does not define");
	}
	found
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::schema::schema_from_sdl;

	fn extension(name: &str, text: &str) -> Extension {
		Extension {
			name: name.to_owned(),
			text: text.to_owned(),
		}
	}

	#[test]
	fn collects_extension_definitions_only() {
		let source = "\
			query Q { a }\n\
			extend type User { nickname: String }\n\
			directive @label(text: String) on FIELD\n\
			type Fresh { id: ID }\n";
		let found = collect_extensions(source);
		let names: Vec<&str> = found.iter().map(|e| e.name.as_str()).collect();
		assert_eq!(names, vec!["User", "label"]);
		assert!(found[0].text.starts_with("extend type User"));
	}

	#[test]
	fn broken_source_contributes_nothing() {
		assert_eq!(collect_extensions("extend type User {{{"), Vec::new());
	}

	#[test]
	fn hash_ignores_order_but_not_content() {
		let a = extension("User", "extend type User { a: Int }");
		let b = extension("Query", "extend type Query { b: Int }");
		let forward = extension_hash(&[a.clone(), b.clone()]);
		let reversed = extension_hash(&[b.clone(), a.clone()]);
		assert_eq!(forward, reversed);

		let edited = extension("User", "extend type User { a: String }");
		assert_ne!(forward, extension_hash(&[edited, b]));
		assert_ne!(forward, extension_hash(&[a]));
	}

	#[test]
	fn merging_adds_fields_values_and_members() {
		let mut schema = schema_from_sdl(
			"type Query { user: User }\n\
			 type User { id: ID }\n\
			 type Bot { id: ID }\n\
			 enum Role { ADMIN }\n\
			 union Actor = User",
		)
		.unwrap();
		let extensions = vec![
			extension("User", "extend type User { nickname: String }"),
			extension("Role", "extend enum Role { GUEST }"),
			extension("Actor", "extend union Actor = Bot"),
			extension("Ghost", "extend type Ghost { x: Int }"),
		];
		merge_extensions(&mut schema, &extensions);
		merge_extensions(&mut schema, &extensions);

		let user = schema.type_def("User").unwrap();
		assert_eq!(user.fields.len(), 2);
		assert_eq!(user.field("nickname").unwrap().ty.to_string(), "String");

		let role = schema.type_def("Role").unwrap();
		assert_eq!(role.enum_values.len(), 2);

		let actor = schema.type_def("Actor").unwrap();
		assert_eq!(actor.members, vec!["User".to_owned(), "Bot".to_owned()]);

		assert!(schema.type_def("Ghost").is_none());
	}
}
