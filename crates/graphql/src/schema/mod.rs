//! The schema model every feature consumes.
//!
//! A [`Schema`] is built from either a remote introspection response or SDL
//! text, then extended in place by locally defined type extensions and
//! custom directives. Lookup is by type name; the traversal helpers keep
//! hover and completion out of the raw maps.

pub mod cache;
pub mod extensions;
pub mod introspection;
pub mod loader;
pub mod sdl;

use std::fmt;

use rustc_hash::FxHashMap;

pub use cache::SchemaCache;
pub use extensions::{Extension, collect_extensions, extension_hash, merge_extensions};
pub use introspection::INTROSPECTION_QUERY;
pub use loader::{HttpSchemaLoader, SchemaLoader};
pub use sdl::schema_from_sdl;

/// Which root a definition executes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
	Query,
	Mutation,
	Subscription,
}

/// A complete, queryable schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
	pub query_type: Option<String>,
	pub mutation_type: Option<String>,
	pub subscription_type: Option<String>,
	pub types: FxHashMap<String, TypeDef>,
	pub directives: Vec<DirectiveDef>,
}

impl Schema {
	pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
		self.types.get(name)
	}

	pub fn query_root(&self) -> Option<&TypeDef> {
		self.types.get(self.query_type.as_deref()?)
	}

	/// The root type serving `kind`, when the schema declares one.
	pub fn operation_root(&self, kind: OperationKind) -> Option<&TypeDef> {
		let name = match kind {
			OperationKind::Query => self.query_type.as_deref(),
			OperationKind::Mutation => self.mutation_type.as_deref(),
			OperationKind::Subscription => self.subscription_type.as_deref(),
		};
		self.types.get(name?)
	}

	/// Walk a field path from `root`, answering the type the last segment
	/// lands on. List and non-null wrappers are looked through.
	pub fn navigate<'s>(&'s self, root: &'s TypeDef, path: &[String]) -> Option<&'s TypeDef> {
		let mut current = root;
		for segment in path {
			let field = current.field(segment)?;
			current = self.type_def(field.ty.name())?;
		}
		Some(current)
	}

	/// Replace any same-name directive, otherwise append.
	pub fn upsert_directive(&mut self, directive: DirectiveDef) {
		match self.directives.iter_mut().find(|d| d.name == directive.name) {
			Some(existing) => *existing = directive,
			None => self.directives.push(directive),
		}
	}
}

/// Kind tag for a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
	Object,
	Interface,
	Union,
	Enum,
	Scalar,
	InputObject,
}

impl TypeKind {
	/// The SDL keyword introducing this kind.
	pub fn keyword(&self) -> &'static str {
		match self {
			TypeKind::Object => "type",
			TypeKind::Interface => "interface",
			TypeKind::Union => "union",
			TypeKind::Enum => "enum",
			TypeKind::Scalar => "scalar",
			TypeKind::InputObject => "input",
		}
	}
}

/// One named type.
#[derive(Debug, Clone)]
pub struct TypeDef {
	pub name: String,
	pub kind: TypeKind,
	pub description: Option<String>,
	/// Output fields, for objects and interfaces.
	pub fields: Vec<FieldDef>,
	/// Input fields, for input objects.
	pub input_fields: Vec<InputValueDef>,
	pub enum_values: Vec<EnumValueDef>,
	/// Interface names this type implements.
	pub interfaces: Vec<String>,
	/// Member type names, for unions.
	pub members: Vec<String>,
}

impl TypeDef {
	pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
		Self {
			name: name.into(),
			kind,
			description: None,
			fields: Vec::new(),
			input_fields: Vec::new(),
			enum_values: Vec::new(),
			interfaces: Vec::new(),
			members: Vec::new(),
		}
	}

	pub fn field(&self, name: &str) -> Option<&FieldDef> {
		self.fields.iter().find(|f| f.name == name)
	}

	/// Whether selection sets apply to this type.
	pub fn is_composite(&self) -> bool {
		matches!(self.kind, TypeKind::Object | TypeKind::Interface | TypeKind::Union)
	}
}

#[derive(Debug, Clone)]
pub struct FieldDef {
	pub name: String,
	pub description: Option<String>,
	pub ty: TypeRef,
	pub args: Vec<InputValueDef>,
	pub deprecated: bool,
	pub deprecation_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InputValueDef {
	pub name: String,
	pub description: Option<String>,
	pub ty: TypeRef,
	/// Default value rendered as GraphQL source, when present.
	pub default_value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnumValueDef {
	pub name: String,
	pub description: Option<String>,
	pub deprecated: bool,
	pub deprecation_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DirectiveDef {
	pub name: String,
	pub description: Option<String>,
	pub args: Vec<InputValueDef>,
}

/// A possibly wrapped reference to a named type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
	Named(String),
	List(Box<TypeRef>),
	NonNull(Box<TypeRef>),
}

impl TypeRef {
	/// The innermost named type.
	pub fn name(&self) -> &str {
		match self {
			TypeRef::Named(name) => name,
			TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.name(),
		}
	}
}

impl fmt::Display for TypeRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TypeRef::Named(name) => f.write_str(name),
			TypeRef::List(inner) => write!(f, "[{inner}]"),
			TypeRef::NonNull(inner) => write!(f, "{inner}!"),
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn type_refs_render_as_sdl() {
		let ty = TypeRef::NonNull(Box::new(TypeRef::List(Box::new(TypeRef::NonNull(
			Box::new(TypeRef::Named("User".to_owned())),
		)))));
		assert_eq!(ty.to_string(), "[User!]!");
		assert_eq!(ty.name(), "User");
	}

	#[test]
	fn navigate_follows_field_types() {
		let schema = schema_from_sdl(
			"type Query { viewer: User }\n\
			 type User { friends: [User!]! name: String }",
		)
		.unwrap();
		let root = schema.query_root().unwrap();
		let path = ["viewer".to_owned(), "friends".to_owned()];
		let landed = schema.navigate(root, &path).unwrap();
		assert_eq!(landed.name, "User");
		assert!(schema.navigate(root, &["missing".to_owned()]).is_none());
	}
}
