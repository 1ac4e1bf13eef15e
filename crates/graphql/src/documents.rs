//! Executable-document analysis.
//!
//! Parsing is tolerant: a broken document still yields a tree, and the
//! records extracted here are plain owned data, safe to keep across await
//! points. The CST itself never leaves this module's helpers.

use apollo_parser::cst::{self, CstNode};
use apollo_parser::{Parser, SyntaxNode};

use crate::schema::{OperationKind, Schema, TypeDef, sdl};

/// One parse error, in byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
	pub offset: usize,
	pub len: usize,
	pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
	Query,
	Mutation,
	Subscription,
	Fragment,
	TypeSystem,
}

impl DefinitionKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			DefinitionKind::Query => "query",
			DefinitionKind::Mutation => "mutation",
			DefinitionKind::Subscription => "subscription",
			DefinitionKind::Fragment => "fragment",
			DefinitionKind::TypeSystem => "typeSystem",
		}
	}
}

/// One top-level definition, flattened to what the features consume.
#[derive(Debug, Clone)]
pub struct DefinitionRecord {
	pub kind: DefinitionKind,
	pub name: Option<String>,
	/// The `on Type` condition, for fragments.
	pub type_condition: Option<String>,
	/// Fragment names spread anywhere inside, deduplicated.
	pub spreads: Vec<String>,
	/// Named types referenced anywhere inside, deduplicated.
	pub type_refs: Vec<String>,
	pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
	pub definitions: Vec<DefinitionRecord>,
	pub errors: Vec<SyntaxIssue>,
}

impl ParsedDocument {
	pub fn is_clean(&self) -> bool {
		self.errors.is_empty()
	}

	pub fn fragments(&self) -> impl Iterator<Item = &DefinitionRecord> {
		self.definitions
			.iter()
			.filter(|d| d.kind == DefinitionKind::Fragment)
	}
}

pub fn parse_document(text: &str) -> ParsedDocument {
	let tree = Parser::new(text).parse();
	let errors = tree
		.errors()
		.map(|error| SyntaxIssue {
			offset: error.index(),
			len: error.data().len().max(1),
			message: error.message().to_owned(),
		})
		.collect();

	let mut definitions = Vec::new();
	for definition in tree.document().definitions() {
		let record = match &definition {
			cst::Definition::OperationDefinition(op) => DefinitionRecord {
				kind: operation_record_kind(sdl::operation_kind_of(op.operation_type())),
				name: op.name().map(|n| n.text().to_string()),
				type_condition: None,
				spreads: spreads_in(op.syntax()),
				type_refs: named_types_in(op.syntax()),
				text: definition.syntax().text().to_string(),
			},
			cst::Definition::FragmentDefinition(fragment) => DefinitionRecord {
				kind: DefinitionKind::Fragment,
				name: fragment
					.fragment_name()
					.and_then(|f| f.name())
					.map(|n| n.text().to_string()),
				type_condition: fragment
					.type_condition()
					.and_then(|c| c.named_type())
					.and_then(|t| t.name())
					.map(|n| n.text().to_string()),
				spreads: spreads_in(fragment.syntax()),
				type_refs: named_types_in(fragment.syntax()),
				text: definition.syntax().text().to_string(),
			},
			other => DefinitionRecord {
				kind: DefinitionKind::TypeSystem,
				name: type_system_name(other),
				type_condition: None,
				spreads: Vec::new(),
				type_refs: Vec::new(),
				text: other.syntax().text().to_string(),
			},
		};
		definitions.push(record);
	}

	ParsedDocument { definitions, errors }
}

fn operation_record_kind(kind: Option<OperationKind>) -> DefinitionKind {
	// Shorthand operations without a keyword are queries.
	match kind.unwrap_or(OperationKind::Query) {
		OperationKind::Query => DefinitionKind::Query,
		OperationKind::Mutation => DefinitionKind::Mutation,
		OperationKind::Subscription => DefinitionKind::Subscription,
	}
}

fn type_system_name(definition: &cst::Definition) -> Option<String> {
	if matches!(
		definition,
		cst::Definition::SchemaDefinition(_) | cst::Definition::SchemaExtension(_)
	) {
		return None;
	}
	definition
		.syntax()
		.descendants()
		.find_map(cst::Name::cast)
		.map(|n| n.text().to_string())
}

/// Fragment names spread anywhere under `node`, deduplicated in order.
pub(crate) fn spreads_in(node: &SyntaxNode) -> Vec<String> {
	let mut out = Vec::new();
	for descendant in node.descendants() {
		if let Some(spread) = cst::FragmentSpread::cast(descendant)
			&& let Some(name) = spread.fragment_name().and_then(|f| f.name())
		{
			push_unique(&mut out, name.text().to_string());
		}
	}
	out
}

/// Named types referenced under `node`: type conditions and variable types.
pub(crate) fn named_types_in(node: &SyntaxNode) -> Vec<String> {
	let mut out = Vec::new();
	for descendant in node.descendants() {
		if let Some(named) = cst::NamedType::cast(descendant)
			&& let Some(name) = named.name()
		{
			push_unique(&mut out, name.text().to_string());
		}
	}
	out
}

fn push_unique(out: &mut Vec<String>, value: String) {
	if !out.contains(&value) {
		out.push(value);
	}
}

/// The deepest node whose range contains `offset`.
pub(crate) fn node_at_offset(root: &SyntaxNode, offset: usize) -> Option<SyntaxNode> {
	let mut best = None;
	for node in root.descendants() {
		let range = node.text_range();
		if usize::from(range.start()) <= offset && offset < usize::from(range.end()) {
			// descendants() is pre-order, so later hits are deeper.
			best = Some(node);
		}
	}
	best
}

/// Like [`node_at_offset`], but a cursor sitting just past a token counts
/// as being on it.
pub(crate) fn node_at_cursor(root: &SyntaxNode, offset: usize) -> Option<SyntaxNode> {
	node_at_offset(root, offset)
		.or_else(|| offset.checked_sub(1).and_then(|o| node_at_offset(root, o)))
}

/// The type whose fields the selection context around `from` draws on.
///
/// Climbs from `from`'s parent, collecting field names inside-out until an
/// operation root, fragment condition, or inline-fragment condition anchors
/// the path, then navigates back down through the schema.
pub(crate) fn enclosing_type<'s>(schema: &'s Schema, from: &SyntaxNode) -> Option<&'s TypeDef> {
	let mut segments: Vec<String> = Vec::new();
	let mut cursor = from.parent();
	while let Some(node) = cursor {
		if let Some(field) = cst::Field::cast(node.clone()) {
			segments.push(field.name()?.text().to_string());
		} else if let Some(inline) = cst::InlineFragment::cast(node.clone()) {
			if let Some(name) = inline
				.type_condition()
				.and_then(|c| c.named_type())
				.and_then(|t| t.name())
			{
				let root = schema.type_def(&name.text().to_string())?;
				segments.reverse();
				return schema.navigate(root, &segments);
			}
		} else if let Some(fragment) = cst::FragmentDefinition::cast(node.clone()) {
			let name = fragment
				.type_condition()
				.and_then(|c| c.named_type())
				.and_then(|t| t.name())?;
			let root = schema.type_def(&name.text().to_string())?;
			segments.reverse();
			return schema.navigate(root, &segments);
		} else if let Some(operation) = cst::OperationDefinition::cast(node.clone()) {
			let kind = sdl::operation_kind_of(operation.operation_type())
				.unwrap_or(OperationKind::Query);
			let root = schema.operation_root(kind)?;
			segments.reverse();
			return schema.navigate(root, &segments);
		}
		cursor = node.parent();
	}
	None
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::schema::schema_from_sdl;

	#[test]
	fn records_every_definition_kind() {
		let parsed = parse_document(
			"query GetUser($id: ID!) { user(id: $id) { ...Profile } }\n\
			 mutation Rename { rename }\n\
			 fragment Profile on User { name ...Contact }\n\
			 type Local { x: Int }",
		);
		assert!(parsed.is_clean());
		let kinds: Vec<DefinitionKind> = parsed.definitions.iter().map(|d| d.kind).collect();
		assert_eq!(
			kinds,
			vec![
				DefinitionKind::Query,
				DefinitionKind::Mutation,
				DefinitionKind::Fragment,
				DefinitionKind::TypeSystem,
			]
		);

		let query = &parsed.definitions[0];
		assert_eq!(query.name.as_deref(), Some("GetUser"));
		assert_eq!(query.spreads, vec!["Profile".to_owned()]);
		assert_eq!(query.type_refs, vec!["ID".to_owned()]);

		let fragment = &parsed.definitions[2];
		assert_eq!(fragment.type_condition.as_deref(), Some("User"));
		assert_eq!(fragment.spreads, vec!["Contact".to_owned()]);

		assert_eq!(parsed.definitions[3].name.as_deref(), Some("Local"));
	}

	#[test]
	fn errors_carry_byte_offsets() {
		let parsed = parse_document("query { user ");
		assert!(!parsed.is_clean());
		let issue = &parsed.errors[0];
		assert!(issue.offset <= "query { user ".len());
		assert!(issue.len >= 1);
		assert!(!issue.message.is_empty());
	}

	#[test]
	fn repeated_spreads_are_deduplicated() {
		let parsed = parse_document("{ a { ...Bits } b { ...Bits } }");
		assert_eq!(parsed.definitions[0].spreads, vec!["Bits".to_owned()]);
	}

	/// The field CST node whose name sits at `offset`.
	fn field_at(tree: &apollo_parser::SyntaxTree, offset: usize) -> cst::Field {
		let node = node_at_offset(tree.document().syntax(), offset).unwrap();
		node.ancestors().find_map(cst::Field::cast).unwrap()
	}

	#[test]
	fn enclosing_type_walks_nested_selections() {
		let schema = schema_from_sdl(
			"type Query { user: User }\n\
			 type User { pet: Pet name: String }\n\
			 type Pet { nickname: String }",
		)
		.unwrap();
		let text = "query { user { pet { nickname } } }";
		let tree = Parser::new(text).parse();

		let field = field_at(&tree, text.find("nickname").unwrap());
		assert_eq!(enclosing_type(&schema, field.syntax()).unwrap().name, "Pet");

		let field = field_at(&tree, text.find("pet").unwrap());
		assert_eq!(enclosing_type(&schema, field.syntax()).unwrap().name, "User");
	}

	#[test]
	fn enclosing_type_honors_fragment_and_inline_conditions() {
		let schema = schema_from_sdl(
			"type Query { actor: Actor }\n\
			 union Actor = User\n\
			 type User { name: String }",
		)
		.unwrap();
		let text = "fragment F on User { name }";
		let tree = Parser::new(text).parse();
		let field = field_at(&tree, text.find("name").unwrap());
		assert_eq!(enclosing_type(&schema, field.syntax()).unwrap().name, "User");

		let text = "query { actor { ... on User { name } } }";
		let tree = Parser::new(text).parse();
		let field = field_at(&tree, text.rfind("name").unwrap());
		assert_eq!(enclosing_type(&schema, field.syntax()).unwrap().name, "User");
	}
}
