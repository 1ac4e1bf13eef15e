//! Completion: fields of the enclosing type, applicable fragments, argument
//! names, and top-level keywords.
//!
//! Documents mid-edit rarely parse clean, so nothing here requires an
//! error-free tree; the context is whatever the tolerant parse produced
//! around the cursor.

use apollo_parser::Parser;
use apollo_parser::cst::{self, CstNode};
use petrel_worker::{CompletionItem, CompletionItemKind, Position};
use rustc_hash::FxHashSet;

use crate::documents::{enclosing_type, node_at_cursor};
use crate::index::{FragmentInfo, ProjectIndex};
use crate::schema::{Schema, TypeDef};
use crate::text::LineIndex;

pub fn completions(
	schema: &Schema,
	text: &str,
	position: Position,
	index: Option<&ProjectIndex>,
	external: &[FragmentInfo],
) -> Vec<CompletionItem> {
	let line_index = LineIndex::new(text);
	let offset = line_index.offset(text, position);
	let tree = Parser::new(text).parse();
	let document = tree.document();
	let Some(node) = node_at_cursor(document.syntax(), offset) else {
		return top_level_keywords();
	};

	// Inside a field's parentheses: argument names not yet written.
	if let Some(arguments) = node.ancestors().find_map(cst::Arguments::cast) {
		return argument_items(schema, &arguments).unwrap_or_default();
	}

	// Inside a selection set: fields of the type the set selects on.
	if let Some(set) = node.ancestors().find_map(cst::SelectionSet::cast) {
		let Some(parent) = enclosing_type(schema, set.syntax()) else {
			return Vec::new();
		};
		return selection_items(schema, parent, &document, index, external);
	}

	top_level_keywords()
}

fn selection_items(
	schema: &Schema,
	parent: &TypeDef,
	document: &cst::Document,
	index: Option<&ProjectIndex>,
	external: &[FragmentInfo],
) -> Vec<CompletionItem> {
	let mut items = Vec::new();
	for field in &parent.fields {
		if field.name.starts_with("__") {
			continue;
		}
		let mut item = CompletionItem::new(field.name.clone(), CompletionItemKind::Field);
		item.detail = Some(field.ty.to_string());
		item.documentation = field.description.clone();
		item.deprecated = field.deprecated;
		items.push(item);
	}

	if parent.is_composite() {
		let mut item = CompletionItem::new("__typename", CompletionItemKind::Field);
		item.detail = Some("String!".to_owned());
		items.push(item);
	}

	// Spreadable fragments: same document first, then the project index,
	// then externally supplied ones. First definition of a name wins.
	let mut seen: FxHashSet<String> = FxHashSet::default();
	for (name, condition) in local_fragments(document) {
		if let Some(condition) = condition
			&& spreadable(schema, parent, &condition)
			&& seen.insert(name.clone())
		{
			items.push(fragment_item(name, &condition));
		}
	}
	if let Some(index) = index {
		for fragment in index.fragments() {
			if let Some(condition) = &fragment.type_condition
				&& spreadable(schema, parent, condition)
				&& seen.insert(fragment.name.clone())
			{
				items.push(fragment_item(fragment.name.clone(), condition));
			}
		}
	}
	for fragment in external {
		if let Some(condition) = &fragment.type_condition
			&& spreadable(schema, parent, condition)
			&& seen.insert(fragment.name.clone())
		{
			items.push(fragment_item(fragment.name.clone(), condition));
		}
	}

	items
}

fn fragment_item(name: String, condition: &str) -> CompletionItem {
	let mut item = CompletionItem::new(name, CompletionItemKind::Fragment);
	item.detail = Some(format!("fragment on {condition}"));
	item
}

/// Whether a fragment on `condition` may be spread inside `parent`.
fn spreadable(schema: &Schema, parent: &TypeDef, condition: &str) -> bool {
	if parent.name == condition
		|| parent.interfaces.iter().any(|i| i == condition)
		|| parent.members.iter().any(|m| m == condition)
	{
		return true;
	}
	schema
		.type_def(condition)
		.is_some_and(|cond| cond.members.iter().any(|m| *m == parent.name))
}

fn argument_items(schema: &Schema, arguments: &cst::Arguments) -> Option<Vec<CompletionItem>> {
	let field_node = arguments.syntax().ancestors().find_map(cst::Field::cast)?;
	let parent = enclosing_type(schema, field_node.syntax())?;
	let def = parent.field(&field_node.name()?.text().to_string())?;
	let present: Vec<String> = arguments
		.arguments()
		.filter_map(|a| Some(a.name()?.text().to_string()))
		.collect();
	Some(
		def.args
			.iter()
			.filter(|arg| !present.contains(&arg.name))
			.map(|arg| {
				let mut item =
					CompletionItem::new(arg.name.clone(), CompletionItemKind::Argument);
				item.detail = Some(arg.ty.to_string());
				item.documentation = arg.description.clone();
				item
			})
			.collect(),
	)
}

fn local_fragments(document: &cst::Document) -> Vec<(String, Option<String>)> {
	document
		.definitions()
		.filter_map(|definition| match definition {
			cst::Definition::FragmentDefinition(fragment) => {
				let name = fragment.fragment_name()?.name()?.text().to_string();
				let condition = fragment
					.type_condition()
					.and_then(|c| c.named_type())
					.and_then(|t| t.name())
					.map(|n| n.text().to_string());
				Some((name, condition))
			}
			_ => None,
		})
		.collect()
}

fn top_level_keywords() -> Vec<CompletionItem> {
	["query", "mutation", "subscription", "fragment"]
		.iter()
		.map(|kw| CompletionItem::new(*kw, CompletionItemKind::Keyword))
		.collect()
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::schema::schema_from_sdl;

	fn schema() -> Schema {
		schema_from_sdl(
			"type Query { user(id: ID!, filter: String): User viewer: User }\n\
			 type User { id: ID! name: String email: String @deprecated }\n\
			 type Pet { nickname: String }",
		)
		.unwrap()
	}

	fn at(offset: usize) -> Position {
		Position::new(0, offset as u32)
	}

	fn labels(items: &[CompletionItem]) -> Vec<&str> {
		items.iter().map(|i| i.label.as_str()).collect()
	}

	#[test]
	fn selection_sets_list_the_enclosing_types_fields() {
		let schema = schema();
		let text = "query { user(id: 1) { name } }";
		let offset = text.find("name").unwrap();
		let items = completions(&schema, text, at(offset), None, &[]);
		let labels = labels(&items);
		assert!(labels.contains(&"id"));
		assert!(labels.contains(&"name"));
		assert!(labels.contains(&"email"));
		assert!(labels.contains(&"__typename"));
		assert!(!labels.contains(&"user"));

		let email = items.iter().find(|i| i.label == "email").unwrap();
		assert!(email.deprecated);
		let name = items.iter().find(|i| i.label == "name").unwrap();
		assert_eq!(name.detail.as_deref(), Some("String"));
	}

	#[test]
	fn root_selection_lists_query_fields() {
		let schema = schema();
		let text = "query {  }";
		let items = completions(&schema, text, at(8), None, &[]);
		let labels = labels(&items);
		assert!(labels.contains(&"user"));
		assert!(labels.contains(&"viewer"));
	}

	#[test]
	fn argument_positions_list_missing_argument_names() {
		let schema = schema();
		let text = "query { user(id: 1, ) { name } }";
		let offset = text.find(", )").unwrap() + 2;
		let items = completions(&schema, text, at(offset), None, &[]);
		assert_eq!(labels(&items), vec!["filter"]);
		assert_eq!(items[0].detail.as_deref(), Some("String"));
	}

	#[test]
	fn applicable_fragments_are_offered() {
		let schema = schema();
		let text = "query { user(id: 1) { name } }\n\
			 fragment UserBits on User { id }\n\
			 fragment PetBits on Pet { nickname }";
		let offset = text.find("name").unwrap();
		let external = crate::deps::parse_external_fragments(&[
			"fragment Extra on User { email }".to_owned(),
		]);
		let items = completions(&schema, text, at(offset), None, &external);
		let labels = labels(&items);
		assert!(labels.contains(&"UserBits"));
		assert!(labels.contains(&"Extra"));
		assert!(!labels.contains(&"PetBits"));
	}

	#[test]
	fn empty_documents_offer_keywords() {
		let schema = schema();
		let items = completions(&schema, "", Position::new(0, 0), None, &[]);
		assert_eq!(
			labels(&items),
			vec!["query", "mutation", "subscription", "fragment"]
		);
	}
}
