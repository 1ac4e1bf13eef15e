//! Hover: schema information for the symbol under the cursor.

use apollo_parser::Parser;
use apollo_parser::cst::{self, CstNode};
use petrel_worker::{Hover, Position, Range};

use crate::documents::{enclosing_type, node_at_offset};
use crate::schema::{FieldDef, InputValueDef, Schema, TypeDef};
use crate::text::LineIndex;

/// Hover content for `position`, or `None` when nothing resolvable sits
/// there. Works on documents with syntax errors as far as the tree allows.
pub fn hover(schema: &Schema, text: &str, position: Position) -> Option<Hover> {
	let line_index = LineIndex::new(text);
	let offset = line_index.offset(text, position);
	let tree = Parser::new(text).parse();
	let start_node = node_at_offset(tree.document().syntax(), offset)?;

	let mut cursor = Some(start_node);
	while let Some(current) = cursor {
		if let Some(named) = cst::NamedType::cast(current.clone()) {
			let name = named.name()?.text().to_string();
			let def = schema.type_def(&name)?;
			let range = node_range(named.syntax(), &line_index, text);
			return Some(type_hover(def, range));
		}

		if let Some(argument) = cst::Argument::cast(current.clone())
			&& let Some(name_node) = argument.name()
			&& contains_offset(name_node.syntax(), offset)
		{
			let field_node = current.ancestors().find_map(cst::Field::cast)?;
			let parent = enclosing_type(schema, field_node.syntax())?;
			let field_def = parent.field(&field_node.name()?.text().to_string())?;
			let name = name_node.text().to_string();
			let arg = field_def.args.iter().find(|a| a.name == name)?;
			let range = node_range(name_node.syntax(), &line_index, text);
			return Some(argument_hover(arg, range));
		}

		if let Some(field) = cst::Field::cast(current.clone()) {
			let name_node = field.name()?;
			if !contains_offset(name_node.syntax(), offset) {
				// The cursor is elsewhere inside the field, not on its name.
				return None;
			}
			let name = name_node.text().to_string();
			let range = node_range(name_node.syntax(), &line_index, text);
			if name == "__typename" {
				return Some(Hover {
					contents: "```graphql\n__typename: String!\n```\n\nThe name of the \
						object type currently being queried."
						.to_owned(),
					range: Some(range),
				});
			}
			let parent = enclosing_type(schema, field.syntax())?;
			let def = parent.field(&name)?;
			return Some(field_hover(def, range));
		}

		cursor = current.parent();
	}
	None
}

fn field_hover(def: &FieldDef, range: Range) -> Hover {
	let mut contents = format!("```graphql\n{}: {}\n```", def.name, def.ty);
	if let Some(description) = &def.description {
		contents.push_str("\n\n");
		contents.push_str(description);
	}
	if def.deprecated {
		contents.push_str("\n\n*Deprecated*");
		if let Some(reason) = &def.deprecation_reason {
			contents.push_str(": ");
			contents.push_str(reason);
		}
	}
	Hover {
		contents,
		range: Some(range),
	}
}

fn type_hover(def: &TypeDef, range: Range) -> Hover {
	let mut contents = format!("```graphql\n{} {}\n```", def.kind.keyword(), def.name);
	if let Some(description) = &def.description {
		contents.push_str("\n\n");
		contents.push_str(description);
	}
	Hover {
		contents,
		range: Some(range),
	}
}

fn argument_hover(arg: &InputValueDef, range: Range) -> Hover {
	let mut signature = format!("{}: {}", arg.name, arg.ty);
	if let Some(default) = &arg.default_value {
		signature.push_str(" = ");
		signature.push_str(default);
	}
	let mut contents = format!("```graphql\n{signature}\n```");
	if let Some(description) = &arg.description {
		contents.push_str("\n\n");
		contents.push_str(description);
	}
	Hover {
		contents,
		range: Some(range),
	}
}

fn contains_offset(node: &apollo_parser::SyntaxNode, offset: usize) -> bool {
	let range = node.text_range();
	usize::from(range.start()) <= offset && offset < usize::from(range.end())
}

fn node_range(node: &apollo_parser::SyntaxNode, line_index: &LineIndex, text: &str) -> Range {
	let range = node.text_range();
	line_index.range(text, usize::from(range.start()), usize::from(range.end()))
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::schema::schema_from_sdl;

	fn schema() -> Schema {
		schema_from_sdl(
			"type Query { user(id: ID!): User }\n\
			 \"The account of a person.\"\n\
			 type User {\n\
			 	\"Display name.\"\n\
			 	name: String\n\
			 	email: String @deprecated(reason: \"use contact\")\n\
			 }",
		)
		.unwrap()
	}

	fn at(text: &str, needle: &str) -> Position {
		let offset = text.find(needle).unwrap();
		Position::new(0, offset as u32)
	}

	#[test]
	fn field_names_show_type_and_description() {
		let schema = schema();
		let text = "query { user(id: 1) { name } }";
		let hover = hover(&schema, text, at(text, "name")).unwrap();
		assert!(hover.contents.contains("name: String"));
		assert!(hover.contents.contains("Display name."));
		let range = hover.range.unwrap();
		assert_eq!(range.start, at(text, "name"));
		assert_eq!(range.end.character, range.start.character + 4);
	}

	#[test]
	fn deprecated_fields_carry_the_reason() {
		let schema = schema();
		let text = "{ user(id: 1) { email } }";
		let hover = hover(&schema, text, at(text, "email")).unwrap();
		assert!(hover.contents.contains("*Deprecated*: use contact"));
	}

	#[test]
	fn type_conditions_show_the_type() {
		let schema = schema();
		let text = "fragment F on User { name }";
		let hover = hover(&schema, text, at(text, "User")).unwrap();
		assert!(hover.contents.contains("type User"));
		assert!(hover.contents.contains("The account of a person."));
	}

	#[test]
	fn argument_names_show_their_input_type() {
		let schema = schema();
		let text = "query { user(id: 1) { name } }";
		let hover = hover(&schema, text, at(text, "id")).unwrap();
		assert!(hover.contents.contains("id: ID!"));
	}

	#[test]
	fn unresolvable_spots_answer_nothing() {
		let schema = schema();
		let text = "query { user(id: 1) { bogus } }";
		assert_eq!(hover(&schema, text, at(text, "bogus")), None);
		// Whitespace inside a selection set.
		let text = "query { user(id: 1) {  } }";
		let position = Position::new(0, (text.find("{  }").unwrap() + 1) as u32);
		assert_eq!(hover(&schema, text, position), None);
	}
}
