//! Canonical printing of executable documents.
//!
//! Operations and fragments are reprinted structurally with two-space
//! indentation and one selection per line. Type system definitions pass
//! through verbatim. Text that does not parse is left untouched, and a
//! document already in canonical form produces no edits.

use apollo_parser::Parser;
use apollo_parser::cst::{self, CstNode};
use petrel_worker::TextEdit;

use crate::text::LineIndex;

const INDENT: &str = "  ";

/// Edits that rewrite `text` into canonical form. Empty when the text is
/// already canonical or cannot be parsed.
pub fn format(text: &str) -> Vec<TextEdit> {
	let tree = Parser::new(text).parse();
	if tree.errors().next().is_some() {
		return Vec::new();
	}

	let printed = print_document(&tree.document());
	if printed.is_empty() || printed == text {
		return Vec::new();
	}

	let line_index = LineIndex::new(text);
	vec![TextEdit {
		range: line_index.full_range(text),
		new_text: printed,
	}]
}

fn print_document(document: &cst::Document) -> String {
	let mut out = String::new();
	for (position, definition) in document.definitions().enumerate() {
		if position > 0 {
			out.push('\n');
		}
		match definition {
			cst::Definition::OperationDefinition(op) => print_operation(&mut out, &op),
			cst::Definition::FragmentDefinition(fragment) => print_fragment(&mut out, &fragment),
			other => {
				out.push_str(other.syntax().text().to_string().trim());
				out.push('\n');
			}
		}
	}
	out
}

fn print_operation(out: &mut String, op: &cst::OperationDefinition) {
	let mut header = String::new();
	if let Some(ty) = op.operation_type() {
		header.push_str(ty.syntax().text().to_string().trim());
	}
	if let Some(name) = op.name() {
		if !header.is_empty() {
			header.push(' ');
		}
		header.push_str(&name.text());
	}
	if let Some(defs) = op.variable_definitions() {
		let vars: Vec<String> = defs.variable_definitions().map(variable_text).collect();
		if !vars.is_empty() {
			header.push('(');
			header.push_str(&vars.join(", "));
			header.push(')');
		}
	}
	if let Some(directives) = op.directives() {
		for directive in directives.directives() {
			header.push(' ');
			header.push_str(&directive_text(&directive));
		}
	}

	if !header.is_empty() {
		out.push_str(&header);
	}
	if let Some(set) = op.selection_set() {
		if !header.is_empty() {
			out.push(' ');
		}
		out.push_str(&selection_set_text(&set, 0));
	}
	out.push('\n');
}

fn print_fragment(out: &mut String, fragment: &cst::FragmentDefinition) {
	out.push_str("fragment");
	if let Some(name) = fragment.fragment_name().and_then(|f| f.name()) {
		out.push(' ');
		out.push_str(&name.text());
	}
	if let Some(name) = fragment
		.type_condition()
		.and_then(|c| c.named_type())
		.and_then(|t| t.name())
	{
		out.push_str(" on ");
		out.push_str(&name.text());
	}
	if let Some(directives) = fragment.directives() {
		for directive in directives.directives() {
			out.push(' ');
			out.push_str(&directive_text(&directive));
		}
	}
	if let Some(set) = fragment.selection_set() {
		out.push(' ');
		out.push_str(&selection_set_text(&set, 0));
	}
	out.push('\n');
}

/// Prints `{ ... }` with the closing brace indented at `depth`. The caller
/// supplies surrounding whitespace.
fn selection_set_text(set: &cst::SelectionSet, depth: usize) -> String {
	let mut out = String::from("{\n");
	for selection in set.selections() {
		out.push_str(&INDENT.repeat(depth + 1));
		out.push_str(&selection_text(&selection, depth + 1));
		out.push('\n');
	}
	out.push_str(&INDENT.repeat(depth));
	out.push('}');
	out
}

fn selection_text(selection: &cst::Selection, depth: usize) -> String {
	match selection {
		cst::Selection::Field(field) => field_text(field, depth),
		cst::Selection::FragmentSpread(spread) => {
			let mut line = String::from("...");
			if let Some(name) = spread.fragment_name().and_then(|f| f.name()) {
				line.push_str(&name.text());
			}
			if let Some(directives) = spread.directives() {
				for directive in directives.directives() {
					line.push(' ');
					line.push_str(&directive_text(&directive));
				}
			}
			line
		}
		cst::Selection::InlineFragment(inline) => {
			let mut line = String::from("...");
			if let Some(name) = inline
				.type_condition()
				.and_then(|c| c.named_type())
				.and_then(|t| t.name())
			{
				line.push_str(" on ");
				line.push_str(&name.text());
			}
			if let Some(directives) = inline.directives() {
				for directive in directives.directives() {
					line.push(' ');
					line.push_str(&directive_text(&directive));
				}
			}
			if let Some(set) = inline.selection_set() {
				line.push(' ');
				line.push_str(&selection_set_text(&set, depth));
			}
			line
		}
	}
}

fn field_text(field: &cst::Field, depth: usize) -> String {
	let mut line = String::new();
	if let Some(name) = field.alias().and_then(|a| a.name()) {
		line.push_str(&name.text());
		line.push_str(": ");
	}
	if let Some(name) = field.name() {
		line.push_str(&name.text());
	}
	if let Some(arguments) = field.arguments() {
		let args: Vec<String> = arguments.arguments().filter_map(argument_text).collect();
		if !args.is_empty() {
			line.push('(');
			line.push_str(&args.join(", "));
			line.push(')');
		}
	}
	if let Some(directives) = field.directives() {
		for directive in directives.directives() {
			line.push(' ');
			line.push_str(&directive_text(&directive));
		}
	}
	if let Some(set) = field.selection_set() {
		line.push(' ');
		line.push_str(&selection_set_text(&set, depth));
	}
	line
}

fn argument_text(argument: cst::Argument) -> Option<String> {
	let name = argument.name()?;
	let value = argument.value()?;
	Some(format!("{}: {}", &*name.text(), value_text(&value)))
}

fn directive_text(directive: &cst::Directive) -> String {
	let mut out = String::from("@");
	if let Some(name) = directive.name() {
		out.push_str(&name.text());
	}
	if let Some(arguments) = directive.arguments() {
		let args: Vec<String> = arguments.arguments().filter_map(argument_text).collect();
		if !args.is_empty() {
			out.push('(');
			out.push_str(&args.join(", "));
			out.push(')');
		}
	}
	out
}

fn variable_text(def: cst::VariableDefinition) -> String {
	let mut out = String::new();
	if let Some(variable) = def.variable() {
		out.push('$');
		if let Some(name) = variable.name() {
			out.push_str(&name.text());
		}
	}
	out.push_str(": ");
	if let Some(ty) = def.ty() {
		out.push_str(&type_text(&ty));
	}
	if let Some(value) = def.default_value().and_then(|d| d.value()) {
		out.push_str(" = ");
		out.push_str(&value_text(&value));
	}
	out
}

fn type_text(ty: &cst::Type) -> String {
	match ty {
		cst::Type::NamedType(named) => named
			.name()
			.map(|n| n.text().to_string())
			.unwrap_or_default(),
		cst::Type::ListType(list) => {
			let inner = list.ty().map(|t| type_text(&t)).unwrap_or_default();
			format!("[{inner}]")
		}
		cst::Type::NonNullType(non_null) => {
			let inner = if let Some(named) = non_null.named_type() {
				named
					.name()
					.map(|n| n.text().to_string())
					.unwrap_or_default()
			} else if let Some(list) = non_null.list_type() {
				let element = list.ty().map(|t| type_text(&t)).unwrap_or_default();
				format!("[{element}]")
			} else {
				String::new()
			};
			format!("{inner}!")
		}
	}
}

// Values keep their source spelling so strings, numbers, and nested lists
// survive exactly as written.
fn value_text(value: &cst::Value) -> String {
	value.syntax().text().to_string().trim().to_owned()
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn compact_queries_are_expanded() {
		let edits = format("query{user{id name}}");
		assert_eq!(edits.len(), 1);
		assert_eq!(
			edits[0].new_text,
			"query {\n  user {\n    id\n    name\n  }\n}\n"
		);
	}

	#[test]
	fn canonical_text_produces_no_edits() {
		let canonical = "query {\n  user {\n    id\n    name\n  }\n}\n";
		assert_eq!(format(canonical), Vec::new());
	}

	#[test]
	fn unparsable_text_is_left_alone() {
		assert_eq!(format("query {"), Vec::new());
	}

	#[test]
	fn headers_keep_variables_arguments_and_directives() {
		let edits = format("query Load($id:ID!=\"1\"){user(id:$id)@skip(if:false){id}}");
		assert_eq!(edits.len(), 1);
		assert_eq!(
			edits[0].new_text,
			"query Load($id: ID! = \"1\") {\n  user(id: $id) @skip(if: false) {\n    id\n  }\n}\n"
		);
	}

	#[test]
	fn fragments_spreads_and_inline_fragments_print_structurally() {
		let edits = format("query{user{...Parts}}\nfragment Parts on User{id ... on User{name}}");
		assert_eq!(edits.len(), 1);
		assert_eq!(
			edits[0].new_text,
			"query {\n  user {\n    ...Parts\n  }\n}\n\nfragment Parts on User {\n  id\n  ... on User {\n    name\n  }\n}\n"
		);
	}
}
