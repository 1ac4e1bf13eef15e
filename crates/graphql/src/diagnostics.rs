//! Validation markers for one document.
//!
//! Syntax errors short-circuit: a document that fails to parse is reported
//! with exactly its parse errors and nothing semantic. A clean parse plus a
//! schema enables the walk, which flags unknown fields, arguments, fragment
//! spreads and type conditions, selections into leaf types, and deprecated
//! usage.

use apollo_parser::{Parser, SyntaxNode};
use apollo_parser::cst::{self, CstNode};
use petrel_worker::{Marker, MarkerSeverity};
use rustc_hash::FxHashSet;

use crate::index::{FragmentInfo, ProjectIndex};
use crate::schema::{OperationKind, Schema, TypeDef, sdl};
use crate::text::LineIndex;

const MARKER_SOURCE: &str = "graphql";

/// Markers for `text`. Without a schema only syntax is checked.
pub fn diagnostics(
	text: &str,
	schema: Option<&Schema>,
	index: Option<&ProjectIndex>,
	external: &[FragmentInfo],
) -> Vec<Marker> {
	let line_index = LineIndex::new(text);
	let tree = Parser::new(text).parse();

	let mut markers = Vec::new();
	for error in tree.errors() {
		let start = error.index().min(text.len());
		let end = (start + error.data().len().max(1)).min(text.len());
		markers.push(Marker {
			range: line_index.range(text, start, end.max(start)),
			severity: MarkerSeverity::Error,
			message: error.message().to_owned(),
			source: Some(MARKER_SOURCE.to_owned()),
		});
	}
	if !markers.is_empty() {
		return markers;
	}
	let Some(schema) = schema else {
		return markers;
	};

	let document = tree.document();
	let known_local: FxHashSet<String> = document
		.definitions()
		.filter_map(|definition| match definition {
			cst::Definition::FragmentDefinition(fragment) => {
				Some(fragment.fragment_name()?.name()?.text().to_string())
			}
			_ => None,
		})
		.collect();

	let mut walker = Walker {
		schema,
		line_index: &line_index,
		text,
		index,
		external,
		known_local,
		markers,
	};
	for definition in document.definitions() {
		match definition {
			cst::Definition::OperationDefinition(op) => walker.check_operation(&op),
			cst::Definition::FragmentDefinition(fragment) => walker.check_fragment(&fragment),
			_ => {}
		}
	}
	walker.markers
}

struct Walker<'a> {
	schema: &'a Schema,
	line_index: &'a LineIndex,
	text: &'a str,
	index: Option<&'a ProjectIndex>,
	external: &'a [FragmentInfo],
	known_local: FxHashSet<String>,
	markers: Vec<Marker>,
}

impl Walker<'_> {
	fn check_operation(&mut self, op: &cst::OperationDefinition) {
		let kind = sdl::operation_kind_of(op.operation_type()).unwrap_or(OperationKind::Query);
		let schema = self.schema;
		let Some(root) = schema.operation_root(kind) else {
			let anchor = op
				.operation_type()
				.map(|t| t.syntax().clone())
				.unwrap_or_else(|| op.syntax().clone());
			self.push(
				&anchor,
				MarkerSeverity::Error,
				format!("Schema has no {} type.", kind_name(kind)),
			);
			return;
		};
		if let Some(set) = op.selection_set() {
			self.walk(set, root);
		}
	}

	fn check_fragment(&mut self, fragment: &cst::FragmentDefinition) {
		let Some(name) = fragment
			.type_condition()
			.and_then(|c| c.named_type())
			.and_then(|t| t.name())
		else {
			return;
		};
		let type_name = name.text().to_string();
		let schema = self.schema;
		let Some(ty) = schema.type_def(&type_name) else {
			self.push(
				name.syntax(),
				MarkerSeverity::Error,
				format!("Unknown type `{type_name}`."),
			);
			return;
		};
		if let Some(set) = fragment.selection_set() {
			self.walk(set, ty);
		}
	}

	fn walk(&mut self, set: cst::SelectionSet, parent: &TypeDef) {
		for selection in set.selections() {
			match selection {
				cst::Selection::Field(field) => self.check_field(&field, parent),
				cst::Selection::FragmentSpread(spread) => self.check_spread(&spread),
				cst::Selection::InlineFragment(inline) => self.check_inline(&inline, parent),
			}
		}
	}

	fn check_field(&mut self, field: &cst::Field, parent: &TypeDef) {
		let Some(name_node) = field.name() else { return };
		let name = name_node.text().to_string();
		if name == "__typename" {
			return;
		}
		let Some(def) = parent.field(&name) else {
			self.push(
				name_node.syntax(),
				MarkerSeverity::Error,
				format!("Cannot query field `{name}` on type `{}`.", parent.name),
			);
			return;
		};

		if def.deprecated {
			let mut message = format!("Field `{}.{name}` is deprecated.", parent.name);
			if let Some(reason) = &def.deprecation_reason {
				message.push(' ');
				message.push_str(reason);
			}
			self.push(name_node.syntax(), MarkerSeverity::Warning, message);
		}

		if let Some(arguments) = field.arguments() {
			for argument in arguments.arguments() {
				let Some(arg_name) = argument.name() else { continue };
				let arg = arg_name.text().to_string();
				if !def.args.iter().any(|a| a.name == arg) {
					self.push(
						arg_name.syntax(),
						MarkerSeverity::Error,
						format!("Unknown argument `{arg}` on field `{}.{name}`.", parent.name),
					);
				}
			}
		}

		if let Some(set) = field.selection_set() {
			let schema = self.schema;
			match schema.type_def(def.ty.name()) {
				Some(child) if child.is_composite() => self.walk(set, child),
				Some(child) => {
					let message = format!(
						"Field `{name}` must not have a selection since type `{}` has no \
						 subfields.",
						child.name
					);
					self.push(name_node.syntax(), MarkerSeverity::Error, message);
				}
				// A hole in the schema itself is not this document's fault.
				None => {}
			}
		}
	}

	fn check_spread(&mut self, spread: &cst::FragmentSpread) {
		let Some(name) = spread.fragment_name().and_then(|f| f.name()) else {
			return;
		};
		let fragment_name = name.text().to_string();
		let known = self.known_local.contains(&fragment_name)
			|| self.index.is_some_and(|i| i.fragment(&fragment_name).is_some())
			|| self.external.iter().any(|f| f.name == fragment_name);
		if !known {
			self.push(
				name.syntax(),
				MarkerSeverity::Error,
				format!("Unknown fragment `{fragment_name}`."),
			);
		}
	}

	fn check_inline(&mut self, inline: &cst::InlineFragment, parent: &TypeDef) {
		match inline.type_condition() {
			Some(condition) => {
				let Some(name) = condition.named_type().and_then(|t| t.name()) else {
					return;
				};
				let type_name = name.text().to_string();
				let schema = self.schema;
				match schema.type_def(&type_name) {
					Some(ty) => {
						if let Some(set) = inline.selection_set() {
							self.walk(set, ty);
						}
					}
					None => self.push(
						name.syntax(),
						MarkerSeverity::Error,
						format!("Unknown type `{type_name}`."),
					),
				}
			}
			None => {
				if let Some(set) = inline.selection_set() {
					self.walk(set, parent);
				}
			}
		}
	}

	fn push(&mut self, node: &SyntaxNode, severity: MarkerSeverity, message: String) {
		let range = node.text_range();
		self.markers.push(Marker {
			range: self.line_index.range(
				self.text,
				usize::from(range.start()),
				usize::from(range.end()),
			),
			severity,
			message,
			source: Some(MARKER_SOURCE.to_owned()),
		});
	}
}

fn kind_name(kind: OperationKind) -> &'static str {
	match kind {
		OperationKind::Query => "query",
		OperationKind::Mutation => "mutation",
		OperationKind::Subscription => "subscription",
	}
}
