//! Demand-driven dependency closure over fragments and named types.
//!
//! Starting from a document's spreads and type references, the walk pulls
//! in project-indexed fragments and types transitively, each name visited
//! once no matter how many paths reach it. Names nothing resolves are
//! simply absent from the result.

use std::collections::VecDeque;
use std::path::PathBuf;

use rustc_hash::FxHashSet;

use crate::documents::{DefinitionKind, parse_document};
use crate::index::{FragmentInfo, ProjectIndex, TypeInfo};

/// One resolved dependency of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
	Fragment(FragmentInfo),
	Type(TypeInfo),
}

impl Dependency {
	pub fn name(&self) -> &str {
		match self {
			Dependency::Fragment(fragment) => &fragment.name,
			Dependency::Type(ty) => &ty.name,
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Dependency::Fragment(_) => "fragment",
			Dependency::Type(_) => "type",
		}
	}
}

/// Fragments defined outside any file, parsed from configured source
/// snippets. Snippets that fail to parse contribute nothing.
pub fn parse_external_fragments(sources: &[String]) -> Vec<FragmentInfo> {
	let mut out = Vec::new();
	for (position, source) in sources.iter().enumerate() {
		let parsed = parse_document(source);
		if !parsed.is_clean() {
			continue;
		}
		for definition in parsed.fragments() {
			let Some(name) = &definition.name else { continue };
			out.push(FragmentInfo {
				name: name.clone(),
				file: PathBuf::from(format!("external#{position}")),
				text: definition.text.clone(),
				type_condition: definition.type_condition.clone(),
				spreads: definition.spreads.clone(),
			});
		}
	}
	out
}

/// Everything reachable from `text`'s spreads and type references, minus
/// the names the document defines itself. A document that fails to parse
/// depends on nothing.
pub fn dependencies(
	text: &str,
	index: Option<&ProjectIndex>,
	external: &[FragmentInfo],
) -> Vec<Dependency> {
	let parsed = parse_document(text);
	if !parsed.is_clean() {
		return Vec::new();
	}

	let mut visited: FxHashSet<String> = FxHashSet::default();
	let mut queue: VecDeque<String> = VecDeque::new();
	for definition in &parsed.definitions {
		// The document's own definitions are never its dependencies.
		if definition.kind == DefinitionKind::Fragment
			&& let Some(name) = &definition.name
		{
			visited.insert(name.clone());
		}
		if definition.kind == DefinitionKind::TypeSystem
			&& let Some(name) = &definition.name
		{
			visited.insert(name.clone());
		}
	}
	for definition in &parsed.definitions {
		queue.extend(definition.spreads.iter().cloned());
		queue.extend(definition.type_refs.iter().cloned());
	}

	let mut out = Vec::new();
	while let Some(name) = queue.pop_front() {
		if !visited.insert(name.clone()) {
			continue;
		}
		if let Some(fragment) = lookup_fragment(&name, index, external) {
			queue.extend(fragment.spreads.iter().cloned());
			if let Some(condition) = &fragment.type_condition {
				queue.push_back(condition.clone());
			}
			out.push(Dependency::Fragment(fragment));
		} else if let Some(ty) = index.and_then(|i| i.type_info(&name)) {
			queue.extend(ty.referenced_types.iter().cloned());
			out.push(Dependency::Type(ty.clone()));
		}
	}
	out
}

/// Project files win over externally supplied fragments.
fn lookup_fragment(
	name: &str,
	index: Option<&ProjectIndex>,
	external: &[FragmentInfo],
) -> Option<FragmentInfo> {
	if let Some(found) = index.and_then(|i| i.fragment(name)) {
		return Some(found.clone());
	}
	external.iter().find(|f| f.name == name).cloned()
}
