//! File-backed definition indices for a project root.
//!
//! The scan expands the configured glob patterns, reads matches in
//! fixed-size batches, and buckets each file's top-level definitions by
//! kind and name. Content changes re-bucket a single file; nothing short of
//! a new worker rescans the root.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use apollo_parser::Parser;
use apollo_parser::cst::{self, CstNode};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::documents::spreads_in;
use crate::schema::{Extension, collect_extensions};
use crate::{Error, Result};

/// Files read concurrently per batch.
pub const READ_CHUNK_SIZE: usize = 50;

/// Attempts per file before a scan gives up on descriptor exhaustion.
const MAX_FD_RETRIES: u32 = 5;

/// A named fragment defined in a project file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentInfo {
	pub name: String,
	pub file: PathBuf,
	pub text: String,
	pub type_condition: Option<String>,
	pub spreads: Vec<String>,
}

/// A named type defined in a project file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
	pub name: String,
	pub file: PathBuf,
	pub text: String,
	/// Named types this definition references: field types, argument types,
	/// implemented interfaces, union members.
	pub referenced_types: Vec<String>,
}

/// What one file contributed, recorded for surgical removal.
#[derive(Debug, Default)]
struct FileBuckets {
	fragments: Vec<String>,
	types: Vec<String>,
	extensions: Vec<Extension>,
}

#[derive(Debug)]
pub struct ProjectIndex {
	root: PathBuf,
	fragments: FxHashMap<String, FragmentInfo>,
	types: FxHashMap<String, TypeInfo>,
	files: FxHashMap<PathBuf, FileBuckets>,
}

impl ProjectIndex {
	/// Scan `root` for files matching `patterns` and index them.
	///
	/// Reads run [`READ_CHUNK_SIZE`] at a time. A read failing with
	/// descriptor exhaustion goes back on the queue for a later batch;
	/// any other I/O failure skips that file with a warning.
	pub async fn scan(root: &Path, patterns: &[String]) -> Result<Self> {
		let mut index = Self {
			root: root.to_owned(),
			fragments: FxHashMap::default(),
			types: FxHashMap::default(),
			files: FxHashMap::default(),
		};

		let mut queue = collect_paths(root, patterns)?;
		let mut retries: FxHashMap<PathBuf, u32> = FxHashMap::default();
		while !queue.is_empty() {
			let take = queue.len().min(READ_CHUNK_SIZE);
			let batch: Vec<PathBuf> = queue.drain(..take).collect();
			let reads = batch.iter().map(tokio::fs::read_to_string);
			let results = futures::future::join_all(reads).await;
			for (path, result) in batch.into_iter().zip(results) {
				match result {
					Ok(text) => index.apply_file(path, &text),
					Err(error) if descriptor_exhaustion(&error) => {
						let attempts = retries.entry(path.clone()).or_insert(0);
						*attempts += 1;
						if *attempts > MAX_FD_RETRIES {
							return Err(Error::Io(error));
						}
						debug!(
							path = %path.display(),
							attempts = *attempts,
							"re-queueing read after descriptor exhaustion"
						);
						queue.push_back(path);
					}
					Err(error) => {
						warn!(
							path = %path.display(),
							error = %error,
							"skipping unreadable project file"
						);
					}
				}
			}
		}

		Ok(index)
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// (Re-)bucket one file's definitions. A name defined in several files
	/// resolves to whichever file was applied last.
	pub fn apply_file(&mut self, path: PathBuf, text: &str) {
		self.remove_file(&path);

		let tree = Parser::new(text).parse();
		if tree.errors().next().is_some() {
			debug!(path = %path.display(), "file has syntax errors, contributing nothing");
			self.files.insert(path, FileBuckets::default());
			return;
		}

		let mut buckets = FileBuckets {
			extensions: collect_extensions(text),
			..FileBuckets::default()
		};
		for definition in tree.document().definitions() {
			match &definition {
				cst::Definition::FragmentDefinition(fragment) => {
					let Some(name) = fragment.fragment_name().and_then(|f| f.name()) else {
						continue;
					};
					let name = name.text().to_string();
					let info = FragmentInfo {
						name: name.clone(),
						file: path.clone(),
						text: definition.syntax().text().to_string(),
						type_condition: fragment
							.type_condition()
							.and_then(|c| c.named_type())
							.and_then(|t| t.name())
							.map(|n| n.text().to_string()),
						spreads: spreads_in(fragment.syntax()),
					};
					self.fragments.insert(name.clone(), info);
					buckets.fragments.push(name);
				}
				cst::Definition::ObjectTypeDefinition(_)
				| cst::Definition::InterfaceTypeDefinition(_)
				| cst::Definition::UnionTypeDefinition(_)
				| cst::Definition::EnumTypeDefinition(_)
				| cst::Definition::ScalarTypeDefinition(_)
				| cst::Definition::InputObjectTypeDefinition(_) => {
					let Some(name) = definition.syntax().descendants().find_map(cst::Name::cast)
					else {
						continue;
					};
					let name = name.text().to_string();
					let info = TypeInfo {
						name: name.clone(),
						file: path.clone(),
						text: definition.syntax().text().to_string(),
						referenced_types: referenced_type_names(&name, definition.syntax()),
					};
					self.types.insert(name.clone(), info);
					buckets.types.push(name);
				}
				_ => {}
			}
		}
		self.files.insert(path, buckets);
	}

	/// Drop a file and everything it contributed. A name this file defined
	/// but another file has since redefined stays untouched.
	pub fn remove_file(&mut self, path: &Path) {
		let Some(buckets) = self.files.remove(path) else {
			return;
		};
		for name in buckets.fragments {
			if self.fragments.get(&name).is_some_and(|f| f.file == path) {
				self.fragments.remove(&name);
			}
		}
		for name in buckets.types {
			if self.types.get(&name).is_some_and(|t| t.file == path) {
				self.types.remove(&name);
			}
		}
	}

	pub fn fragment(&self, name: &str) -> Option<&FragmentInfo> {
		self.fragments.get(name)
	}

	pub fn type_info(&self, name: &str) -> Option<&TypeInfo> {
		self.types.get(name)
	}

	pub fn fragments(&self) -> impl Iterator<Item = &FragmentInfo> {
		self.fragments.values()
	}

	pub fn fragment_count(&self) -> usize {
		self.fragments.len()
	}

	pub fn type_count(&self) -> usize {
		self.types.len()
	}

	pub fn file_count(&self) -> usize {
		self.files.len()
	}

	/// Extension definitions across every indexed file, in path order.
	pub fn extensions(&self) -> Vec<Extension> {
		let mut files: Vec<(&PathBuf, &FileBuckets)> = self.files.iter().collect();
		files.sort_by_key(|(path, _)| *path);
		files
			.into_iter()
			.flat_map(|(_, buckets)| buckets.extensions.iter().cloned())
			.collect()
	}
}

/// Expand every pattern under `root`, deduplicated and sorted. Directories
/// named `node_modules` and `.git` are skipped.
fn collect_paths(root: &Path, patterns: &[String]) -> Result<VecDeque<PathBuf>> {
	let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
	for pattern in patterns {
		let full = root.join(pattern).to_string_lossy().into_owned();
		let entries = glob::glob(&full)
			.map_err(|e| Error::InvalidOptions(format!("bad file pattern `{pattern}`: {e}")))?;
		for entry in entries {
			match entry {
				Ok(path) if skipped_dir(&path) => {}
				Ok(path) => {
					if path.is_file() {
						seen.insert(path);
					}
				}
				Err(error) => {
					warn!(error = %error, "skipping unreadable glob entry");
				}
			}
		}
	}
	Ok(seen.into_iter().collect())
}

fn skipped_dir(path: &Path) -> bool {
	path.components()
		.any(|c| c.as_os_str() == "node_modules" || c.as_os_str() == ".git")
}

fn descriptor_exhaustion(error: &std::io::Error) -> bool {
	// EMFILE (process limit) and ENFILE (system limit).
	matches!(error.raw_os_error(), Some(24) | Some(23))
}

/// Named types a type definition references, excluding itself.
fn referenced_type_names(own_name: &str, node: &apollo_parser::SyntaxNode) -> Vec<String> {
	let mut out = Vec::new();
	for descendant in node.descendants() {
		if let Some(named) = cst::NamedType::cast(descendant)
			&& let Some(name) = named.name()
		{
			let name = name.text().to_string();
			if name != own_name && !out.contains(&name) {
				out.push(name);
			}
		}
	}
	out
}
