//! Plain data types shared between the host and workers.
//!
//! Everything here is owned and serializable so it can cross any transport
//! boundary unchanged. Positions are zero-based line/character pairs.

use serde::{Deserialize, Serialize};
use url::Url;

/// A zero-based line/character position inside a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
	pub line: u32,
	pub character: u32,
}

impl Position {
	pub fn new(line: u32, character: u32) -> Self {
		Self { line, character }
	}
}

/// A half-open `[start, end)` span inside a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
	pub start: Position,
	pub end: Position,
}

impl Range {
	pub fn new(start: Position, end: Position) -> Self {
		Self { start, end }
	}

	pub fn contains(&self, pos: Position) -> bool {
		pos >= self.start && pos < self.end
	}
}

/// Severity of a published marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerSeverity {
	Hint,
	Info,
	Warning,
	Error,
}

/// A diagnostic marker attached to a document region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
	pub range: Range,
	pub severity: MarkerSeverity,
	pub message: String,
	/// Which analysis produced the marker, e.g. a language id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
}

/// Hover answer: markdown contents plus the range it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hover {
	pub contents: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub range: Option<Range>,
}

/// Kind tag for completion items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionItemKind {
	Field,
	Argument,
	Fragment,
	Keyword,
	Type,
	Enum,
	Variable,
	Directive,
}

/// One completion suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionItem {
	pub label: String,
	pub kind: CompletionItemKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub documentation: Option<String>,
	/// Text inserted on accept when it differs from the label.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub insert_text: Option<String>,
	#[serde(default)]
	pub deprecated: bool,
}

impl CompletionItem {
	pub fn new(label: impl Into<String>, kind: CompletionItemKind) -> Self {
		Self {
			label: label.into(),
			kind,
			detail: None,
			documentation: None,
			insert_text: None,
			deprecated: false,
		}
	}
}

/// A replacement edit produced by formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEdit {
	pub range: Range,
	pub new_text: String,
}

/// Full snapshot of an open document as mirrored into a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
	pub uri: Url,
	pub language_id: String,
	pub version: i32,
	pub text: String,
}

impl DocumentSnapshot {
	pub fn new(
		uri: Url,
		language_id: impl Into<String>,
		version: i32,
		text: impl Into<String>,
	) -> Self {
		Self {
			uri,
			language_id: language_id.into(),
			version,
			text: text.into(),
		}
	}
}
